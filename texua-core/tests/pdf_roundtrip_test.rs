//! Reader/writer integration: round trips, compressed streams, xref
//! streams with object streams, and recovery from a broken xref.

mod common;

use common::document_with_pages;
use texua::pdf::{
    write_document, PdfArray, PdfDictionary, PdfDocument, PdfObject, PdfStream,
};

#[test]
fn write_then_read_round_trip() {
    let document = document_with_pages(&[b"BT (Hello) Tj ET"]);
    let bytes = write_document(&document).unwrap();
    assert!(bytes.starts_with(b"%PDF-1.7"));
    assert!(bytes.ends_with(b"%%EOF\n"));

    let reparsed = PdfDocument::from_bytes(&bytes).unwrap();
    assert_eq!(reparsed.pages().unwrap().len(), 1);
    let page_id = reparsed.pages().unwrap()[0];
    assert_eq!(reparsed.page_content(page_id).unwrap(), b"BT (Hello) Tj ET");
}

#[test]
fn compressed_page_content_round_trips() {
    let mut document = document_with_pages(&[b"placeholder"]);
    let page_id = document.pages().unwrap()[0];
    let content = b"BT /F1 10 Tf (compressed content) Tj ET".to_vec();
    document.set_page_content(page_id, content.clone()).unwrap();

    let bytes = write_document(&document).unwrap();
    let reparsed = PdfDocument::from_bytes(&bytes).unwrap();
    let page_id = reparsed.pages().unwrap()[0];
    assert_eq!(reparsed.page_content(page_id).unwrap(), content);
}

#[test]
fn multiple_content_streams_coalesce() {
    let mut document = document_with_pages(&[b"unused"]);
    let page_id = document.pages().unwrap()[0];

    let make_stream = |doc: &mut PdfDocument, data: &[u8]| {
        let mut dict = PdfDictionary::new();
        dict.insert("Length", PdfObject::Integer(data.len() as i64));
        doc.add_object(PdfObject::Stream(PdfStream {
            dict,
            data: data.to_vec(),
        }))
    };
    let first = make_stream(&mut document, b"BT (a) Tj");
    let second = make_stream(&mut document, b"(b) Tj ET");
    document
        .get_mut(page_id)
        .and_then(PdfObject::as_dict_mut)
        .unwrap()
        .insert(
            "Contents",
            PdfObject::Array(PdfArray(vec![
                PdfObject::Reference(first),
                PdfObject::Reference(second),
            ])),
        );

    assert_eq!(
        document.page_content(page_id).unwrap(),
        b"BT (a) Tj\n(b) Tj ET"
    );
}

/// Assemble a file that stores the page dictionary inside an object
/// stream and indexes everything through an xref stream, the way pdflatex
/// writes PDF 1.5+ output.
#[test]
fn xref_stream_and_object_stream_are_read() {
    let mut buffer: Vec<u8> = Vec::new();
    buffer.extend_from_slice(b"%PDF-1.5\n%\xE2\xE3\xCF\xD3\n");

    let mut offsets = std::collections::HashMap::new();

    // 1: catalog, 2: pages — plain objects.
    offsets.insert(1u32, buffer.len());
    buffer.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
    offsets.insert(2, buffer.len());
    buffer.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n");

    // 4: object stream holding object 3 (the page).
    let embedded = b"<< /Type /Page /Parent 2 0 R /Contents 5 0 R >>";
    let header = b"3 0 ";
    let first = header.len();
    let mut objstm_data = Vec::new();
    objstm_data.extend_from_slice(header);
    objstm_data.extend_from_slice(embedded);
    offsets.insert(4, buffer.len());
    buffer.extend_from_slice(
        format!(
            "4 0 obj\n<< /Type /ObjStm /N 1 /First {first} /Length {} >>\nstream\n",
            objstm_data.len()
        )
        .as_bytes(),
    );
    buffer.extend_from_slice(&objstm_data);
    buffer.extend_from_slice(b"\nendstream\nendobj\n");

    // 5: the page content stream.
    let content = b"BT (from objstm) Tj ET";
    offsets.insert(5, buffer.len());
    buffer.extend_from_slice(
        format!("5 0 obj\n<< /Length {} >>\nstream\n", content.len()).as_bytes(),
    );
    buffer.extend_from_slice(content);
    buffer.extend_from_slice(b"\nendstream\nendobj\n");

    // 6: the xref stream. W = [1 4 2]; entries for objects 0..=6.
    let xref_offset = buffer.len();
    let mut rows: Vec<u8> = Vec::new();
    let mut push_row = |kind: u8, second: u32, third: u16, rows: &mut Vec<u8>| {
        rows.push(kind);
        rows.extend_from_slice(&second.to_be_bytes());
        rows.extend_from_slice(&third.to_be_bytes());
    };
    push_row(0, 0, 0xFFFF, &mut rows); // object 0: free
    push_row(1, offsets[&1] as u32, 0, &mut rows);
    push_row(1, offsets[&2] as u32, 0, &mut rows);
    push_row(2, 4, 0, &mut rows); // object 3 lives in stream 4, index 0
    push_row(1, offsets[&4] as u32, 0, &mut rows);
    push_row(1, offsets[&5] as u32, 0, &mut rows);
    push_row(1, xref_offset as u32, 0, &mut rows);

    buffer.extend_from_slice(
        format!(
            "6 0 obj\n<< /Type /XRef /Size 7 /W [1 4 2] /Root 1 0 R /Length {} >>\nstream\n",
            rows.len()
        )
        .as_bytes(),
    );
    buffer.extend_from_slice(&rows);
    buffer.extend_from_slice(b"\nendstream\nendobj\n");
    buffer.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF\n").as_bytes());

    let document = PdfDocument::from_bytes(&buffer).unwrap();
    let pages = document.pages().unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(
        document.page_content(pages[0]).unwrap(),
        b"BT (from objstm) Tj ET"
    );
}

#[test]
fn broken_xref_offset_triggers_recovery_scan() {
    let document = document_with_pages(&[b"BT (recovered) Tj ET"]);
    let mut bytes = write_document(&document).unwrap();

    // Corrupt the startxref offset.
    let position = bytes
        .windows(9)
        .rposition(|w| w == b"startxref")
        .unwrap();
    bytes.truncate(position);
    bytes.extend_from_slice(b"startxref\n999999999\n%%EOF\n");

    let reparsed = PdfDocument::from_bytes(&bytes).unwrap();
    let pages = reparsed.pages().unwrap();
    assert_eq!(
        reparsed.page_content(pages[0]).unwrap(),
        b"BT (recovered) Tj ET"
    );
}

#[test]
fn trailer_keeps_root_and_updates_size() {
    let document = document_with_pages(&[b"x"]);
    let bytes = write_document(&document).unwrap();
    let reparsed = PdfDocument::from_bytes(&bytes).unwrap();

    assert!(reparsed.trailer.get("Root").is_some());
    let size = reparsed
        .trailer
        .get("Size")
        .and_then(PdfObject::as_integer)
        .unwrap();
    assert_eq!(size as usize, reparsed.objects.len() + 1);
}
