//! Shared fixtures for integration tests: minimal PDFs built through the
//! library's own writer, plus helpers for walking tagged output.
#![allow(dead_code)]

use texua::pdf::{
    ObjectId, PdfArray, PdfDictionary, PdfDocument, PdfObject, PdfStream,
};

/// Build a document with one page per content stream (stored unfiltered).
pub fn document_with_pages(contents: &[&[u8]]) -> PdfDocument {
    let mut document = PdfDocument::new();
    let catalog_id = document.reserve_id();
    let pages_id = document.reserve_id();

    let mut kids = PdfArray::new();
    for &content in contents {
        let mut stream_dict = PdfDictionary::new();
        stream_dict.insert("Length", PdfObject::Integer(content.len() as i64));
        let stream_id = document.add_object(PdfObject::Stream(PdfStream {
            dict: stream_dict,
            data: content.to_vec(),
        }));

        let mut page = PdfDictionary::new();
        page.insert("Type", PdfObject::name("Page"));
        page.insert("Parent", PdfObject::Reference(pages_id));
        page.insert("Contents", PdfObject::Reference(stream_id));
        page.insert(
            "MediaBox",
            PdfObject::Array(PdfArray(vec![
                PdfObject::Integer(0),
                PdfObject::Integer(0),
                PdfObject::Integer(612),
                PdfObject::Integer(792),
            ])),
        );
        let page_id = document.add_object(PdfObject::Dictionary(page));
        kids.push(PdfObject::Reference(page_id));
    }

    let mut pages = PdfDictionary::new();
    pages.insert("Type", PdfObject::name("Pages"));
    pages.insert("Count", PdfObject::Integer(kids.len() as i64));
    pages.insert("Kids", PdfObject::Array(kids));
    document.set(pages_id, PdfObject::Dictionary(pages));

    let mut catalog = PdfDictionary::new();
    catalog.insert("Type", PdfObject::name("Catalog"));
    catalog.insert("Pages", PdfObject::Reference(pages_id));
    document.set(catalog_id, PdfObject::Dictionary(catalog));

    document
        .trailer
        .insert("Root", PdfObject::Reference(catalog_id));
    document
}

/// Attach a `/Link` annotation with a URI action to a page.
pub fn add_link_annotation(document: &mut PdfDocument, page_id: ObjectId, uri: &str) -> ObjectId {
    let mut action = PdfDictionary::new();
    action.insert("S", PdfObject::name("URI"));
    action.insert("URI", PdfObject::literal_string(uri.as_bytes().to_vec()));

    let mut annot = PdfDictionary::new();
    annot.insert("Type", PdfObject::name("Annot"));
    annot.insert("Subtype", PdfObject::name("Link"));
    annot.insert(
        "Rect",
        PdfObject::Array(PdfArray(vec![
            PdfObject::Integer(72),
            PdfObject::Integer(700),
            PdfObject::Integer(200),
            PdfObject::Integer(715),
        ])),
    );
    annot.insert("A", PdfObject::Dictionary(action));
    let annot_id = document.add_object(PdfObject::Dictionary(annot));

    let page = document
        .get_mut(page_id)
        .and_then(PdfObject::as_dict_mut)
        .unwrap();
    match page.get_mut("Annots").and_then(PdfObject::as_array_mut) {
        Some(array) => array.push(PdfObject::Reference(annot_id)),
        None => page.insert(
            "Annots",
            PdfObject::Array(PdfArray(vec![PdfObject::Reference(annot_id)])),
        ),
    }
    annot_id
}

/// Serialise and re-parse, as a consumer of the output file would.
pub fn reload(document: &PdfDocument) -> PdfDocument {
    let bytes = texua::pdf::write_document(document).unwrap();
    PdfDocument::from_bytes(&bytes).unwrap()
}

/// The catalogue's `/StructTreeRoot` dictionary.
pub fn struct_tree_root(document: &PdfDocument) -> PdfDictionary {
    let catalog = document.catalog().unwrap();
    resolve_dict(document, catalog.get("StructTreeRoot").unwrap())
}

pub fn resolve_dict(document: &PdfDocument, object: &PdfObject) -> PdfDictionary {
    document.resolve(object).as_dict().cloned().unwrap()
}

/// Flatten `/K` into a list of child objects (element refs and MCR/OBJR
/// dictionaries), treating a single entry as a one-element list.
pub fn kids_of(element: &PdfDictionary) -> Vec<PdfObject> {
    match element.get("K") {
        None => Vec::new(),
        Some(PdfObject::Array(array)) => array.iter().cloned().collect(),
        Some(other) => vec![other.clone()],
    }
}

/// Depth-first walk of the structure tree, returning `(role, element)`
/// pairs in document order, starting at the Document element.
pub fn collect_elements(document: &PdfDocument) -> Vec<(String, PdfDictionary)> {
    let root = struct_tree_root(document);
    let mut out = Vec::new();
    walk_element(document, root.get("K").unwrap(), &mut out);
    out
}

fn walk_element(document: &PdfDocument, object: &PdfObject, out: &mut Vec<(String, PdfDictionary)>) {
    let resolved = document.resolve(object);
    let Some(dict) = resolved.as_dict() else {
        return;
    };
    // MCR/OBJR kids are not structure elements.
    if dict.get_type() == Some("MCR") || dict.get_type() == Some("OBJR") {
        return;
    }
    let role = dict
        .get("S")
        .and_then(PdfObject::as_name)
        .unwrap_or("")
        .to_string();
    out.push((role, dict.clone()));
    for kid in kids_of(dict) {
        walk_element(document, &kid, out);
    }
}

/// Decoded content stream of a page in the (re-loaded) output document.
pub fn page_content(document: &PdfDocument, page_index: usize) -> Vec<u8> {
    let pages = document.pages().unwrap();
    document.page_content(pages[page_index]).unwrap()
}

/// MCIDs found in `/Span` BDC property dictionaries, in stream order.
pub fn span_mcids(content: &[u8]) -> Vec<i64> {
    use texua::pdf::content::parse_instructions;
    use texua::pdf::lexer::TokenKind;

    let mut out = Vec::new();
    for instruction in parse_instructions(content).unwrap() {
        if instruction.operator != "BDC" {
            continue;
        }
        let mut tokens = instruction.operands.iter();
        let is_span = matches!(
            tokens.next().map(|t| &t.kind),
            Some(TokenKind::Name(name)) if name == "Span"
        );
        if !is_span {
            continue;
        }
        let mut saw_mcid_key = false;
        for token in tokens {
            match &token.kind {
                TokenKind::Name(name) if name == "MCID" => saw_mcid_key = true,
                TokenKind::Integer(value) if saw_mcid_key => {
                    out.push(*value);
                    break;
                }
                _ => {}
            }
        }
    }
    out
}
