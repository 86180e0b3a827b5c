//! PDF serialisation: full rewrite with a classic xref table.
//!
//! The writer emits every object in the document map in numeric order,
//! records its byte offset, and finishes with an xref table and trailer.
//! Incremental update is deliberately not attempted: the tagger touches
//! most pages anyway, and a full rewrite keeps the offsets trivial.

use crate::error::Result;
use crate::pdf::objects::{ObjectId, PdfDictionary, PdfObject, PdfString, StringFormat};
use crate::pdf::reader::PdfDocument;
use std::io::Write;
use std::path::Path;

/// Trailer keys that describe the xref representation of the *source*
/// file; they must not survive into the rewritten classic trailer.
const STALE_TRAILER_KEYS: &[&str] = &[
    "Prev", "XRefStm", "Type", "W", "Index", "Filter", "DecodeParms", "Length", "DL",
];

pub fn write_document(document: &PdfDocument) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    let version = if document.version.is_empty() {
        "1.7"
    } else {
        document.version.as_str()
    };
    write!(out, "%PDF-{version}\n")?;
    // Binary comment so transports treat the file as binary.
    out.extend_from_slice(&[b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n']);

    let mut offsets: Vec<(u32, u16, u64)> = Vec::with_capacity(document.objects.len());
    for (id, object) in &document.objects {
        offsets.push((id.number, id.generation, out.len() as u64));
        write!(out, "{} {} obj\n", id.number, id.generation)?;
        serialize_object(&mut out, object)?;
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_position = out.len() as u64;
    write_xref_table(&mut out, &offsets)?;

    let max_number = offsets.iter().map(|&(n, _, _)| n).max().unwrap_or(0);
    let mut trailer = document.trailer.clone();
    for key in STALE_TRAILER_KEYS {
        trailer.remove(key);
    }
    trailer.insert("Size", PdfObject::Integer(max_number as i64 + 1));

    out.extend_from_slice(b"trailer\n");
    serialize_object(&mut out, &PdfObject::Dictionary(trailer))?;
    write!(out, "\nstartxref\n{xref_position}\n%%EOF\n")?;
    Ok(out)
}

pub fn save_document(document: &PdfDocument, path: &Path) -> Result<()> {
    let bytes = write_document(document)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Write the xref table, splitting non-contiguous object numbers into
/// subsections. Entry 0 is always the free-list head.
fn write_xref_table(out: &mut Vec<u8>, offsets: &[(u32, u16, u64)]) -> Result<()> {
    out.extend_from_slice(b"xref\n");

    let mut entries: Vec<(u32, String)> = vec![(0, "0000000000 65535 f \n".to_string())];
    for &(number, generation, offset) in offsets {
        entries.push((number, format!("{offset:010} {generation:05} n \n")));
    }
    entries.sort_by_key(|&(number, _)| number);
    entries.dedup_by_key(|&mut (number, _)| number);

    let mut index = 0;
    while index < entries.len() {
        let start = entries[index].0;
        let mut run = 1;
        while index + run < entries.len() && entries[index + run].0 == start + run as u32 {
            run += 1;
        }
        write!(out, "{start} {run}\n")?;
        for (_, line) in &entries[index..index + run] {
            out.extend_from_slice(line.as_bytes());
        }
        index += run;
    }
    Ok(())
}

pub fn serialize_object(out: &mut Vec<u8>, object: &PdfObject) -> Result<()> {
    match object {
        PdfObject::Null => out.extend_from_slice(b"null"),
        PdfObject::Boolean(true) => out.extend_from_slice(b"true"),
        PdfObject::Boolean(false) => out.extend_from_slice(b"false"),
        PdfObject::Integer(value) => write!(out, "{value}")?,
        PdfObject::Real(value) => out.extend_from_slice(format_real(*value).as_bytes()),
        PdfObject::String(string) => serialize_string(out, string),
        PdfObject::Name(name) => serialize_name(out, name.as_str()),
        PdfObject::Array(array) => {
            out.push(b'[');
            for (index, item) in array.iter().enumerate() {
                if index > 0 {
                    out.push(b' ');
                }
                serialize_object(out, item)?;
            }
            out.push(b']');
        }
        PdfObject::Dictionary(dict) => serialize_dictionary(out, dict)?,
        PdfObject::Stream(stream) => {
            let mut dict = stream.dict.clone();
            dict.insert("Length", PdfObject::Integer(stream.data.len() as i64));
            serialize_dictionary(out, &dict)?;
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&stream.data);
            out.extend_from_slice(b"\nendstream");
        }
        PdfObject::Reference(ObjectId { number, generation }) => {
            write!(out, "{number} {generation} R")?;
        }
    }
    Ok(())
}

fn serialize_dictionary(out: &mut Vec<u8>, dict: &PdfDictionary) -> Result<()> {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        out.push(b' ');
        serialize_name(out, key);
        out.push(b' ');
        serialize_object(out, value)?;
    }
    out.extend_from_slice(b" >>");
    Ok(())
}

fn serialize_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    for &byte in name.as_bytes() {
        let needs_escape = byte == b'#'
            || byte < b'!'
            || byte > b'~'
            || crate::pdf::lexer::is_delimiter(byte);
        if needs_escape {
            out.extend_from_slice(format!("#{byte:02X}").as_bytes());
        } else {
            out.push(byte);
        }
    }
}

fn serialize_string(out: &mut Vec<u8>, string: &PdfString) {
    match string.format {
        StringFormat::Hex => {
            out.push(b'<');
            for byte in &string.bytes {
                out.extend_from_slice(format!("{byte:02X}").as_bytes());
            }
            out.push(b'>');
        }
        StringFormat::Literal => serialize_literal_string(out, &string.bytes),
    }
}

/// Write a literal string with PDF escapes; non-printable bytes use octal.
pub fn serialize_literal_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'(');
    for &byte in bytes {
        match byte {
            b'(' => out.extend_from_slice(b"\\("),
            b')' => out.extend_from_slice(b"\\)"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x20..=0x7E => out.push(byte),
            _ => out.extend_from_slice(format!("\\{byte:03o}").as_bytes()),
        }
    }
    out.push(b')');
}

/// PDF has no exponent syntax, so reals are written in plain decimal and
/// trimmed of trailing zeros.
fn format_real(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let mut text = format!("{value:.6}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    text
}
