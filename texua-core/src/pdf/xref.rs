//! Cross-reference parsing: classic tables, xref streams and hybrid files.
//!
//! The entry map is assembled newest-first along the `/Prev` chain, so an
//! updated object in an incremental save shadows its older versions.

use crate::error::{Result, TexuaError};
use crate::pdf::filters::decode_stream;
use crate::pdf::lexer::{Lexer, TokenKind};
use crate::pdf::objects::{PdfDictionary, PdfObject};
use crate::pdf::reader::parse_indirect_object;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum XrefEntry {
    /// Object stored at a byte offset in the file.
    Offset { offset: usize, generation: u16 },
    /// Object stored inside an object stream.
    InStream { stream: u32, index: u32 },
    Free,
}

#[derive(Debug, Default)]
pub struct Xref {
    pub entries: HashMap<u32, XrefEntry>,
    pub trailer: PdfDictionary,
}

impl Xref {
    fn merge_entry(&mut self, number: u32, entry: XrefEntry) {
        self.entries.entry(number).or_insert(entry);
    }

    fn merge_trailer(&mut self, dict: &PdfDictionary) {
        for (key, value) in dict.iter() {
            if !self.trailer.contains_key(key) {
                self.trailer.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Parse the xref chain starting at `start_offset` (from `startxref`).
pub fn parse_xref_chain(data: &[u8], start_offset: usize) -> Result<Xref> {
    let mut xref = Xref::default();
    let mut offset = Some(start_offset);
    let mut visited = Vec::new();

    while let Some(current) = offset {
        if current >= data.len() {
            return Err(TexuaError::ParseError(format!(
                "xref offset {current} beyond end of file"
            )));
        }
        if visited.contains(&current) || visited.len() > 32 {
            break; // cyclic or absurd /Prev chain
        }
        visited.push(current);

        let section_trailer = parse_xref_section(data, current, &mut xref)?;

        // Hybrid files point at an additional xref stream.
        if let Some(stm) = section_trailer
            .get("XRefStm")
            .and_then(PdfObject::as_integer)
        {
            let stm = stm as usize;
            if !visited.contains(&stm) && stm < data.len() {
                visited.push(stm);
                parse_xref_section(data, stm, &mut xref)?;
            }
        }

        offset = section_trailer
            .get("Prev")
            .and_then(PdfObject::as_integer)
            .map(|p| p as usize);
    }

    if !xref.trailer.contains_key("Root") {
        return Err(TexuaError::InvalidStructure(
            "xref chain has no /Root".to_string(),
        ));
    }
    Ok(xref)
}

/// Parse one classic table or xref stream; returns that section's trailer.
fn parse_xref_section(data: &[u8], offset: usize, xref: &mut Xref) -> Result<PdfDictionary> {
    let mut lexer = Lexer::at(data, offset);
    match lexer.peek_token(0)? {
        Some(token) if token.kind == TokenKind::Keyword("xref".to_string()) => {
            parse_classic_table(&mut lexer, xref)
        }
        Some(token) if matches!(token.kind, TokenKind::Integer(_)) => {
            parse_xref_stream(data, offset, xref)
        }
        other => Err(TexuaError::ParseError(format!(
            "expected xref section at offset {offset}, found {other:?}"
        ))),
    }
}

fn parse_classic_table(lexer: &mut Lexer, xref: &mut Xref) -> Result<PdfDictionary> {
    lexer.next_token()?; // "xref"

    loop {
        match lexer.peek_token(0)? {
            Some(token) if token.kind == TokenKind::Keyword("trailer".to_string()) => {
                lexer.next_token()?;
                break;
            }
            Some(token) if matches!(token.kind, TokenKind::Integer(_)) => {
                let start = expect_integer(lexer)? as u32;
                let count = expect_integer(lexer)?;
                for index in 0..count {
                    let offset = expect_integer(lexer)? as usize;
                    let generation = expect_integer(lexer)? as u16;
                    let kind = match lexer.next_token()? {
                        Some(token) => match token.kind {
                            TokenKind::Keyword(k) => k,
                            other => {
                                return Err(TexuaError::ParseError(format!(
                                    "bad xref entry type: {other:?}"
                                )))
                            }
                        },
                        None => {
                            return Err(TexuaError::ParseError(
                                "truncated xref table".to_string(),
                            ))
                        }
                    };
                    let number = start + index as u32;
                    match kind.as_str() {
                        "n" => xref
                            .merge_entry(number, XrefEntry::Offset { offset, generation }),
                        "f" => xref.merge_entry(number, XrefEntry::Free),
                        other => {
                            return Err(TexuaError::ParseError(format!(
                                "bad xref entry type '{other}'"
                            )))
                        }
                    }
                }
            }
            other => {
                return Err(TexuaError::ParseError(format!(
                    "unexpected token in xref table: {other:?}"
                )))
            }
        }
    }

    let trailer = match crate::pdf::reader::parse_object(lexer)? {
        PdfObject::Dictionary(dict) => dict,
        other => {
            return Err(TexuaError::ParseError(format!(
                "trailer is not a dictionary: {other:?}"
            )))
        }
    };
    xref.merge_trailer(&trailer);
    Ok(trailer)
}

fn parse_xref_stream(data: &[u8], offset: usize, xref: &mut Xref) -> Result<PdfDictionary> {
    let (_, object, _) = parse_indirect_object(data, offset)?;
    let stream = match object {
        PdfObject::Stream(stream) => stream,
        other => {
            return Err(TexuaError::ParseError(format!(
                "xref stream is not a stream object: {other:?}"
            )))
        }
    };

    let decoded = decode_stream(&stream.data, &stream.dict)?;
    let widths: Vec<usize> = stream
        .dict
        .get("W")
        .and_then(PdfObject::as_array)
        .map(|a| {
            a.iter()
                .filter_map(|o| o.as_integer().map(|v| v as usize))
                .collect()
        })
        .unwrap_or_default();
    if widths.len() < 3 {
        return Err(TexuaError::ParseError("xref stream /W malformed".to_string()));
    }

    let size = stream
        .dict
        .get("Size")
        .and_then(PdfObject::as_integer)
        .unwrap_or(0);
    let index: Vec<i64> = stream
        .dict
        .get("Index")
        .and_then(PdfObject::as_array)
        .map(|a| a.iter().filter_map(PdfObject::as_integer).collect())
        .unwrap_or_else(|| vec![0, size]);

    let row_len: usize = widths.iter().sum();
    if row_len == 0 {
        return Err(TexuaError::ParseError("xref stream /W is zero".to_string()));
    }

    let mut rows = decoded.chunks(row_len);
    for pair in index.chunks(2) {
        let (&start, &count) = match pair {
            [s, c] => (s, c),
            _ => break,
        };
        for number in start..start + count {
            let Some(row) = rows.next() else { break };
            if row.len() < row_len {
                break;
            }
            let mut fields = [1u64, 0, 0]; // field 1 defaults to type 1
            let mut cursor = 0usize;
            for (slot, &width) in widths.iter().enumerate() {
                if width > 0 {
                    let mut value = 0u64;
                    for &byte in &row[cursor..cursor + width] {
                        value = (value << 8) | byte as u64;
                    }
                    fields[slot] = value;
                    cursor += width;
                }
            }
            let entry = match fields[0] {
                0 => XrefEntry::Free,
                1 => XrefEntry::Offset {
                    offset: fields[1] as usize,
                    generation: fields[2] as u16,
                },
                2 => XrefEntry::InStream {
                    stream: fields[1] as u32,
                    index: fields[2] as u32,
                },
                _ => continue, // reserved types are ignored
            };
            xref.merge_entry(number as u32, entry);
        }
    }

    xref.merge_trailer(&stream.dict);
    Ok(stream.dict)
}

fn expect_integer(lexer: &mut Lexer) -> Result<i64> {
    match lexer.next_token()? {
        Some(token) => match token.kind {
            TokenKind::Integer(value) => Ok(value),
            other => Err(TexuaError::ParseError(format!(
                "expected integer, found {other:?}"
            ))),
        },
        None => Err(TexuaError::ParseError("unexpected end of xref".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_table() {
        let data = b"xref\n0 3\n0000000000 65535 f \n0000000015 00000 n \n0000000120 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\n";
        let mut xref = Xref::default();
        let trailer = parse_xref_section(data, 0, &mut xref).unwrap();
        assert_eq!(
            xref.entries.get(&1),
            Some(&XrefEntry::Offset {
                offset: 15,
                generation: 0
            })
        );
        assert_eq!(xref.entries.get(&0), Some(&XrefEntry::Free));
        assert_eq!(trailer.get("Size").unwrap().as_integer(), Some(3));
    }

    #[test]
    fn test_newest_entry_wins() {
        let mut xref = Xref::default();
        xref.merge_entry(
            4,
            XrefEntry::Offset {
                offset: 100,
                generation: 0,
            },
        );
        // Older section must not shadow the newer entry.
        xref.merge_entry(
            4,
            XrefEntry::Offset {
                offset: 7,
                generation: 0,
            },
        );
        assert_eq!(
            xref.entries.get(&4),
            Some(&XrefEntry::Offset {
                offset: 100,
                generation: 0
            })
        );
    }
}
