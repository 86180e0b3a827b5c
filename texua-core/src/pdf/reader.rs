//! PDF document loading and the in-memory object map.
//!
//! The reader parses the whole document eagerly: every object reachable
//! from the xref chain (including objects packed into object streams) ends
//! up in one map keyed by object id. When the xref chain is unusable the
//! reader falls back to scanning the file for `N G obj` headers, which
//! recovers most damaged files well enough to tag them.

use crate::error::{Result, TexuaError};
use crate::pdf::filters::decode_stream;
use crate::pdf::lexer::{is_whitespace, Lexer, TokenKind};
use crate::pdf::objects::{
    ObjectId, PdfArray, PdfDictionary, PdfObject, PdfStream, PdfString,
};
use crate::pdf::xref::{parse_xref_chain, XrefEntry};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::warn;

/// A parsed PDF document: object map plus trailer.
#[derive(Debug)]
pub struct PdfDocument {
    pub version: String,
    pub objects: BTreeMap<ObjectId, PdfObject>,
    pub trailer: PdfDictionary,
    next_object_number: u32,
}

impl Default for PdfDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfDocument {
    /// An empty document, for building files programmatically.
    pub fn new() -> Self {
        Self {
            version: "1.7".to_string(),
            objects: BTreeMap::new(),
            trailer: PdfDictionary::new(),
            next_object_number: 1,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let version = parse_version(data)?;

        let (entries, trailer) = match locate_startxref(data)
            .and_then(|offset| parse_xref_chain(data, offset))
        {
            Ok(xref) => (xref.entries, xref.trailer),
            Err(err) => {
                warn!(%err, "xref chain unusable, scanning for objects");
                recovery_scan(data)?
            }
        };

        let mut objects = BTreeMap::new();
        let mut in_stream = Vec::new();

        for (&number, entry) in &entries {
            match *entry {
                XrefEntry::Offset { offset, .. } => {
                    match parse_indirect_object(data, offset) {
                        Ok((id, object, _)) => {
                            // Trust the object's own header over the table.
                            if id.number == number {
                                objects.insert(id, object);
                            } else {
                                objects.insert(ObjectId::new(number, 0), object);
                            }
                        }
                        Err(err) => {
                            warn!(number, offset, %err, "skipping unparseable object");
                        }
                    }
                }
                XrefEntry::InStream { stream, index } => {
                    in_stream.push((number, stream, index));
                }
                XrefEntry::Free => {}
            }
        }

        // Second pass: unpack object streams.
        for (number, container, index) in in_stream {
            match unpack_from_object_stream(&objects, container, index) {
                Ok(object) => {
                    objects.insert(ObjectId::new(number, 0), object);
                }
                Err(err) => {
                    warn!(number, container, %err, "skipping object-stream entry");
                }
            }
        }

        // Containers and xref streams describe the *source* file layout;
        // the writer produces a classic table, so they must not survive
        // as stale duplicates.
        objects.retain(|_, object| {
            !matches!(
                object.as_dict().and_then(PdfDictionary::get_type),
                Some("ObjStm") | Some("XRef")
            )
        });

        let next_object_number = objects
            .keys()
            .map(|id| id.number)
            .max()
            .unwrap_or(0)
            + 1;

        Ok(Self {
            version,
            objects,
            trailer,
            next_object_number,
        })
    }

    /// Follow references until a direct object is reached.
    pub fn resolve<'a>(&'a self, object: &'a PdfObject) -> &'a PdfObject {
        let mut current = object;
        for _ in 0..32 {
            match current {
                PdfObject::Reference(id) => match self.objects.get(id) {
                    Some(next) => current = next,
                    None => return &PdfObject::Null,
                },
                _ => return current,
            }
        }
        &PdfObject::Null
    }

    pub fn get(&self, id: ObjectId) -> Option<&PdfObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut PdfObject> {
        self.objects.get_mut(&id)
    }

    /// Insert a new object and return its id.
    pub fn add_object(&mut self, object: PdfObject) -> ObjectId {
        let id = self.reserve_id();
        self.objects.insert(id, object);
        id
    }

    /// Allocate an id, inserting a Null placeholder that `set` replaces.
    pub fn reserve_id(&mut self) -> ObjectId {
        let id = ObjectId::new(self.next_object_number, 0);
        self.next_object_number += 1;
        self.objects.insert(id, PdfObject::Null);
        id
    }

    pub fn set(&mut self, id: ObjectId, object: PdfObject) {
        self.objects.insert(id, object);
    }

    /// The catalog's object id, from the trailer `/Root`.
    pub fn catalog_id(&self) -> Result<ObjectId> {
        self.trailer
            .get("Root")
            .and_then(PdfObject::as_reference)
            .ok_or_else(|| TexuaError::InvalidStructure("trailer has no /Root".to_string()))
    }

    pub fn catalog(&self) -> Result<&PdfDictionary> {
        let id = self.catalog_id()?;
        self.get(id)
            .and_then(PdfObject::as_dict)
            .ok_or_else(|| TexuaError::InvalidStructure("catalog missing".to_string()))
    }

    /// Page object ids in document order.
    pub fn pages(&self) -> Result<Vec<ObjectId>> {
        let catalog = self.catalog()?;
        let pages_id = catalog
            .get("Pages")
            .and_then(PdfObject::as_reference)
            .ok_or_else(|| TexuaError::InvalidStructure("catalog has no /Pages".to_string()))?;

        let mut result = Vec::new();
        let mut visited = HashSet::new();
        self.collect_pages(pages_id, &mut result, &mut visited)?;
        Ok(result)
    }

    fn collect_pages(
        &self,
        id: ObjectId,
        out: &mut Vec<ObjectId>,
        visited: &mut HashSet<ObjectId>,
    ) -> Result<()> {
        if !visited.insert(id) {
            return Ok(()); // cycle in the page tree
        }
        let node = self
            .get(id)
            .and_then(PdfObject::as_dict)
            .ok_or_else(|| TexuaError::InvalidStructure(format!("page node {id:?} missing")))?;

        match node.get_type() {
            Some("Page") => out.push(id),
            _ => {
                // Treat anything with /Kids as an intermediate node.
                if let Some(kids) = node.get("Kids").map(|k| self.resolve(k)) {
                    if let Some(kids) = kids.as_array() {
                        let kid_ids: Vec<ObjectId> =
                            kids.iter().filter_map(PdfObject::as_reference).collect();
                        for kid in kid_ids {
                            self.collect_pages(kid, out, visited)?;
                        }
                    }
                } else if node.contains_key("Contents") || node.contains_key("MediaBox") {
                    // Pages written without /Type by sloppy generators.
                    out.push(id);
                }
            }
        }
        Ok(())
    }

    /// Decoded content of a page, coalescing `/Contents` arrays.
    pub fn page_content(&self, page_id: ObjectId) -> Result<Vec<u8>> {
        let page = self
            .get(page_id)
            .and_then(PdfObject::as_dict)
            .ok_or_else(|| TexuaError::InvalidStructure("page missing".to_string()))?;

        let Some(contents) = page.get("Contents") else {
            return Ok(Vec::new());
        };

        let mut streams = Vec::new();
        match self.resolve(contents) {
            PdfObject::Stream(stream) => streams.push(stream),
            PdfObject::Array(array) => {
                for entry in array.iter() {
                    if let PdfObject::Stream(stream) = self.resolve(entry) {
                        streams.push(stream);
                    }
                }
            }
            _ => return Ok(Vec::new()),
        }

        let mut data = Vec::new();
        for stream in streams {
            let decoded = decode_stream(&stream.data, &stream.dict)?;
            if !data.is_empty() {
                data.push(b'\n');
            }
            data.extend_from_slice(&decoded);
        }
        Ok(data)
    }

    /// Replace a page's content with a single Flate-compressed stream.
    pub fn set_page_content(&mut self, page_id: ObjectId, content: Vec<u8>) -> Result<()> {
        let compressed = crate::pdf::filters::flate_encode(&content)?;
        let mut dict = PdfDictionary::new();
        dict.insert("Length", PdfObject::Integer(compressed.len() as i64));
        dict.insert("Filter", PdfObject::name("FlateDecode"));
        let stream_id = self.add_object(PdfObject::Stream(PdfStream {
            dict,
            data: compressed,
        }));

        let page = self
            .get_mut(page_id)
            .and_then(PdfObject::as_dict_mut)
            .ok_or_else(|| TexuaError::InvalidStructure("page missing".to_string()))?;
        page.insert("Contents", PdfObject::Reference(stream_id));
        Ok(())
    }
}

fn parse_version(data: &[u8]) -> Result<String> {
    let head = &data[..data.len().min(16)];
    let text = String::from_utf8_lossy(head);
    match text.strip_prefix("%PDF-") {
        Some(rest) => Ok(rest
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect()),
        None => Err(TexuaError::InvalidHeader),
    }
}

fn locate_startxref(data: &[u8]) -> Result<usize> {
    let tail_len = data.len().min(2048);
    let tail = &data[data.len() - tail_len..];
    let marker = b"startxref";
    let position = tail
        .windows(marker.len())
        .rposition(|window| window == marker)
        .ok_or_else(|| TexuaError::ParseError("startxref not found".to_string()))?;

    let absolute = data.len() - tail_len + position + marker.len();
    let mut lexer = Lexer::at(data, absolute);
    match lexer.next_token()? {
        Some(token) => match token.kind {
            TokenKind::Integer(offset) if offset >= 0 => Ok(offset as usize),
            other => Err(TexuaError::ParseError(format!(
                "bad startxref offset: {other:?}"
            ))),
        },
        None => Err(TexuaError::ParseError("truncated startxref".to_string())),
    }
}

/// Parse a direct object from the token stream.
pub(crate) fn parse_object(lexer: &mut Lexer) -> Result<PdfObject> {
    let token = lexer
        .next_token()?
        .ok_or_else(|| TexuaError::ParseError("unexpected end of input".to_string()))?;

    match token.kind {
        TokenKind::Integer(value) => {
            // `N G R` lookahead for indirect references.
            if let (Some(second), Some(third)) = (lexer.peek_token(0)?, lexer.peek_token(1)?) {
                if let (TokenKind::Integer(generation), TokenKind::Keyword(ref kw)) =
                    (&second.kind, &third.kind)
                {
                    if kw == "R" && *generation >= 0 && value >= 0 {
                        let generation = *generation;
                        lexer.next_token()?;
                        lexer.next_token()?;
                        return Ok(PdfObject::Reference(ObjectId::new(
                            value as u32,
                            generation as u16,
                        )));
                    }
                }
            }
            Ok(PdfObject::Integer(value))
        }
        TokenKind::Real(value) => Ok(PdfObject::Real(value)),
        TokenKind::LiteralString(bytes) => Ok(PdfObject::String(PdfString::literal(bytes))),
        TokenKind::HexString(bytes) => Ok(PdfObject::String(PdfString::hex(bytes))),
        TokenKind::Name(name) => Ok(PdfObject::name(name)),
        TokenKind::ArrayOpen => {
            let mut array = PdfArray::new();
            loop {
                match lexer.peek_token(0)? {
                    Some(token) if token.kind == TokenKind::ArrayClose => {
                        lexer.next_token()?;
                        return Ok(PdfObject::Array(array));
                    }
                    Some(_) => array.push(parse_object(lexer)?),
                    None => return Ok(PdfObject::Array(array)), // unterminated
                }
            }
        }
        TokenKind::DictOpen => {
            let mut dict = PdfDictionary::new();
            loop {
                match lexer.next_token()? {
                    Some(token) => match token.kind {
                        TokenKind::DictClose => return Ok(PdfObject::Dictionary(dict)),
                        TokenKind::Name(key) => {
                            let value = parse_object(lexer)?;
                            dict.insert(key, value);
                        }
                        other => {
                            return Err(TexuaError::ParseError(format!(
                                "expected name key in dictionary, found {other:?}"
                            )))
                        }
                    },
                    None => return Ok(PdfObject::Dictionary(dict)), // unterminated
                }
            }
        }
        TokenKind::Keyword(keyword) => match keyword.as_str() {
            "true" => Ok(PdfObject::Boolean(true)),
            "false" => Ok(PdfObject::Boolean(false)),
            "null" => Ok(PdfObject::Null),
            other => Err(TexuaError::ParseError(format!(
                "unexpected keyword '{other}'"
            ))),
        },
        other => Err(TexuaError::ParseError(format!(
            "unexpected token {other:?}"
        ))),
    }
}

/// Parse `N G obj … endobj` at `offset`; returns the id, the object and
/// the position just past the object.
pub(crate) fn parse_indirect_object(
    data: &[u8],
    offset: usize,
) -> Result<(ObjectId, PdfObject, usize)> {
    let mut lexer = Lexer::at(data, offset);

    let number = match lexer.next_token()? {
        Some(token) => match token.kind {
            TokenKind::Integer(n) if n >= 0 => n as u32,
            other => {
                return Err(TexuaError::ParseError(format!(
                    "expected object number at {offset}, found {other:?}"
                )))
            }
        },
        None => return Err(TexuaError::ParseError("truncated object".to_string())),
    };
    let generation = match lexer.next_token()? {
        Some(token) => match token.kind {
            TokenKind::Integer(g) if g >= 0 => g as u16,
            other => {
                return Err(TexuaError::ParseError(format!(
                    "expected generation, found {other:?}"
                )))
            }
        },
        None => return Err(TexuaError::ParseError("truncated object".to_string())),
    };
    match lexer.next_token()? {
        Some(token) if token.kind == TokenKind::Keyword("obj".to_string()) => {}
        other => {
            return Err(TexuaError::ParseError(format!(
                "expected 'obj', found {other:?}"
            )))
        }
    }

    let object = parse_object(&mut lexer)?;

    // Streams: the keyword `stream` follows the dictionary.
    let object = match lexer.peek_token(0)? {
        Some(token) if token.kind == TokenKind::Keyword("stream".to_string()) => {
            let dict = match object {
                PdfObject::Dictionary(dict) => dict,
                other => {
                    return Err(TexuaError::ParseError(format!(
                        "stream without dictionary: {other:?}"
                    )))
                }
            };
            lexer.next_token()?;
            let mut start = lexer.position();
            // Exactly one EOL after `stream`.
            if data.get(start) == Some(&b'\r') {
                start += 1;
            }
            if data.get(start) == Some(&b'\n') {
                start += 1;
            }
            let (stream_data, end) = extract_stream_data(data, start, &dict)?;
            lexer.seek(end);
            // `endstream` keyword.
            if let Some(token) = lexer.peek_token(0)? {
                if token.kind == TokenKind::Keyword("endstream".to_string()) {
                    lexer.next_token()?;
                }
            }
            PdfObject::Stream(PdfStream {
                dict,
                data: stream_data,
            })
        }
        _ => object,
    };

    // `endobj` is expected but tolerated when missing.
    if let Some(token) = lexer.peek_token(0)? {
        if token.kind == TokenKind::Keyword("endobj".to_string()) {
            lexer.next_token()?;
        }
    }

    Ok((
        ObjectId::new(number, generation),
        object,
        lexer.position(),
    ))
}

/// Find the extent of stream data, trusting `/Length` only when the bytes
/// after it actually spell `endstream`.
fn extract_stream_data(
    data: &[u8],
    start: usize,
    dict: &PdfDictionary,
) -> Result<(Vec<u8>, usize)> {
    if let Some(length) = dict.get("Length").and_then(PdfObject::as_integer) {
        let end = start + length.max(0) as usize;
        if end <= data.len() {
            let mut probe = end;
            while probe < data.len() && is_whitespace(data[probe]) {
                probe += 1;
            }
            if data[probe..].starts_with(b"endstream") {
                return Ok((data[start..end].to_vec(), end));
            }
        }
    }

    // /Length indirect, wrong, or missing: scan for the terminator.
    let marker = b"endstream";
    match data[start..]
        .windows(marker.len())
        .position(|window| window == marker)
    {
        Some(position) => {
            let mut end = start + position;
            // Trim the EOL that precedes `endstream`.
            if end > start && data[end - 1] == b'\n' {
                end -= 1;
            }
            if end > start && data[end - 1] == b'\r' {
                end -= 1;
            }
            Ok((data[start..end].to_vec(), end))
        }
        None => Err(TexuaError::ParseError(
            "stream without endstream".to_string(),
        )),
    }
}

/// Extract one object from an object stream (`/Type /ObjStm`).
fn unpack_from_object_stream(
    objects: &BTreeMap<ObjectId, PdfObject>,
    container: u32,
    index: u32,
) -> Result<PdfObject> {
    let stream = objects
        .get(&ObjectId::new(container, 0))
        .and_then(PdfObject::as_stream)
        .ok_or_else(|| {
            TexuaError::InvalidStructure(format!("object stream {container} missing"))
        })?;

    let decoded = decode_stream(&stream.data, &stream.dict)?;
    let count = stream
        .dict
        .get("N")
        .and_then(PdfObject::as_integer)
        .unwrap_or(0) as usize;
    let first = stream
        .dict
        .get("First")
        .and_then(PdfObject::as_integer)
        .unwrap_or(0) as usize;

    let mut header = Lexer::new(&decoded);
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        let (Some(a), Some(b)) = (header.next_token()?, header.next_token()?) else {
            break;
        };
        if let (TokenKind::Integer(_number), TokenKind::Integer(offset)) = (a.kind, b.kind) {
            offsets.push(offset as usize);
        }
    }

    let relative = *offsets.get(index as usize).ok_or_else(|| {
        TexuaError::InvalidStructure(format!(
            "object stream {container} has no index {index}"
        ))
    })?;

    let mut lexer = Lexer::at(&decoded, first + relative);
    parse_object(&mut lexer)
}

/// Last-resort scan for `N G obj` headers when the xref is broken.
fn recovery_scan(
    data: &[u8],
) -> Result<(std::collections::HashMap<u32, XrefEntry>, PdfDictionary)> {
    let mut entries = std::collections::HashMap::new();
    let marker = b" obj";
    let mut search = 0usize;

    while let Some(found) = data[search..]
        .windows(marker.len())
        .position(|window| window == marker)
    {
        let keyword_at = search + found;
        search = keyword_at + marker.len();

        // Walk backwards over `N G ` preceding the keyword.
        let mut cursor = keyword_at;
        let mut skip_back = |pred: fn(u8) -> bool, cursor: &mut usize| {
            let start = *cursor;
            while *cursor > 0 && pred(data[*cursor - 1]) {
                *cursor -= 1;
            }
            start != *cursor
        };
        if !skip_back(|b| b.is_ascii_digit(), &mut cursor) {
            continue;
        }
        let generation_start = cursor;
        if !skip_back(|b| b == b' ', &mut cursor) {
            continue;
        }
        let digits_end = cursor;
        if !skip_back(|b| b.is_ascii_digit(), &mut cursor) {
            continue;
        }
        let number_start = cursor;

        let number: u32 = match std::str::from_utf8(&data[number_start..digits_end])
            .ok()
            .and_then(|s| s.parse().ok())
        {
            Some(n) => n,
            None => continue,
        };
        let _ = generation_start;

        entries.insert(
            number,
            XrefEntry::Offset {
                offset: number_start,
                generation: 0,
            },
        );
    }

    if entries.is_empty() {
        return Err(TexuaError::ParseError(
            "no objects found in damaged file".to_string(),
        ));
    }

    // Rebuild a minimal trailer by locating the catalog.
    let mut trailer = PdfDictionary::new();
    let offsets: Vec<(u32, usize)> = entries
        .iter()
        .filter_map(|(&n, e)| match e {
            XrefEntry::Offset { offset, .. } => Some((n, *offset)),
            _ => None,
        })
        .collect();
    for (number, offset) in offsets {
        if let Ok((_, object, _)) = parse_indirect_object(data, offset) {
            if object.as_dict().and_then(PdfDictionary::get_type) == Some("Catalog") {
                trailer.insert("Root", PdfObject::Reference(ObjectId::new(number, 0)));
                break;
            }
        }
    }
    if !trailer.contains_key("Root") {
        return Err(TexuaError::InvalidStructure(
            "damaged file has no catalog".to_string(),
        ));
    }
    Ok((entries, trailer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_reference() {
        let mut lexer = Lexer::new(b"3 0 R");
        let object = parse_object(&mut lexer).unwrap();
        assert_eq!(object, PdfObject::Reference(ObjectId::new(3, 0)));
    }

    #[test]
    fn test_parse_nested_dict() {
        let mut lexer = Lexer::new(b"<< /A << /B [1 2 3] >> /C (hi) >>");
        let object = parse_object(&mut lexer).unwrap();
        let dict = object.as_dict().unwrap();
        let inner = dict.get("A").unwrap().as_dict().unwrap();
        assert_eq!(inner.get("B").unwrap().as_array().unwrap().len(), 3);
        assert_eq!(dict.get("C").unwrap().as_string().unwrap().bytes, b"hi");
    }

    #[test]
    fn test_parse_indirect_stream() {
        let data = b"5 0 obj\n<< /Length 4 >>\nstream\nabcd\nendstream\nendobj\n";
        let (id, object, _) = parse_indirect_object(data, 0).unwrap();
        assert_eq!(id, ObjectId::new(5, 0));
        assert_eq!(object.as_stream().unwrap().data, b"abcd");
    }

    #[test]
    fn test_stream_with_wrong_length_recovers() {
        let data = b"5 0 obj\n<< /Length 999 >>\nstream\nabcd\nendstream\nendobj\n";
        let (_, object, _) = parse_indirect_object(data, 0).unwrap();
        assert_eq!(object.as_stream().unwrap().data, b"abcd");
    }

    #[test]
    fn test_integer_pair_not_reference() {
        let mut lexer = Lexer::new(b"[1 2 3]");
        let object = parse_object(&mut lexer).unwrap();
        let array = object.as_array().unwrap();
        assert_eq!(array.len(), 3);
        assert_eq!(array.get(0).unwrap().as_integer(), Some(1));
    }
}
