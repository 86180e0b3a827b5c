//! Low-level tokenizer for PDF object syntax.
//!
//! Shared by the document reader (indirect objects, trailers) and the
//! content-stream instruction parser. Every token records the byte span it
//! was read from, which lets the content rewriter copy untouched
//! instructions verbatim instead of re-serialising them.

use crate::error::{Result, TexuaError};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Integer(i64),
    Real(f64),
    /// Literal `(…)` string, unescaped bytes.
    LiteralString(Vec<u8>),
    /// Hex `<…>` string, decoded bytes.
    HexString(Vec<u8>),
    /// `/Name`, `#xx` escapes resolved, without the slash.
    Name(String),
    /// Bare keyword: `true`, `obj`, `stream`, content operators, …
    Keyword(String),
    ArrayOpen,
    ArrayClose,
    DictOpen,
    DictClose,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

pub struct Lexer<'a> {
    input: &'a [u8],
    position: usize,
    peeked: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            position: 0,
            peeked: Vec::new(),
        }
    }

    pub fn at(input: &'a [u8], position: usize) -> Self {
        Self {
            input,
            position,
            peeked: Vec::new(),
        }
    }

    /// Current read position (past any consumed tokens, before peeked ones).
    pub fn position(&self) -> usize {
        match self.peeked.first() {
            Some(token) => token.start,
            None => self.position,
        }
    }

    /// Reposition the cursor, discarding lookahead.
    pub fn seek(&mut self, position: usize) {
        self.position = position;
        self.peeked.clear();
    }

    pub fn input(&self) -> &'a [u8] {
        self.input
    }

    pub fn next_token(&mut self) -> Result<Option<Token>> {
        if !self.peeked.is_empty() {
            return Ok(Some(self.peeked.remove(0)));
        }
        self.read_token()
    }

    /// Look ahead `index` tokens without consuming them.
    pub fn peek_token(&mut self, index: usize) -> Result<Option<Token>> {
        while self.peeked.len() <= index {
            match self.read_token_raw()? {
                Some(token) => self.peeked.push(token),
                None => return Ok(None),
            }
        }
        Ok(self.peeked.get(index).cloned())
    }

    fn read_token(&mut self) -> Result<Option<Token>> {
        self.read_token_raw()
    }

    fn read_token_raw(&mut self) -> Result<Option<Token>> {
        self.skip_whitespace_and_comments();
        if self.position >= self.input.len() {
            return Ok(None);
        }

        let start = self.position;
        let byte = self.input[self.position];
        let kind = match byte {
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number()?,
            b'(' => self.read_literal_string()?,
            b'<' => {
                if self.peek_at(1) == Some(b'<') {
                    self.position += 2;
                    TokenKind::DictOpen
                } else {
                    self.read_hex_string()?
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'>') {
                    self.position += 2;
                    TokenKind::DictClose
                } else {
                    return Err(TexuaError::ParseError(format!(
                        "unexpected '>' at offset {start}"
                    )));
                }
            }
            b'[' => {
                self.position += 1;
                TokenKind::ArrayOpen
            }
            b']' => {
                self.position += 1;
                TokenKind::ArrayClose
            }
            b'/' => self.read_name()?,
            b')' | b'{' | b'}' => {
                // Stray delimiter: consume as a keyword so malformed
                // streams do not wedge the tokenizer.
                self.position += 1;
                TokenKind::Keyword((byte as char).to_string())
            }
            _ => self.read_keyword(),
        };

        Ok(Some(Token {
            kind,
            start,
            end: self.position,
        }))
    }

    fn skip_whitespace_and_comments(&mut self) {
        while self.position < self.input.len() {
            match self.input[self.position] {
                b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' | b'\0' => self.position += 1,
                b'%' => {
                    while self.position < self.input.len()
                        && self.input[self.position] != b'\n'
                        && self.input[self.position] != b'\r'
                    {
                        self.position += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.position + offset).copied()
    }

    fn read_number(&mut self) -> Result<TokenKind> {
        let start = self.position;
        let mut has_dot = false;

        if matches!(self.input[self.position], b'+' | b'-') {
            self.position += 1;
        }
        while self.position < self.input.len() {
            match self.input[self.position] {
                b'0'..=b'9' => self.position += 1,
                b'.' if !has_dot => {
                    has_dot = true;
                    self.position += 1;
                }
                _ => break,
            }
        }

        let text = std::str::from_utf8(&self.input[start..self.position])
            .map_err(|_| TexuaError::ParseError(format!("invalid number at offset {start}")))?;
        if has_dot {
            let value: f64 = normalize_real(text).parse().map_err(|_| {
                TexuaError::ParseError(format!("invalid real '{text}' at offset {start}"))
            })?;
            Ok(TokenKind::Real(value))
        } else {
            let value: i64 = text.parse().map_err(|_| {
                TexuaError::ParseError(format!("invalid integer '{text}' at offset {start}"))
            })?;
            Ok(TokenKind::Integer(value))
        }
    }

    fn read_literal_string(&mut self) -> Result<TokenKind> {
        self.position += 1; // opening paren
        let mut bytes = Vec::new();
        let mut depth = 1usize;

        while self.position < self.input.len() {
            let byte = self.input[self.position];
            self.position += 1;
            match byte {
                b'\\' => {
                    let Some(escaped) = self.input.get(self.position).copied() else {
                        break;
                    };
                    self.position += 1;
                    match escaped {
                        b'n' => bytes.push(b'\n'),
                        b'r' => bytes.push(b'\r'),
                        b't' => bytes.push(b'\t'),
                        b'b' => bytes.push(0x08),
                        b'f' => bytes.push(0x0C),
                        b'(' => bytes.push(b'('),
                        b')' => bytes.push(b')'),
                        b'\\' => bytes.push(b'\\'),
                        b'\r' => {
                            // Line continuation; swallow a following LF too.
                            if self.input.get(self.position) == Some(&b'\n') {
                                self.position += 1;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut value = (escaped - b'0') as u32;
                            for _ in 0..2 {
                                match self.input.get(self.position) {
                                    Some(&digit @ b'0'..=b'7') => {
                                        value = value * 8 + (digit - b'0') as u32;
                                        self.position += 1;
                                    }
                                    _ => break,
                                }
                            }
                            bytes.push((value & 0xFF) as u8);
                        }
                        other => bytes.push(other),
                    }
                }
                b'(' => {
                    depth += 1;
                    bytes.push(b'(');
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(TokenKind::LiteralString(bytes));
                    }
                    bytes.push(b')');
                }
                other => bytes.push(other),
            }
        }
        // Unterminated string: return what we have.
        Ok(TokenKind::LiteralString(bytes))
    }

    fn read_hex_string(&mut self) -> Result<TokenKind> {
        self.position += 1; // opening angle
        let mut bytes = Vec::new();
        let mut pending: Option<u8> = None;

        while self.position < self.input.len() {
            let byte = self.input[self.position];
            self.position += 1;
            match byte {
                b'>' => {
                    if let Some(high) = pending {
                        bytes.push(high << 4);
                    }
                    return Ok(TokenKind::HexString(bytes));
                }
                b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' | b'\0' => {}
                _ => {
                    let Some(digit) = hex_value(byte) else {
                        continue; // tolerate junk inside hex strings
                    };
                    match pending.take() {
                        Some(high) => bytes.push((high << 4) | digit),
                        None => pending = Some(digit),
                    }
                }
            }
        }
        Ok(TokenKind::HexString(bytes))
    }

    fn read_name(&mut self) -> Result<TokenKind> {
        self.position += 1; // slash
        let mut name = String::new();
        while self.position < self.input.len() {
            let byte = self.input[self.position];
            if is_delimiter(byte) || is_whitespace(byte) {
                break;
            }
            self.position += 1;
            if byte == b'#' {
                let high = self.input.get(self.position).copied().and_then(hex_value);
                let low = self
                    .input
                    .get(self.position + 1)
                    .copied()
                    .and_then(hex_value);
                if let (Some(high), Some(low)) = (high, low) {
                    self.position += 2;
                    name.push(((high << 4) | low) as char);
                    continue;
                }
            }
            name.push(byte as char);
        }
        Ok(TokenKind::Name(name))
    }

    fn read_keyword(&mut self) -> TokenKind {
        let start = self.position;
        while self.position < self.input.len() {
            let byte = self.input[self.position];
            if is_delimiter(byte) || is_whitespace(byte) {
                break;
            }
            self.position += 1;
        }
        let text = String::from_utf8_lossy(&self.input[start..self.position]).into_owned();
        TokenKind::Keyword(text)
    }
}

/// PDF reals may be written as `.5`, `-.7` or `4.`; make them parseable.
fn normalize_real(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    let (sign, rest) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.strip_prefix('+').unwrap_or(text)),
    };
    out.push_str(sign);
    if rest.starts_with('.') {
        out.push('0');
    }
    out.push_str(rest);
    if out.ends_with('.') {
        out.push('0');
    }
    out
}

pub fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' | b'\0')
}

pub fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
