//! Content-stream instruction parsing.
//!
//! Instructions keep the byte span they were read from, so a rewriter can
//! copy untouched instructions verbatim instead of re-serialising them —
//! operand number formats and string forms survive the round trip exactly.

use crate::error::Result;
use crate::pdf::lexer::{is_whitespace, Lexer, Token, TokenKind};

/// One content-stream instruction: operand tokens plus the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentInstruction {
    pub operator: String,
    pub operands: Vec<Token>,
    /// Byte range covering operands and operator in the source stream.
    pub start: usize,
    pub end: usize,
}

impl ContentInstruction {
    /// The raw source bytes of this instruction.
    pub fn raw<'a>(&self, source: &'a [u8]) -> &'a [u8] {
        &source[self.start..self.end]
    }

    /// String bytes of every string operand, in order. For `TJ` this
    /// descends into the array and skips the kerning numbers.
    pub fn string_operand_bytes(&self) -> Vec<&[u8]> {
        self.operands
            .iter()
            .filter_map(|token| match &token.kind {
                TokenKind::LiteralString(bytes) | TokenKind::HexString(bytes) => {
                    Some(bytes.as_slice())
                }
                _ => None,
            })
            .collect()
    }
}

/// Operators that draw text (ISO 32000-1 §9.4.3); always inside `BT…ET`.
pub fn is_text_showing_operator(operator: &str) -> bool {
    matches!(operator, "Tj" | "TJ" | "'" | "\"")
}

/// Parse a content stream into instructions.
///
/// Malformed trailing operands (an operand run without an operator at end
/// of stream) are dropped; inline images (`BI…ID…EI`) become a single
/// instruction with operator `BI` whose span covers the image data.
pub fn parse_instructions(source: &[u8]) -> Result<Vec<ContentInstruction>> {
    let mut lexer = Lexer::new(source);
    let mut instructions = Vec::new();
    let mut operands: Vec<Token> = Vec::new();

    while let Some(token) = lexer.next_token()? {
        match &token.kind {
            TokenKind::Keyword(keyword) => {
                if keyword == "BI" {
                    let start = match operands.first() {
                        Some(first) => first.start,
                        None => token.start,
                    };
                    let end = skip_inline_image(source, token.end);
                    lexer.seek(end);
                    instructions.push(ContentInstruction {
                        operator: "BI".to_string(),
                        operands: std::mem::take(&mut operands),
                        start,
                        end,
                    });
                    continue;
                }
                let start = match operands.first() {
                    Some(first) => first.start,
                    None => token.start,
                };
                instructions.push(ContentInstruction {
                    operator: keyword.clone(),
                    operands: std::mem::take(&mut operands),
                    start,
                    end: token.end,
                });
            }
            _ => operands.push(token),
        }
    }

    Ok(instructions)
}

/// Advance past an inline image: the `ID` keyword, the binary payload and
/// the closing `EI` (which must be followed by whitespace or end of data).
fn skip_inline_image(source: &[u8], mut position: usize) -> usize {
    // Find `ID` at token level first; its parameters are regular tokens.
    let mut lexer = Lexer::at(source, position);
    while let Ok(Some(token)) = lexer.next_token() {
        position = token.end;
        if token.kind == TokenKind::Keyword("ID".to_string()) {
            break;
        }
    }
    // One whitespace byte separates ID from the image data.
    if position < source.len() && is_whitespace(source[position]) {
        position += 1;
    }
    // Scan for EI delimited by whitespace.
    let mut cursor = position;
    while cursor + 1 < source.len() {
        if source[cursor] == b'E'
            && source[cursor + 1] == b'I'
            && (cursor == 0 || is_whitespace(source[cursor - 1]))
            && (cursor + 2 >= source.len() || is_whitespace(source[cursor + 2]))
        {
            return cursor + 2;
        }
        cursor += 1;
    }
    source.len()
}
