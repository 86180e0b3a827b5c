//! Content-stream rewriting: marked-content injection.
//!
//! Every text-drawing operator inside a `BT…ET` block is wrapped in its
//! own `BDC /Span <</MCID n>> … EMC` sequence; runs of operators outside
//! text blocks are wrapped as `/Artifact` (ISO 32000-1 §14.6, §14.8.2.2;
//! PDF/UA-1 §7.1 requires every content item to be tagged or an artifact).
//!
//! Untouched instructions are copied from the source stream byte-for-byte
//! via their recorded spans.

use crate::error::Result;
use crate::pdf::content::{is_text_showing_operator, parse_instructions, ContentInstruction};
use crate::pdf::writer::serialize_literal_string;

/// One marked-content sequence produced for a page: its MCID and the text
/// extracted from the wrapped operator.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkedContentEntry {
    pub mcid: u32,
    pub text: String,
}

/// Result of rewriting one page's content stream.
#[derive(Debug)]
pub struct RewrittenPage {
    pub content: Vec<u8>,
    pub marks: Vec<MarkedContentEntry>,
}

/// Rewrite a page content stream, allocating MCIDs from zero.
pub fn rewrite_page_content(source: &[u8]) -> Result<RewrittenPage> {
    let instructions = parse_instructions(source)?;

    let mut out: Vec<u8> = Vec::with_capacity(source.len() + source.len() / 2);
    let mut marks = Vec::new();
    let mut mcid: u32 = 0;
    let mut in_text_block = false;
    let mut pending_artifact: Vec<&ContentInstruction> = Vec::new();

    for instruction in &instructions {
        match instruction.operator.as_str() {
            "BT" => {
                flush_artifact(&mut out, &mut pending_artifact, source);
                emit_raw(&mut out, instruction.raw(source));
                in_text_block = true;
            }
            "ET" => {
                emit_raw(&mut out, instruction.raw(source));
                in_text_block = false;
            }
            op if in_text_block && is_text_showing_operator(op) => {
                let text = extract_text(instruction);
                emit_span_open(&mut out, mcid, &text);
                emit_raw(&mut out, instruction.raw(source));
                out.extend_from_slice(b"EMC\n");
                marks.push(MarkedContentEntry { mcid, text });
                mcid += 1;
            }
            _ if in_text_block => {
                // Graphics-state and positioning operators inside the text
                // block stay where they are.
                emit_raw(&mut out, instruction.raw(source));
            }
            _ => pending_artifact.push(instruction),
        }
    }
    flush_artifact(&mut out, &mut pending_artifact, source);

    Ok(RewrittenPage {
        content: out,
        marks,
    })
}

/// Wrap the accumulated non-text run in a single artifact sequence.
fn flush_artifact(out: &mut Vec<u8>, pending: &mut Vec<&ContentInstruction>, source: &[u8]) {
    if pending.is_empty() {
        return;
    }
    out.extend_from_slice(b"/Artifact <<>> BDC\n");
    for instruction in pending.drain(..) {
        emit_raw(out, instruction.raw(source));
    }
    out.extend_from_slice(b"EMC\n");
}

fn emit_span_open(out: &mut Vec<u8>, mcid: u32, text: &str) {
    out.extend_from_slice(b"/Span <</MCID ");
    out.extend_from_slice(mcid.to_string().as_bytes());
    if !text.is_empty() {
        // Unicode fallback for fonts without a ToUnicode CMap
        // (ISO 14289-1 §7.21.7).
        out.extend_from_slice(b" /ActualText ");
        serialize_literal_string(out, &latin1_bytes(text));
    }
    out.extend_from_slice(b">> BDC\n");
}

fn emit_raw(out: &mut Vec<u8>, raw: &[u8]) {
    out.extend_from_slice(raw);
    out.push(b'\n');
}

/// Latin-1 text of the string operands of a text-showing operator.
///
/// `TJ` kerning numbers are dropped; the `'`/`"` spacing operands are
/// numeric and fall away for the same reason. The decoding is
/// font-encoding dependent and deliberately lossy: it exists to feed the
/// fuzzy matcher, not to be authoritative Unicode.
fn extract_text(instruction: &ContentInstruction) -> String {
    let mut text = String::new();
    for bytes in instruction.string_operand_bytes() {
        text.extend(bytes.iter().map(|&b| b as char));
    }
    text
}

fn latin1_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) <= 0xFF { c as u8 } else { b'?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::content::parse_instructions;

    fn operators(content: &[u8]) -> Vec<String> {
        parse_instructions(content)
            .unwrap()
            .iter()
            .map(|i| i.operator.clone())
            .collect()
    }

    #[test]
    fn test_text_operator_wrapped() {
        let page = rewrite_page_content(b"BT /F1 12 Tf (Hello) Tj ET").unwrap();
        let ops = operators(&page.content);
        assert_eq!(ops, vec!["BT", "Tf", "BDC", "Tj", "EMC", "ET"]);
        assert_eq!(page.marks.len(), 1);
        assert_eq!(page.marks[0].mcid, 0);
        assert_eq!(page.marks[0].text, "Hello");
    }

    #[test]
    fn test_mcids_dense_from_zero() {
        let page =
            rewrite_page_content(b"BT (a) Tj (b) Tj ET BT (c) Tj ET").unwrap();
        let mcids: Vec<u32> = page.marks.iter().map(|m| m.mcid).collect();
        assert_eq!(mcids, vec![0, 1, 2]);
    }

    #[test]
    fn test_graphics_wrapped_as_artifact() {
        let page = rewrite_page_content(b"0 0 100 100 re f").unwrap();
        let ops = operators(&page.content);
        assert_eq!(ops, vec!["BDC", "re", "f", "EMC"]);
        assert!(page.marks.is_empty());
        assert!(page.content.starts_with(b"/Artifact <<>> BDC"));
    }

    #[test]
    fn test_artifact_flushed_before_bt() {
        let page = rewrite_page_content(b"q 1 0 0 1 0 0 cm BT (x) Tj ET Q").unwrap();
        let ops = operators(&page.content);
        assert_eq!(
            ops,
            vec!["BDC", "q", "cm", "EMC", "BT", "BDC", "Tj", "EMC", "ET", "BDC", "Q", "EMC"]
        );
    }

    #[test]
    fn test_no_bdc_nesting_inside_wrap() {
        let page = rewrite_page_content(b"BT (a) Tj ET").unwrap();
        let text = String::from_utf8_lossy(&page.content);
        let bdc_at = text.find("BDC").unwrap();
        let emc_at = text.find("EMC").unwrap();
        assert!(bdc_at < text.find("Tj").unwrap());
        assert!(emc_at > text.find("Tj").unwrap());
        assert_eq!(text.matches("BDC").count(), 1);
        assert_eq!(text.matches("EMC").count(), 1);
    }

    #[test]
    fn test_tj_array_text_extraction() {
        let page = rewrite_page_content(b"BT [(Hel) -20 (lo)] TJ ET").unwrap();
        assert_eq!(page.marks[0].text, "Hello");
    }

    #[test]
    fn test_quote_operator_text() {
        let page = rewrite_page_content(b"BT 2 3 (spaced) \" ET").unwrap();
        assert_eq!(page.marks[0].text, "spaced");
    }

    #[test]
    fn test_latin1_decoding_of_high_bytes() {
        let page = rewrite_page_content(b"BT (caf\xE9) Tj ET").unwrap();
        assert_eq!(page.marks[0].text, "café");
    }

    #[test]
    fn test_actual_text_written() {
        let page = rewrite_page_content(b"BT (Hi) Tj ET").unwrap();
        let text = String::from_utf8_lossy(&page.content);
        assert!(text.contains("/ActualText (Hi)"));
    }

    #[test]
    fn test_empty_text_omits_actual_text() {
        let page = rewrite_page_content(b"BT () Tj ET").unwrap();
        let text = String::from_utf8_lossy(&page.content);
        assert!(!text.contains("/ActualText"));
        assert_eq!(page.marks[0].text, "");
    }

    #[test]
    fn test_unchanged_operands_byte_faithful() {
        let source = b"BT 1.50 0 0 1.50 72.00 720.00 Tm (x) Tj ET";
        let page = rewrite_page_content(source).unwrap();
        let text = String::from_utf8_lossy(&page.content);
        // The matrix keeps its original digits exactly.
        assert!(text.contains("1.50 0 0 1.50 72.00 720.00 Tm"));
    }

    #[test]
    fn test_decorative_page_single_artifact() {
        let page = rewrite_page_content(b"0 720 612 1 re f 0 10 612 1 re f").unwrap();
        let text = String::from_utf8_lossy(&page.content);
        assert_eq!(text.matches("BDC").count(), 1);
        assert_eq!(text.matches("EMC").count(), 1);
        assert!(page.marks.is_empty());
    }

    #[test]
    fn test_empty_stream() {
        let page = rewrite_page_content(b"").unwrap();
        assert!(page.content.is_empty());
        assert!(page.marks.is_empty());
    }
}
