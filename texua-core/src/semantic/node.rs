//! Semantic document tree shared between the LaTeX parser and the tagger.
//!
//! The parser produces a tree of [`DocumentNode`] values; the tagger reads
//! that tree and embeds the corresponding structure into a PDF. This module
//! is the only data structure the two stages share.

use serde::{Deserialize, Serialize};

/// PDF structure roles produced by the LaTeX parser.
///
/// The serialized names are the standard structure-type names from
/// ISO 32000-1 Table 337, which is also the stable JSON wire format
/// used by `--dump-tree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeTag {
    Document,
    #[serde(rename = "Sect")]
    Section,
    #[serde(rename = "H1")]
    Heading1,
    #[serde(rename = "H2")]
    Heading2,
    #[serde(rename = "H3")]
    Heading3,
    #[serde(rename = "H4")]
    Heading4,
    #[serde(rename = "P")]
    Paragraph,
    #[serde(rename = "L")]
    List,
    #[serde(rename = "LI")]
    ListItem,
    Formula,
    Code,
    Figure,
    Link,
}

impl NodeTag {
    /// The PDF structure-type name for this tag.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            NodeTag::Document => "Document",
            NodeTag::Section => "Sect",
            NodeTag::Heading1 => "H1",
            NodeTag::Heading2 => "H2",
            NodeTag::Heading3 => "H3",
            NodeTag::Heading4 => "H4",
            NodeTag::Paragraph => "P",
            NodeTag::List => "L",
            NodeTag::ListItem => "LI",
            NodeTag::Formula => "Formula",
            NodeTag::Code => "Code",
            NodeTag::Figure => "Figure",
            NodeTag::Link => "Link",
        }
    }

    /// Heading tag for a LaTeX sectioning depth (0 = `\section`/`\chapter`).
    pub fn heading_for_depth(depth: usize) -> NodeTag {
        match depth {
            0 => NodeTag::Heading1,
            1 => NodeTag::Heading2,
            2 => NodeTag::Heading3,
            _ => NodeTag::Heading4,
        }
    }

    /// Heading level 1..=4, or `None` for non-heading tags.
    pub fn heading_level(&self) -> Option<u8> {
        match self {
            NodeTag::Heading1 => Some(1),
            NodeTag::Heading2 => Some(2),
            NodeTag::Heading3 => Some(3),
            NodeTag::Heading4 => Some(4),
            _ => None,
        }
    }

    /// Heading tag for a level 1..=4; levels above 4 clamp to H4.
    pub fn heading_for_level(level: u8) -> NodeTag {
        match level {
            1 => NodeTag::Heading1,
            2 => NodeTag::Heading2,
            3 => NodeTag::Heading3,
            _ => NodeTag::Heading4,
        }
    }

    /// True for tags whose text is an alternative description (`/Alt`)
    /// rather than a literal replacement (`/ActualText`).
    pub fn uses_alt_text(&self) -> bool {
        matches!(self, NodeTag::Formula | NodeTag::Code | NodeTag::Figure)
    }
}

/// A single node in the semantic document tree.
///
/// `text` holds the readable content of leaf nodes; for Formula, Code and
/// Figure it is the alternative description (raw LaTeX source, source code,
/// or caption respectively). Interior containers leave it empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub tag: NodeTag,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DocumentNode>,
}

impl DocumentNode {
    pub fn new(tag: NodeTag) -> Self {
        Self {
            tag,
            text: String::new(),
            children: Vec::new(),
        }
    }

    pub fn with_text(tag: NodeTag, text: impl Into<String>) -> Self {
        Self {
            tag,
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Serialize the tree to the stable JSON wire format.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a tree from its JSON wire format.
    pub fn from_json(s: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// All descendants (including self) with the given tag and non-empty text.
    pub fn collect_by_tag(&self, tag: NodeTag) -> Vec<&DocumentNode> {
        let mut result = Vec::new();
        self.collect_by_tag_into(tag, &mut result);
        result
    }

    fn collect_by_tag_into<'a>(&'a self, tag: NodeTag, out: &mut Vec<&'a DocumentNode>) {
        if self.tag == tag && !self.text.is_empty() {
            out.push(self);
        }
        for child in &self.children {
            child.collect_by_tag_into(tag, out);
        }
    }

    /// Replace, in tree order, the text of every node with the given tag.
    ///
    /// `texts` must line up with the order produced by [`collect_by_tag`];
    /// extra entries are ignored.
    pub fn replace_texts(&mut self, tag: NodeTag, texts: &[String]) {
        let mut index = 0;
        self.replace_texts_inner(tag, texts, &mut index);
    }

    fn replace_texts_inner(&mut self, tag: NodeTag, texts: &[String], index: &mut usize) {
        if self.tag == tag && !self.text.is_empty() {
            if let Some(text) = texts.get(*index) {
                self.text = text.clone();
            }
            *index += 1;
        }
        for child in &mut self.children {
            child.replace_texts_inner(tag, texts, index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_tree() -> DocumentNode {
        let mut root = DocumentNode::new(NodeTag::Document);
        let mut section = DocumentNode::new(NodeTag::Section);
        section
            .children
            .push(DocumentNode::with_text(NodeTag::Heading1, "Intro"));
        section
            .children
            .push(DocumentNode::with_text(NodeTag::Paragraph, "hello world"));
        section
            .children
            .push(DocumentNode::with_text(NodeTag::Formula, "$a+b$"));
        root.children.push(section);
        root
    }

    #[test]
    fn test_json_round_trip() {
        let tree = sample_tree();
        let json = tree.to_json().unwrap();
        let parsed = DocumentNode::from_json(&json).unwrap();
        assert_eq!(tree, parsed);
    }

    #[test]
    fn test_json_role_strings() {
        let tree = sample_tree();
        let json = tree.to_json().unwrap();
        assert!(json.contains("\"Document\""));
        assert!(json.contains("\"Sect\""));
        assert!(json.contains("\"H1\""));
        assert!(json.contains("\"P\""));
        // Empty text and children are omitted from the wire format.
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("text").is_none());
    }

    #[test]
    fn test_collect_by_tag() {
        let tree = sample_tree();
        let formulas = tree.collect_by_tag(NodeTag::Formula);
        assert_eq!(formulas.len(), 1);
        assert_eq!(formulas[0].text, "$a+b$");
    }

    #[test]
    fn test_replace_texts() {
        let mut tree = sample_tree();
        tree.replace_texts(NodeTag::Formula, &["a plus b".to_string()]);
        let formulas = tree.collect_by_tag(NodeTag::Formula);
        assert_eq!(formulas[0].text, "a plus b");
    }

    #[test]
    fn test_heading_helpers() {
        assert_eq!(NodeTag::heading_for_depth(0), NodeTag::Heading1);
        assert_eq!(NodeTag::heading_for_depth(3), NodeTag::Heading4);
        assert_eq!(NodeTag::heading_for_depth(9), NodeTag::Heading4);
        assert_eq!(NodeTag::Heading2.heading_level(), Some(2));
        assert_eq!(NodeTag::Paragraph.heading_level(), None);
        assert!(NodeTag::Figure.uses_alt_text());
        assert!(!NodeTag::Paragraph.uses_alt_text());
    }
}
