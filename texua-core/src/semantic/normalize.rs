//! Heading normalisation.
//!
//! PDF/UA-1 requires heading levels to be dense and to begin at 1
//! (ISO 14289-1 §7.4). A LaTeX source that only uses `\subsection` and
//! `\paragraph` would otherwise produce H2/H4, so after parsing the tree
//! is rewritten: empty headings are pruned together with their sections,
//! and the set of levels actually used is remapped onto the compact
//! prefix H1..Hk.

use super::node::{DocumentNode, NodeTag};
use std::collections::BTreeSet;

/// Normalise heading levels in place.
pub fn normalize_headings(root: &mut DocumentNode) {
    prune_empty_sections(root);

    let mut used = BTreeSet::new();
    collect_levels(root, &mut used);

    // Already dense and starting at 1: nothing to rewrite.
    let dense: Vec<u8> = (1..=used.len() as u8).collect();
    let used: Vec<u8> = used.into_iter().collect();
    if used == dense {
        return;
    }

    remap_levels(root, &used);
}

/// Remove any Section whose sole child is an empty Heading, recursively.
fn prune_empty_sections(node: &mut DocumentNode) {
    for child in &mut node.children {
        prune_empty_sections(child);
    }
    node.children.retain(|child| {
        !(child.tag == NodeTag::Section
            && child.children.len() == 1
            && child.children[0].tag.heading_level().is_some()
            && child.children[0].text.is_empty())
    });
}

fn collect_levels(node: &DocumentNode, used: &mut BTreeSet<u8>) {
    if let Some(level) = node.tag.heading_level() {
        used.insert(level);
    }
    for child in &node.children {
        collect_levels(child, used);
    }
}

fn remap_levels(node: &mut DocumentNode, used: &[u8]) {
    if let Some(level) = node.tag.heading_level() {
        if let Some(position) = used.iter().position(|&l| l == level) {
            node.tag = NodeTag::heading_for_level(position as u8 + 1);
        }
    }
    for child in &mut node.children {
        remap_levels(child, used);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section_with_heading(tag: NodeTag, text: &str) -> DocumentNode {
        let mut section = DocumentNode::new(NodeTag::Section);
        section.children.push(DocumentNode::with_text(tag, text));
        section
    }

    fn heading_tags(node: &DocumentNode, out: &mut Vec<NodeTag>) {
        if node.tag.heading_level().is_some() {
            out.push(node.tag);
        }
        for child in &node.children {
            heading_tags(child, out);
        }
    }

    #[test]
    fn test_dense_headings_untouched() {
        let mut root = DocumentNode::new(NodeTag::Document);
        root.children
            .push(section_with_heading(NodeTag::Heading1, "A"));
        root.children
            .push(section_with_heading(NodeTag::Heading2, "B"));
        let before = root.clone();
        normalize_headings(&mut root);
        assert_eq!(root, before);
    }

    #[test]
    fn test_sparse_levels_compacted() {
        // Only H2 and H4 in use: they become H1 and H2.
        let mut root = DocumentNode::new(NodeTag::Document);
        root.children
            .push(section_with_heading(NodeTag::Heading2, "First"));
        root.children
            .push(section_with_heading(NodeTag::Heading4, "Second"));
        root.children
            .push(section_with_heading(NodeTag::Heading2, "Third"));
        normalize_headings(&mut root);

        let mut tags = Vec::new();
        heading_tags(&root, &mut tags);
        assert_eq!(
            tags,
            vec![NodeTag::Heading1, NodeTag::Heading2, NodeTag::Heading1]
        );
    }

    #[test]
    fn test_paragraph_macro_becomes_h1() {
        let mut root = DocumentNode::new(NodeTag::Document);
        root.children
            .push(section_with_heading(NodeTag::Heading4, "X"));
        normalize_headings(&mut root);
        assert_eq!(root.children[0].children[0].tag, NodeTag::Heading1);
    }

    #[test]
    fn test_empty_heading_sections_pruned() {
        let mut root = DocumentNode::new(NodeTag::Document);
        root.children
            .push(section_with_heading(NodeTag::Heading1, ""));
        root.children
            .push(section_with_heading(NodeTag::Heading2, "Kept"));
        normalize_headings(&mut root);

        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].children[0].text, "Kept");
        // The surviving H2 is remapped to H1.
        assert_eq!(root.children[0].children[0].tag, NodeTag::Heading1);
    }

    #[test]
    fn test_relative_order_preserved() {
        let mut root = DocumentNode::new(NodeTag::Document);
        root.children
            .push(section_with_heading(NodeTag::Heading2, "outer"));
        let mut nested = section_with_heading(NodeTag::Heading3, "inner");
        nested
            .children
            .push(DocumentNode::with_text(NodeTag::Paragraph, "body"));
        root.children.push(nested);
        normalize_headings(&mut root);

        let mut tags = Vec::new();
        heading_tags(&root, &mut tags);
        assert_eq!(tags, vec![NodeTag::Heading1, NodeTag::Heading2]);
    }
}
