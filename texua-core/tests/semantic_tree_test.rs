//! The semantic-tree JSON wire format is stable: role strings are the PDF
//! structure-type names and round trips are lossless.

use pretty_assertions::assert_eq;
use texua::semantic::{normalize_headings, DocumentNode, NodeTag};

fn sample() -> DocumentNode {
    let mut root = DocumentNode::new(NodeTag::Document);
    let mut section = DocumentNode::new(NodeTag::Section);
    section
        .children
        .push(DocumentNode::with_text(NodeTag::Heading1, "Intro"));
    section
        .children
        .push(DocumentNode::with_text(NodeTag::Paragraph, "hello world"));

    let mut item = DocumentNode::new(NodeTag::ListItem);
    item.children
        .push(DocumentNode::with_text(NodeTag::Paragraph, "A"));
    let mut list = DocumentNode::new(NodeTag::List);
    list.children.push(item);
    section.children.push(list);

    section
        .children
        .push(DocumentNode::with_text(NodeTag::Formula, "$x^2$"));
    section
        .children
        .push(DocumentNode::with_text(NodeTag::Code, "let x = 1;"));
    section
        .children
        .push(DocumentNode::with_text(NodeTag::Figure, "A plot"));
    section
        .children
        .push(DocumentNode::with_text(NodeTag::Link, "https://example.org"));
    root.children.push(section);
    root
}

#[test]
fn json_round_trip_is_lossless() {
    let tree = sample();
    let json = tree.to_json().unwrap();
    let reparsed = DocumentNode::from_json(&json).unwrap();
    assert_eq!(tree, reparsed);
}

#[test]
fn wire_format_uses_pdf_role_strings() {
    let tree = sample();
    let value: serde_json::Value = serde_json::from_str(&tree.to_json().unwrap()).unwrap();

    assert_eq!(value["tag"], "Document");
    let section = &value["children"][0];
    assert_eq!(section["tag"], "Sect");
    let children = section["children"].as_array().unwrap();
    let tags: Vec<&str> = children.iter().map(|c| c["tag"].as_str().unwrap()).collect();
    assert_eq!(
        tags,
        vec!["H1", "P", "L", "Formula", "Code", "Figure", "Link"]
    );
    assert_eq!(children[2]["children"][0]["tag"], "LI");

    // Interior nodes omit "text"; leaves omit "children".
    assert!(section.get("text").is_none());
    assert!(children[0].get("children").is_none());
}

#[test]
fn normalisation_yields_dense_levels_in_order() {
    // Levels {2, 3} in use: must become exactly {1, 2}, order preserved.
    let mut root = DocumentNode::new(NodeTag::Document);
    for (tag, text) in [
        (NodeTag::Heading2, "a"),
        (NodeTag::Heading3, "b"),
        (NodeTag::Heading2, "c"),
    ] {
        let mut section = DocumentNode::new(NodeTag::Section);
        section.children.push(DocumentNode::with_text(tag, text));
        root.children.push(section);
    }
    normalize_headings(&mut root);

    let levels: Vec<u8> = root
        .children
        .iter()
        .map(|s| s.children[0].tag.heading_level().unwrap())
        .collect();
    assert_eq!(levels, vec![1, 2, 1]);
}
