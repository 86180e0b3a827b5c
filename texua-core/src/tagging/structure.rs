//! Structure-tree construction (ISO 32000-1 §14.7).
//!
//! Structure elements are held in an index arena: `/P` back-pointers and
//! `/K` child references form a cycle in the PDF object graph, so the
//! in-memory model uses indices and the cycle only appears at
//! serialisation time, when every element already has an object id.

use crate::semantic::{DocumentNode, NodeTag};

/// A child entry of a structure element.
#[derive(Debug, Clone, PartialEq)]
pub enum StructKid {
    /// Another structure element, by arena index.
    Element(usize),
    /// Marked-content reference: `(page index, MCID)`.
    Mcr { page: usize, mcid: u32 },
    /// Object reference to an annotation on a page.
    Objr {
        page: usize,
        annotation: crate::pdf::ObjectId,
    },
}

#[derive(Debug, Clone)]
pub struct StructElement {
    /// Structure type name (`Document`, `Sect`, `H1`, `P`, …).
    pub struct_type: String,
    pub parent: Option<usize>,
    pub kids: Vec<StructKid>,
    /// `/Alt` — alternative description.
    pub alt: Option<String>,
    /// `/ActualText` — literal replacement text.
    pub actual_text: Option<String>,
}

impl StructElement {
    pub fn new(struct_type: impl Into<String>) -> Self {
        Self {
            struct_type: struct_type.into(),
            parent: None,
            kids: Vec::new(),
            alt: None,
            actual_text: None,
        }
    }
}

/// Arena of structure elements rooted at a `Document` element.
#[derive(Debug, Default)]
pub struct StructTree {
    elements: Vec<StructElement>,
}

impl StructTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element, wiring the parent pointer and the parent's kid list.
    pub fn add_child(&mut self, parent: Option<usize>, mut element: StructElement) -> usize {
        let index = self.elements.len();
        element.parent = parent;
        self.elements.push(element);
        if let Some(parent) = parent {
            self.elements[parent].kids.push(StructKid::Element(index));
        }
        index
    }

    pub fn get(&self, index: usize) -> &StructElement {
        &self.elements[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut StructElement {
        &mut self.elements[index]
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &StructElement)> {
        self.elements.iter().enumerate()
    }
}

/// A leaf element paired with the semantic node it came from, for the
/// text-matching linker.
#[derive(Debug, Clone)]
pub struct LeafBinding {
    pub element: usize,
    pub tag: NodeTag,
    pub text: String,
}

/// Build the structure tree from the semantic tree.
///
/// Returns the arena, the index of the `Document` element, and the leaf
/// bindings in tree order.
pub fn build_structure(root: &DocumentNode) -> (StructTree, usize, Vec<LeafBinding>) {
    let mut tree = StructTree::new();
    let mut leaves = Vec::new();
    let document = build_element(&mut tree, root, None, &mut leaves);
    (tree, document, leaves)
}

fn build_element(
    tree: &mut StructTree,
    node: &DocumentNode,
    parent: Option<usize>,
    leaves: &mut Vec<LeafBinding>,
) -> usize {
    let mut element = StructElement::new(node.tag.as_pdf_name());
    if !node.text.is_empty() {
        if node.tag.uses_alt_text() {
            element.alt = Some(node.text.clone());
        } else {
            element.actual_text = Some(node.text.clone());
        }
    }
    let index = tree.add_child(parent, element);

    if node.children.is_empty() {
        leaves.push(LeafBinding {
            element: index,
            tag: node.tag,
            text: node.text.clone(),
        });
        return index;
    }

    if node.tag == NodeTag::ListItem {
        // PDF/UA-1 restricts /LI children to /Lbl and /LBody, so the
        // item's content is wrapped in a single /LBody element.
        let lbody = tree.add_child(Some(index), StructElement::new("LBody"));
        for child in &node.children {
            build_element(tree, child, Some(lbody), leaves);
        }
    } else {
        for child in &node.children {
            build_element(tree, child, Some(index), leaves);
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child_elements(tree: &StructTree, index: usize) -> Vec<usize> {
        tree.get(index)
            .kids
            .iter()
            .filter_map(|kid| match kid {
                StructKid::Element(child) => Some(*child),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_document_root_and_parents() {
        let mut root = DocumentNode::new(NodeTag::Document);
        let mut section = DocumentNode::new(NodeTag::Section);
        section
            .children
            .push(DocumentNode::with_text(NodeTag::Heading1, "Intro"));
        root.children.push(section);

        let (tree, document, leaves) = build_structure(&root);
        assert_eq!(tree.get(document).struct_type, "Document");
        assert!(tree.get(document).parent.is_none());

        let sections = child_elements(&tree, document);
        assert_eq!(tree.get(sections[0]).struct_type, "Sect");
        assert_eq!(tree.get(sections[0]).parent, Some(document));

        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].text, "Intro");
    }

    #[test]
    fn test_alt_for_formula_actual_text_for_paragraph() {
        let mut root = DocumentNode::new(NodeTag::Document);
        root.children
            .push(DocumentNode::with_text(NodeTag::Formula, "$a+b$"));
        root.children
            .push(DocumentNode::with_text(NodeTag::Paragraph, "text"));

        let (tree, document, _) = build_structure(&root);
        let kids = child_elements(&tree, document);

        let formula = tree.get(kids[0]);
        assert_eq!(formula.alt.as_deref(), Some("$a+b$"));
        assert!(formula.actual_text.is_none());

        let paragraph = tree.get(kids[1]);
        assert_eq!(paragraph.actual_text.as_deref(), Some("text"));
        assert!(paragraph.alt.is_none());
    }

    #[test]
    fn test_list_item_wrapped_in_lbody() {
        let mut item = DocumentNode::new(NodeTag::ListItem);
        item.children
            .push(DocumentNode::with_text(NodeTag::Paragraph, "A"));
        let mut list = DocumentNode::new(NodeTag::List);
        list.children.push(item);
        let mut root = DocumentNode::new(NodeTag::Document);
        root.children.push(list);

        let (tree, document, _) = build_structure(&root);
        let list_idx = child_elements(&tree, document)[0];
        let item_idx = child_elements(&tree, list_idx)[0];
        let item_kids = child_elements(&tree, item_idx);

        assert_eq!(item_kids.len(), 1);
        assert_eq!(tree.get(item_kids[0]).struct_type, "LBody");
        let body_kids = child_elements(&tree, item_kids[0]);
        assert_eq!(tree.get(body_kids[0]).struct_type, "P");
    }

    #[test]
    fn test_leaves_in_tree_order() {
        let mut root = DocumentNode::new(NodeTag::Document);
        let mut section = DocumentNode::new(NodeTag::Section);
        section
            .children
            .push(DocumentNode::with_text(NodeTag::Heading1, "first"));
        section
            .children
            .push(DocumentNode::with_text(NodeTag::Paragraph, "second"));
        root.children.push(section);
        root.children
            .push(DocumentNode::with_text(NodeTag::Paragraph, "third"));

        let (_, _, leaves) = build_structure(&root);
        let texts: Vec<&str> = leaves.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }
}
