//! Link-annotation tagging (PDF/UA-1 §7.18).
//!
//! Every link annotation gets an alternative description in `/Contents`,
//! a `/StructParent` key into the parent tree, and an owning `/Link`
//! structure element holding an OBJR back to the annotation. Parser-made
//! Link leaves are consumed in order; when the source had no `\href` for
//! an annotation, a Link element is synthesised under the document
//! element.

use super::structure::{LeafBinding, StructElement, StructKid, StructTree};
use crate::pdf::{ObjectId, PdfDocument, PdfObject, PdfString};
use crate::semantic::NodeTag;
use tracing::debug;

/// Where a page's `/Annots` array lives.
enum AnnotsSlot {
    InPage,
    Indirect(ObjectId),
}

/// Tag all link annotations. Returns `(parent_tree_key, element)` pairs;
/// keys start at the page count.
pub fn link_annotations(
    document: &mut PdfDocument,
    tree: &mut StructTree,
    leaves: &[LeafBinding],
    pages: &[ObjectId],
    document_element: usize,
) -> Vec<(i64, usize)> {
    let link_leaves: Vec<usize> = leaves
        .iter()
        .filter(|leaf| leaf.tag == NodeTag::Link)
        .map(|leaf| leaf.element)
        .collect();

    let mut parents = Vec::new();
    let mut next_key = pages.len() as i64;
    let mut link_cursor = 0usize;

    for (page_index, &page_id) in pages.iter().enumerate() {
        for annot_id in page_link_annotations(document, page_id) {
            let description = annotation_description(document, annot_id);

            // §7.18.1: annotations need /Contents (kept when the author
            // already provided one) and §7.18.5 a parent-tree key.
            if let Some(annot) = document.get_mut(annot_id).and_then(PdfObject::as_dict_mut) {
                if !annot.contains_key("Contents") {
                    annot.insert("Contents", PdfObject::String(PdfString::text(&description)));
                }
                annot.insert("StructParent", PdfObject::Integer(next_key));
            }

            let element = match link_leaves.get(link_cursor) {
                Some(&element) => {
                    link_cursor += 1;
                    element
                }
                None => {
                    debug!(page_index, "synthesising Link element for annotation");
                    let mut synthetic = StructElement::new("Link");
                    synthetic.alt = Some(description.clone());
                    tree.add_child(Some(document_element), synthetic)
                }
            };

            tree.get_mut(element).kids.push(StructKid::Objr {
                page: page_index,
                annotation: annot_id,
            });
            parents.push((next_key, element));
            next_key += 1;
        }
    }

    parents
}

/// Ids of the `/Link` annotations on a page, promoting direct annotation
/// dictionaries to indirect objects so OBJRs can reference them.
fn page_link_annotations(document: &mut PdfDocument, page_id: ObjectId) -> Vec<ObjectId> {
    let slot = {
        let Some(page) = document.get(page_id).and_then(PdfObject::as_dict) else {
            return Vec::new();
        };
        match page.get("Annots") {
            Some(PdfObject::Array(_)) => AnnotsSlot::InPage,
            Some(PdfObject::Reference(id)) => AnnotsSlot::Indirect(*id),
            _ => return Vec::new(),
        }
    };

    let array = match &slot {
        AnnotsSlot::InPage => document
            .get(page_id)
            .and_then(PdfObject::as_dict)
            .and_then(|p| p.get("Annots"))
            .and_then(PdfObject::as_array)
            .cloned(),
        AnnotsSlot::Indirect(id) => document.get(*id).and_then(PdfObject::as_array).cloned(),
    };
    let Some(mut array) = array else {
        return Vec::new();
    };

    // Promote direct dictionaries in place.
    let mut promoted = false;
    for entry in array.0.iter_mut() {
        if let PdfObject::Dictionary(dict) = entry {
            let id = document.add_object(PdfObject::Dictionary(dict.clone()));
            *entry = PdfObject::Reference(id);
            promoted = true;
        }
    }
    if promoted {
        match slot {
            AnnotsSlot::InPage => {
                if let Some(page) = document.get_mut(page_id).and_then(PdfObject::as_dict_mut) {
                    page.insert("Annots", PdfObject::Array(array.clone()));
                }
            }
            AnnotsSlot::Indirect(id) => document.set(id, PdfObject::Array(array.clone())),
        }
    }

    array
        .iter()
        .filter_map(PdfObject::as_reference)
        .filter(|&id| {
            document
                .get(id)
                .and_then(PdfObject::as_dict)
                .and_then(|d| d.get("Subtype"))
                .and_then(PdfObject::as_name)
                == Some("Link")
        })
        .collect()
}

/// Alternative description for a link annotation: the action URI, else a
/// destination name, else the literal `"Link"`.
fn annotation_description(document: &PdfDocument, annot_id: ObjectId) -> String {
    let Some(annot) = document.get(annot_id).and_then(PdfObject::as_dict) else {
        return "Link".to_string();
    };

    if let Some(action) = annot.get("A").map(|a| document.resolve(a)) {
        if let Some(uri) = action
            .as_dict()
            .and_then(|d| d.get("URI"))
            .and_then(PdfObject::as_string)
        {
            let uri = uri.to_text_lossy();
            if !uri.is_empty() {
                return uri;
            }
        }
    }

    match annot.get("Dest").map(|d| document.resolve(d)) {
        Some(PdfObject::Name(name)) => name.as_str().to_string(),
        Some(PdfObject::String(string)) if !string.bytes.is_empty() => string.to_text_lossy(),
        _ => "Link".to_string(),
    }
}
