//! Parent tree: the number tree mapping content back to its owners
//! (ISO 32000-1 §14.7.4.4).
//!
//! Page keys `0..N-1` map to an indirect array with one owner per MCID;
//! annotation keys continue from `N`. PDF/UA validators check both
//! directions of the structure↔content relation, so an MCID without a
//! matched owner falls back to the structure root rather than being left
//! out.

use super::linker::Ownership;
use crate::pdf::{ObjectId, PdfArray, PdfDictionary, PdfDocument, PdfObject};

/// Build the `/ParentTree` dictionary. Pages with no MCIDs are omitted.
pub fn build_parent_tree(
    document: &mut PdfDocument,
    ownership: &Ownership,
    page_count: usize,
    element_ids: &[ObjectId],
    struct_root: ObjectId,
    annotation_parents: &[(i64, usize)],
) -> PdfDictionary {
    let mut nums = PdfArray::new();

    for page in 0..page_count {
        let mcid_count = ownership.page_len(page);
        if mcid_count == 0 {
            continue;
        }
        let owners: PdfArray = (0..mcid_count as u32)
            .map(|mcid| {
                let owner = ownership
                    .owner(page, mcid)
                    .map(|element| element_ids[element])
                    .unwrap_or(struct_root);
                PdfObject::Reference(owner)
            })
            .collect();
        let owners_id = document.add_object(PdfObject::Array(owners));
        nums.push(PdfObject::Integer(page as i64));
        nums.push(PdfObject::Reference(owners_id));
    }

    for &(key, element) in annotation_parents {
        nums.push(PdfObject::Integer(key));
        nums.push(PdfObject::Reference(element_ids[element]));
    }

    let mut tree = PdfDictionary::new();
    tree.insert("Nums", PdfObject::Array(nums));
    tree
}
