//! The structure-injection engine.
//!
//! `tag_document` runs the whole pipeline against an opened document:
//! content streams are rewritten with marked-content sequences, the
//! semantic tree becomes a structure tree linked to those sequences by
//! text matching, link annotations are tagged, the inverse parent tree is
//! built, and the catalogue receives the PDF/UA-1 metadata.

pub mod annots;
pub mod content_marks;
pub mod linker;
pub mod parent_tree;
pub mod structure;

pub use content_marks::{rewrite_page_content, MarkedContentEntry, RewrittenPage};
pub use linker::{link_structure, match_score, normalize, Ownership};
pub use structure::{build_structure, LeafBinding, StructElement, StructKid, StructTree};

use crate::error::Result;
use crate::metadata::xmp;
use crate::pdf::{
    ObjectId, PdfDictionary, PdfDocument, PdfObject, PdfStream, PdfString,
};
use crate::semantic::DocumentNode;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct TagOptions {
    /// Document language for the catalogue `/Lang` entry.
    pub lang: String,
    /// Title for `dc:title`; callers resolve the filename-stem fallback.
    pub title: String,
}

impl Default for TagOptions {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            title: String::new(),
        }
    }
}

/// Embed the semantic tree as PDF/UA-1 structure into `document`.
pub fn tag_document(
    document: &mut PdfDocument,
    tree: &DocumentNode,
    options: &TagOptions,
) -> Result<()> {
    let pages = document.pages()?;

    // Content-stream rewriting: one MCID table per page.
    let mut page_marks = Vec::with_capacity(pages.len());
    for (index, &page_id) in pages.iter().enumerate() {
        match document.page_content(page_id) {
            Ok(content) => {
                let rewritten = rewrite_page_content(&content)?;
                document.set_page_content(page_id, rewritten.content)?;
                page_marks.push(rewritten.marks);
            }
            Err(err) => {
                // A page we cannot decode is left untouched rather than
                // failing the whole document.
                warn!(page = index, %err, "leaving undecodable page content untouched");
                page_marks.push(Vec::new());
            }
        }
    }

    // Structure tree, text matching, annotations.
    let (mut struct_tree, document_element, leaves) = build_structure(tree);
    let ownership = link_structure(&mut struct_tree, &leaves, &page_marks);
    let annotation_parents = annots::link_annotations(
        document,
        &mut struct_tree,
        &leaves,
        &pages,
        document_element,
    );

    // Every element needs its object id before /P and /K can be written.
    let struct_root_id = document.reserve_id();
    let element_ids: Vec<ObjectId> = (0..struct_tree.len())
        .map(|_| document.reserve_id())
        .collect();

    for (index, element) in struct_tree.iter() {
        let dict = serialize_element(element, &element_ids, struct_root_id, &pages);
        document.set(element_ids[index], PdfObject::Dictionary(dict));
    }

    let parent_tree = parent_tree::build_parent_tree(
        document,
        &ownership,
        pages.len(),
        &element_ids,
        struct_root_id,
        &annotation_parents,
    );
    let parent_tree_id = document.add_object(PdfObject::Dictionary(parent_tree));

    let mut struct_root = PdfDictionary::new();
    struct_root.insert("Type", PdfObject::name("StructTreeRoot"));
    struct_root.insert("K", PdfObject::Reference(element_ids[document_element]));
    struct_root.insert("ParentTree", PdfObject::Reference(parent_tree_id));
    struct_root.insert(
        "ParentTreeNextKey",
        PdfObject::Integer(pages.len() as i64 + annotation_parents.len() as i64),
    );
    document.set(struct_root_id, PdfObject::Dictionary(struct_root));

    install_catalogue_entries(document, struct_root_id, options)?;

    // Tab order and parent-tree keys on every page.
    for (index, &page_id) in pages.iter().enumerate() {
        if let Some(page) = document.get_mut(page_id).and_then(PdfObject::as_dict_mut) {
            page.insert("Tabs", PdfObject::name("S"));
            page.insert("StructParents", PdfObject::Integer(index as i64));
        }
    }

    info!(
        pages = pages.len(),
        elements = struct_tree.len(),
        annotations = annotation_parents.len(),
        "structure tree installed"
    );
    Ok(())
}

fn serialize_element(
    element: &StructElement,
    element_ids: &[ObjectId],
    struct_root: ObjectId,
    pages: &[ObjectId],
) -> PdfDictionary {
    let mut dict = PdfDictionary::new();
    dict.insert("Type", PdfObject::name("StructElem"));
    dict.insert("S", PdfObject::name(element.struct_type.clone()));
    let parent_ref = match element.parent {
        Some(parent) => element_ids[parent],
        None => struct_root,
    };
    dict.insert("P", PdfObject::Reference(parent_ref));

    if let Some(alt) = &element.alt {
        dict.insert("Alt", PdfObject::String(PdfString::text(alt)));
    }
    if let Some(actual_text) = &element.actual_text {
        dict.insert("ActualText", PdfObject::String(PdfString::text(actual_text)));
    }

    if !element.kids.is_empty() {
        let entries: Vec<PdfObject> = element
            .kids
            .iter()
            .map(|kid| serialize_kid(kid, element_ids, pages))
            .collect();
        let only_element_kids = element
            .kids
            .iter()
            .all(|kid| matches!(kid, StructKid::Element(_)));
        // A lone MCR or OBJR is written directly; element children keep
        // the array form.
        let k = if entries.len() == 1 && !only_element_kids {
            entries.into_iter().next().unwrap()
        } else {
            PdfObject::Array(entries.into_iter().collect())
        };
        dict.insert("K", k);
    }
    dict
}

fn serialize_kid(kid: &StructKid, element_ids: &[ObjectId], pages: &[ObjectId]) -> PdfObject {
    match kid {
        StructKid::Element(index) => PdfObject::Reference(element_ids[*index]),
        StructKid::Mcr { page, mcid } => {
            let mut mcr = PdfDictionary::new();
            mcr.insert("Type", PdfObject::name("MCR"));
            mcr.insert("Pg", PdfObject::Reference(pages[*page]));
            mcr.insert("MCID", PdfObject::Integer(*mcid as i64));
            PdfObject::Dictionary(mcr)
        }
        StructKid::Objr { page, annotation } => {
            let mut objr = PdfDictionary::new();
            objr.insert("Type", PdfObject::name("OBJR"));
            objr.insert("Pg", PdfObject::Reference(pages[*page]));
            objr.insert("Obj", PdfObject::Reference(*annotation));
            PdfObject::Dictionary(objr)
        }
    }
}

/// Catalogue entries required by PDF/UA-1 §5–§7.
fn install_catalogue_entries(
    document: &mut PdfDocument,
    struct_root_id: ObjectId,
    options: &TagOptions,
) -> Result<()> {
    let mut mark_info = PdfDictionary::new();
    mark_info.insert("Marked", PdfObject::Boolean(true));
    let mark_info_id = document.add_object(PdfObject::Dictionary(mark_info));

    let mut viewer_prefs = PdfDictionary::new();
    viewer_prefs.insert("DisplayDocTitle", PdfObject::Boolean(true));
    let viewer_prefs_id = document.add_object(PdfObject::Dictionary(viewer_prefs));

    let packet = xmp::xmp_packet(&options.title);
    let mut metadata_dict = PdfDictionary::new();
    metadata_dict.insert("Type", PdfObject::name("Metadata"));
    metadata_dict.insert("Subtype", PdfObject::name("XML"));
    let metadata_id = document.add_object(PdfObject::Stream(PdfStream {
        dict: metadata_dict,
        data: packet.into_bytes(),
    }));

    let catalog_id = document.catalog_id()?;
    let lang = options.lang.clone();
    let catalog = document
        .get_mut(catalog_id)
        .and_then(PdfObject::as_dict_mut)
        .ok_or_else(|| {
            crate::error::TexuaError::InvalidStructure("catalog missing".to_string())
        })?;

    catalog.insert("MarkInfo", PdfObject::Reference(mark_info_id));
    catalog.insert(
        "Lang",
        PdfObject::String(PdfString::literal(lang.into_bytes())),
    );
    catalog.insert("ViewerPreferences", PdfObject::Reference(viewer_prefs_id));
    catalog.insert("Metadata", PdfObject::Reference(metadata_id));
    catalog.insert("StructTreeRoot", PdfObject::Reference(struct_root_id));
    Ok(())
}
