//! Accessible HTML alternative: generated from the semantic tree and
//! embedded as a PDF attachment with `AFRelationship /Alternative`.
//!
//! The HTML is a fallback for documents where structure tagging is
//! imperfect; assistive technology can open the attachment instead.

use crate::error::Result;
use crate::latex::strip_math_delimiters;
use crate::pdf::{PdfArray, PdfDictionary, PdfDocument, PdfObject, PdfStream, PdfString};
use crate::semantic::{DocumentNode, NodeTag};
use latex2mathml::{latex_to_mathml, DisplayStyle};

const ATTACHMENT_NAME: &str = "accessible_alt.html";

/// Render the semantic tree as a self-contained HTML document.
pub fn generate_alt_html(tree: &DocumentNode, title: &str) -> String {
    let mut body = String::new();
    render(tree, &mut body);
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n\
         <style>body{{font-family:system-ui,sans-serif;max-width:50em;margin:2em auto;padding:0 1em}}\
         pre{{background:#f5f5f5;padding:1em;overflow-x:auto}}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape(title),
        body
    )
}

/// Embed the HTML as an `/EmbeddedFiles` attachment on the catalogue.
pub fn embed_alt_document(document: &mut PdfDocument, html: &str) -> Result<()> {
    let data = html.as_bytes().to_vec();

    let mut params = PdfDictionary::new();
    params.insert("Size", PdfObject::Integer(data.len() as i64));
    let mut file_dict = PdfDictionary::new();
    file_dict.insert("Type", PdfObject::name("EmbeddedFile"));
    file_dict.insert("Subtype", PdfObject::name("text/html"));
    file_dict.insert("Params", PdfObject::Dictionary(params));
    let file_id = document.add_object(PdfObject::Stream(PdfStream {
        dict: file_dict,
        data,
    }));

    let mut ef = PdfDictionary::new();
    ef.insert("F", PdfObject::Reference(file_id));
    ef.insert("UF", PdfObject::Reference(file_id));
    let mut filespec = PdfDictionary::new();
    filespec.insert("Type", PdfObject::name("Filespec"));
    filespec.insert(
        "F",
        PdfObject::String(PdfString::literal(ATTACHMENT_NAME.as_bytes().to_vec())),
    );
    filespec.insert(
        "UF",
        PdfObject::String(PdfString::literal(ATTACHMENT_NAME.as_bytes().to_vec())),
    );
    filespec.insert(
        "Desc",
        PdfObject::literal_string(b"Accessible HTML alternative of this document".to_vec()),
    );
    filespec.insert("EF", PdfObject::Dictionary(ef));
    filespec.insert("AFRelationship", PdfObject::name("Alternative"));
    let filespec_id = document.add_object(PdfObject::Dictionary(filespec));

    let mut names_array = PdfArray::new();
    names_array.push(PdfObject::String(PdfString::literal(
        ATTACHMENT_NAME.as_bytes().to_vec(),
    )));
    names_array.push(PdfObject::Reference(filespec_id));
    let mut embedded_files = PdfDictionary::new();
    embedded_files.insert("Names", PdfObject::Array(names_array));
    let mut names = PdfDictionary::new();
    names.insert("EmbeddedFiles", PdfObject::Dictionary(embedded_files));

    let catalog_id = document.catalog_id()?;
    let catalog = document
        .get_mut(catalog_id)
        .and_then(PdfObject::as_dict_mut)
        .ok_or_else(|| {
            crate::error::TexuaError::InvalidStructure("catalog missing".to_string())
        })?;
    catalog.insert("Names", PdfObject::Dictionary(names));
    catalog.insert(
        "AF",
        PdfObject::Array(PdfArray(vec![PdfObject::Reference(filespec_id)])),
    );
    Ok(())
}

fn render(node: &DocumentNode, out: &mut String) {
    match node.tag {
        NodeTag::Document | NodeTag::Section => {
            for child in &node.children {
                render(child, out);
            }
        }
        NodeTag::Heading1 | NodeTag::Heading2 | NodeTag::Heading3 | NodeTag::Heading4 => {
            let level = node.tag.heading_level().unwrap_or(1);
            out.push_str(&format!("<h{level}>{}</h{level}>\n", escape(&node.text)));
        }
        NodeTag::Paragraph => {
            out.push_str(&format!("<p>{}</p>\n", escape(&node.text)));
        }
        NodeTag::Formula => {
            let label = escape(&node.text);
            let clean = strip_math_delimiters(&node.text);
            // Real MathML when the formula converts; the escaped source
            // is the fallback reading.
            let inner = match latex_to_mathml(clean, DisplayStyle::Inline) {
                Ok(mathml) => mathml,
                Err(_) => escape(clean),
            };
            out.push_str(&format!(
                "<span role=\"math\" aria-label=\"{label}\">{inner}</span>\n"
            ));
        }
        NodeTag::Code => {
            out.push_str(&format!("<pre><code>{}</code></pre>\n", escape(&node.text)));
        }
        NodeTag::Figure => {
            let caption = if node.text.is_empty() {
                "Figure".to_string()
            } else {
                escape(&node.text)
            };
            out.push_str(&format!(
                "<figure><figcaption>{caption}</figcaption></figure>\n"
            ));
        }
        NodeTag::Link => {
            out.push_str(&format!("<p><a>{}</a></p>\n", escape(&node.text)));
        }
        NodeTag::List => {
            out.push_str("<ul>\n");
            for child in &node.children {
                render(child, out);
            }
            out.push_str("</ul>\n");
        }
        NodeTag::ListItem => {
            out.push_str("<li>");
            if !node.text.is_empty() {
                out.push_str(&escape(&node.text));
            }
            for child in &node.children {
                render(child, out);
            }
            out.push_str("</li>\n");
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> DocumentNode {
        let mut root = DocumentNode::new(NodeTag::Document);
        let mut section = DocumentNode::new(NodeTag::Section);
        section
            .children
            .push(DocumentNode::with_text(NodeTag::Heading1, "Intro"));
        section
            .children
            .push(DocumentNode::with_text(NodeTag::Paragraph, "a < b"));
        section
            .children
            .push(DocumentNode::with_text(NodeTag::Formula, "$a+b$"));
        root.children.push(section);
        root
    }

    #[test]
    fn test_html_structure() {
        let html = generate_alt_html(&sample_tree(), "Title & More");
        assert!(html.contains("<title>Title &amp; More</title>"));
        assert!(html.contains("<h1>Intro</h1>"));
        assert!(html.contains("<p>a &lt; b</p>"));
        assert!(html.contains("aria-label=\"$a+b$\""));
    }

    #[test]
    fn test_formula_renders_mathml() {
        let html = generate_alt_html(&sample_tree(), "t");
        // The convertible formula embeds real MathML markup, with the
        // raw LaTeX kept as the aria-label.
        assert!(html.contains("<math"));
        assert!(html.contains("aria-label=\"$a+b$\""));
    }

    #[test]
    fn test_list_rendering() {
        let mut item = DocumentNode::new(NodeTag::ListItem);
        item.children
            .push(DocumentNode::with_text(NodeTag::Paragraph, "A"));
        let mut list = DocumentNode::new(NodeTag::List);
        list.children.push(item);
        let mut root = DocumentNode::new(NodeTag::Document);
        root.children.push(list);

        let html = generate_alt_html(&root, "t");
        assert!(html.contains("<ul>\n<li><p>A</p>\n</li>\n</ul>"));
    }

    #[test]
    fn test_embed_adds_names_tree() {
        let mut document = PdfDocument::new();
        let mut catalog = PdfDictionary::new();
        catalog.insert("Type", PdfObject::name("Catalog"));
        let catalog_id = document.add_object(PdfObject::Dictionary(catalog));
        document
            .trailer
            .insert("Root", PdfObject::Reference(catalog_id));

        embed_alt_document(&mut document, "<html></html>").unwrap();

        let catalog = document.catalog().unwrap();
        let names = catalog.get("Names").and_then(PdfObject::as_dict).unwrap();
        let embedded = names
            .get("EmbeddedFiles")
            .and_then(PdfObject::as_dict)
            .unwrap();
        let pairs = embedded.get("Names").and_then(PdfObject::as_array).unwrap();
        assert_eq!(pairs.len(), 2);

        let filespec_id = pairs.get(1).unwrap().as_reference().unwrap();
        let filespec = document
            .get(filespec_id)
            .and_then(PdfObject::as_dict)
            .unwrap();
        assert_eq!(
            filespec.get("AFRelationship").and_then(PdfObject::as_name),
            Some("Alternative")
        );
    }
}
