//! # texua
//!
//! Post-processes LaTeX-compiled PDFs into tagged, PDF/UA-1 (ISO 14289-1)
//! conformant documents. The LaTeX source provides the semantics the PDF
//! lost at compile time: texua parses it into a semantic tree, rewrites
//! every page's content stream into marked-content sequences, builds the
//! parallel structure tree, and installs the accessibility metadata the
//! standard requires.
//!
//! ```rust,no_run
//! use texua::pdf::PdfDocument;
//! use texua::tagging::{tag_document, TagOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut tree = texua::latex::parse(std::path::Path::new("paper.tex"))?;
//! texua::semantic::normalize_headings(&mut tree);
//!
//! let mut document = PdfDocument::load(std::path::Path::new("paper.pdf"))?;
//! let options = TagOptions {
//!     lang: "en".to_string(),
//!     title: "My Paper".to_string(),
//! };
//! tag_document(&mut document, &tree, &options)?;
//! texua::pdf::save_document(&document, std::path::Path::new("paper_tagged.pdf"))?;
//! # Ok(())
//! # }
//! ```

pub mod alt_html;
pub mod error;
pub mod external;
pub mod latex;
pub mod metadata;
pub mod pdf;
pub mod semantic;
pub mod tagging;

pub use error::{Result, TexuaError};
pub use semantic::{DocumentNode, NodeTag};
