//! Compact PDF substrate: object model, reader, writer, filters and
//! content-stream parsing. Scoped to what structure injection needs —
//! no rendering, no encryption, no font machinery.

pub mod content;
pub mod filters;
pub mod lexer;
pub mod objects;
pub mod reader;
pub mod writer;
pub mod xref;

pub use objects::{
    ObjectId, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString, StringFormat,
};
pub use reader::PdfDocument;
pub use writer::{save_document, write_document};
