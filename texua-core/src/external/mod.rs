//! Wrappers for the optional external collaborators: Ghostscript font
//! re-encoding, Node-based math-to-speech, and veraPDF validation.
//!
//! All three are best-effort: a missing tool degrades the pipeline, it
//! never aborts it. Only a tool that is present and exits non-zero is
//! surfaced as an error.

pub mod encoding;
pub mod speech;
pub mod verapdf;

pub use encoding::fix_encoding;
pub use speech::{latex_to_speech, SpeechEngine};
pub use verapdf::{validate, ValidationSummary};
