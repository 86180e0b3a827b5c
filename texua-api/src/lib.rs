//! # texua-api
//!
//! REST API server for the texua tagging pipeline.

mod api;

pub use api::{app, AppError, AppState, ErrorResponse, TagResponse};
