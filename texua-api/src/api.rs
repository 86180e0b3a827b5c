//! HTTP façade over the tagging pipeline.
//!
//! `POST /tag` accepts a multipart upload of the LaTeX source and the
//! compiled PDF, runs the pipeline in a per-job temp directory, stores
//! the result under a random id and returns an accessibility summary.
//! `GET /download/{id}` streams a stored result; `GET /healthz` is for
//! load balancers.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use texua::external::{fix_encoding, latex_to_speech, validate, SpeechEngine, ValidationSummary};
use texua::pdf::{PdfDocument, PdfObject};
use texua::semantic::{normalize_headings, NodeTag};
use texua::tagging::{tag_document, TagOptions};
use texua::TexuaError;
use tower_http::cors::CorsLayer;
use tracing::warn;

/// Shared state: where tagged results live until downloaded. The backing
/// temp directory is owned here so it survives for the process lifetime.
pub struct AppState {
    results: tempfile::TempDir,
}

impl AppState {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            results: tempfile::Builder::new().prefix("texua_").tempdir()?,
        })
    }

    fn result_path(&self, id: &str) -> PathBuf {
        self.results.path().join(format!("{id}.pdf"))
    }
}

/// Summary returned by `POST /tag`.
#[derive(Debug, Serialize)]
pub struct TagResponse {
    pub title: String,
    pub lang: String,
    pub pages: usize,
    /// Structure-element counts by role, excluding the Document root.
    pub elements: BTreeMap<String, usize>,
    pub alt_count: usize,
    pub bdc_markers_page1: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_before: Option<ValidationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_after: Option<ValidationSummary>,
    pub id: String,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<TexuaError> for AppError {
    fn from(err: TexuaError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Build the application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tag", post(tag_handler))
        .route("/download/{id}", get(download_handler))
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn download_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    // Ids are uuid fragments; reject anything that could traverse paths.
    if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::BadRequest("invalid result id".to_string()));
    }
    let path = state.result_path(&id);
    let data = tokio::fs::read(&path)
        .await
        .map_err(|_| AppError::BadRequest("Result not found or expired.".to_string()))?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"tagged.pdf\"".to_string(),
            ),
        ],
        data,
    )
        .into_response())
}

#[derive(Default)]
struct TagRequest {
    tex: Option<Vec<u8>>,
    pdf: Option<Vec<u8>>,
    lang: String,
    fix_encoding: bool,
    math_speech: String,
    embed_alt: bool,
}

async fn tag_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<TagResponse>, AppError> {
    let mut request = TagRequest {
        lang: "en".to_string(),
        math_speech: "none".to_string(),
        ..TagRequest::default()
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(format!("failed to read multipart field: {err}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "tex" => {
                request.tex = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|err| AppError::BadRequest(err.to_string()))?
                        .to_vec(),
                )
            }
            "pdf" => {
                request.pdf = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|err| AppError::BadRequest(err.to_string()))?
                        .to_vec(),
                )
            }
            "lang" => {
                request.lang = field
                    .text()
                    .await
                    .map_err(|err| AppError::BadRequest(err.to_string()))?
            }
            "fix_encoding" => {
                request.fix_encoding = field
                    .text()
                    .await
                    .map_err(|err| AppError::BadRequest(err.to_string()))?
                    == "true"
            }
            "math_speech" => {
                request.math_speech = field
                    .text()
                    .await
                    .map_err(|err| AppError::BadRequest(err.to_string()))?
            }
            "embed_alt" => {
                request.embed_alt = field
                    .text()
                    .await
                    .map_err(|err| AppError::BadRequest(err.to_string()))?
                    == "true"
            }
            _ => {}
        }
    }

    let (Some(tex), Some(pdf)) = (request.tex.take(), request.pdf.take()) else {
        return Err(AppError::BadRequest(
            "Both .tex and .pdf files are required.".to_string(),
        ));
    };
    let engine: SpeechEngine = request
        .math_speech
        .parse()
        .map_err(|err: TexuaError| AppError::BadRequest(err.to_string()))?;

    // The pipeline is synchronous; keep the runtime responsive.
    let state_for_job = Arc::clone(&state);
    let response = tokio::task::spawn_blocking(move || {
        run_job(&state_for_job, tex, pdf, request, engine)
    })
    .await
    .map_err(|err| AppError::Internal(err.to_string()))??;

    Ok(Json(response))
}

fn run_job(
    state: &AppState,
    tex: Vec<u8>,
    pdf: Vec<u8>,
    request: TagRequest,
    engine: SpeechEngine,
) -> Result<TagResponse, AppError> {
    // Per-job working directory, removed on every exit path by Drop.
    let work = tempfile::Builder::new().prefix("texua_job_").tempdir()?;
    let tex_path = work.path().join("input.tex");
    let mut pdf_path = work.path().join("input.pdf");
    std::fs::write(&tex_path, &tex)?;
    std::fs::write(&pdf_path, &pdf)?;

    let validation_before = validate(&pdf_path);

    if request.fix_encoding {
        let fixed = work.path().join("gs_encoded.pdf");
        match fix_encoding(&pdf_path, &fixed) {
            Ok(()) => pdf_path = fixed,
            Err(TexuaError::GhostscriptNotFound) => {
                warn!("Ghostscript not found, tagging the original PDF")
            }
            Err(err) => return Err(err.into()),
        }
    }

    let mut tree =
        texua::latex::parse(&tex_path).map_err(|err| AppError::Internal(err.to_string()))?;
    normalize_headings(&mut tree);

    if engine != SpeechEngine::None {
        let formulas: Vec<String> = tree
            .collect_by_tag(NodeTag::Formula)
            .iter()
            .map(|node| node.text.clone())
            .collect();
        if !formulas.is_empty() {
            let speech = latex_to_speech(&formulas, engine);
            tree.replace_texts(NodeTag::Formula, &speech);
        }
    }

    let title = match texua::latex::extract_title(&tex_path) {
        Ok(title) if !title.is_empty() => title,
        _ => "input".to_string(),
    };

    let mut document = PdfDocument::load(&pdf_path)?;
    let options = TagOptions {
        lang: request.lang.clone(),
        title,
    };
    tag_document(&mut document, &tree, &options)?;
    if request.embed_alt {
        let html = texua::alt_html::generate_alt_html(&tree, &options.title);
        texua::alt_html::embed_alt_document(&mut document, &html)?;
    }

    let id = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
    let out_path = state.result_path(&id);
    texua::pdf::save_document(&document, &out_path)?;

    let validation_after = validate(&out_path);

    let mut response = summarize(&out_path)?;
    response.validation_before = validation_before;
    response.validation_after = validation_after;
    response.download_url = format!("/download/{id}");
    response.id = id;
    Ok(response)
}

/// Accessibility summary of a tagged output file.
fn summarize(path: &std::path::Path) -> Result<TagResponse, AppError> {
    let document = PdfDocument::load(path)?;
    let catalog = document.catalog()?;

    let lang = catalog
        .get("Lang")
        .and_then(PdfObject::as_string)
        .map(|s| s.to_text_lossy())
        .unwrap_or_default();

    let title = catalog
        .get("Metadata")
        .map(|m| document.resolve(m))
        .and_then(PdfObject::as_stream)
        .and_then(|stream| texua::metadata::xmp::read_title(&stream.data))
        .unwrap_or_default();

    let mut elements = BTreeMap::new();
    let mut alt_count = 0usize;
    if let Some(root) = catalog.get("StructTreeRoot") {
        let root = document.resolve(root).as_dict().cloned();
        if let Some(k) = root.as_ref().and_then(|r| r.get("K")) {
            walk_elements(&document, k, &mut elements, &mut alt_count);
        }
    }
    elements.remove("Document");

    let pages = document.pages()?;
    let bdc_markers_page1 = match pages.first() {
        Some(&page_id) => {
            let content = document.page_content(page_id)?;
            texua::pdf::content::parse_instructions(&content)?
                .iter()
                .filter(|instruction| instruction.operator == "BDC")
                .count()
        }
        None => 0,
    };

    Ok(TagResponse {
        title,
        lang,
        pages: pages.len(),
        elements,
        alt_count,
        bdc_markers_page1,
        validation_before: None,
        validation_after: None,
        id: String::new(),
        download_url: String::new(),
    })
}

fn walk_elements(
    document: &PdfDocument,
    object: &PdfObject,
    elements: &mut BTreeMap<String, usize>,
    alt_count: &mut usize,
) {
    let resolved = document.resolve(object);
    if let Some(array) = resolved.as_array() {
        for entry in array.iter() {
            walk_elements(document, entry, elements, alt_count);
        }
        return;
    }
    let Some(dict) = resolved.as_dict() else {
        return;
    };
    if dict.get_type() == Some("MCR") || dict.get_type() == Some("OBJR") {
        return;
    }
    if let Some(role) = dict.get("S").and_then(PdfObject::as_name) {
        *elements.entry(role.to_string()).or_insert(0) += 1;
    }
    if dict.contains_key("Alt") {
        *alt_count += 1;
    }
    if let Some(kids) = dict.get("K") {
        walk_elements(document, kids, elements, alt_count);
    }
}
