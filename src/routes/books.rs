//! Book API endpoints
//!
//! JSON counterparts of the landing page actions:
//! - List uploaded books
//! - Upload a book
//! - Get a signed read URL for a book

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::error::Result;
use crate::pages::open_book_href;
use crate::state::AppState;
use crate::storage::{BookUpload, SignedUrl};

use super::form::read_upload;
use super::MULTIPART_OVERHEAD;

/// Response for book list
#[derive(Serialize)]
pub struct BookListResponse {
    pub books: Vec<BookSummary>,
    pub total: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub key: String,
    /// Landing page link that signs the key and opens the reader
    pub open_url: String,
}

/// Upload response
#[derive(Serialize)]
pub struct UploadResponse {
    pub key: String,
    pub message: String,
}

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(list_books).post(upload_book))
        .route("/:key/url", get(signed_url))
        .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD))
}

/// List all uploaded books
async fn list_books(State(state): State<AppState>) -> Result<Json<BookListResponse>> {
    let keys = state.store().list().await?;

    let books: Vec<BookSummary> = keys
        .into_iter()
        .map(|key| BookSummary {
            open_url: open_book_href(&key),
            key,
        })
        .collect();

    Ok(Json(BookListResponse {
        total: books.len(),
        books,
    }))
}

/// Upload a book (multipart field `file` or `epub`)
async fn upload_book(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let max = state.config().storage.max_upload_bytes;
    let file = read_upload(&mut multipart, max).await?;

    let upload = BookUpload::new(&file.name, file.data)?;
    let key = state.store().upload(upload).await?;
    tracing::info!(key = %key, "Uploaded book via API");

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: format!("Uploaded {}", key),
            key,
        }),
    ))
}

async fn signed_url(State(state): State<AppState>, Path(key): Path<String>) -> Result<Json<SignedUrl>> {
    Ok(Json(state.store().sign(&key).await?))
}
