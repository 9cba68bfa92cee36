//! HTTP routes

pub mod books;
pub mod health;
pub mod landing;
pub mod reader;

mod form;

use axum::{routing::get, Router};

use crate::state::AppState;

/// Allowance for multipart framing and the text fields around an upload
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// All routes, without the transport layers added in `main`
pub fn app(state: AppState) -> Router {
    let max_upload_bytes = state.config().storage.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/health", get(health::health_check))
        .merge(landing::router(max_upload_bytes))
        .nest("/reader", reader::router())
        .nest("/api/v1/books", books::router(max_upload_bytes))
        .with_state(state)
}
