//! Landing page routes
//!
//! Every failure re-renders the landing page with a notice so the reader
//! can try again. The typed URL is kept and the file selection dropped.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};

use crate::error::AppError;
use crate::landing::{open_existing, LandingForm};
use crate::pages::LandingTemplate;
use crate::state::AppState;

use super::form::read_landing_form;
use super::MULTIPART_OVERHEAD;

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(show_landing).post(submit_landing))
        .route("/books/:key/open", get(open_book))
        .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD))
}

/// Render the landing page; a listing failure shows an empty library
async fn render_landing(state: &AppState, url: &str, notice: Option<String>) -> LandingTemplate {
    let books = match state.store().list().await {
        Ok(books) => books,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list books");
            Vec::new()
        }
    };

    LandingTemplate::new(books, url, notice)
}

async fn show_landing(State(state): State<AppState>) -> LandingTemplate {
    render_landing(&state, "", None).await
}

async fn submit_landing(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let max = state.config().storage.max_upload_bytes;

    let mut form = LandingForm::new();
    if let Err(e) = read_landing_form(&mut multipart, &mut form, max).await {
        form.clear_file();
        return failure(&state, &form, e.into()).await;
    }

    match form.submit(state.store()).await {
        Ok(navigation) => Redirect::to(&navigation.location()).into_response(),
        Err(e) => {
            form.clear_file();
            failure(&state, &form, e).await
        }
    }
}

async fn open_book(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match open_existing(state.store(), &key).await {
        Ok(navigation) => Redirect::to(&navigation.location()).into_response(),
        Err(e) => failure(&state, &LandingForm::new(), e).await,
    }
}

async fn failure(state: &AppState, form: &LandingForm, err: AppError) -> Response {
    err.log();
    let page = render_landing(state, form.url(), Some(err.user_message())).await;
    (err.status_code(), page).into_response()
}
