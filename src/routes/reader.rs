//! Reader page routes
//!
//! `GET /reader` registers a view and serves the page; the page drives its
//! rendition through the `/reader/views/:view/*` endpoints until it goes
//! away and sends the close beacon.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::html::{resource_prefix, rewrite_section};
use crate::pages::ReaderTemplate;
use crate::reader::{Page, PageTurn, RenderOptions, Spread};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(open_reader))
        .route("/views/:view/load", post(load_view))
        .route("/views/:view/turn", post(turn_page))
        .route("/views/:view/page", get(current_page))
        .route("/views/:view/close", post(close_view))
        .route("/views/:view/resources/*href", get(view_resource))
}

#[derive(Debug, Deserialize)]
pub struct ReaderQuery {
    url: Option<String>,
}

/// Viewport of the page; the document is the one the view was opened for
#[derive(Debug, Deserialize)]
pub struct LoadRequest {
    width: u32,
    height: u32,
    #[serde(default)]
    spread: Spread,
}

impl LoadRequest {
    fn options(&self) -> RenderOptions {
        RenderOptions {
            width: self.width,
            height: self.height,
            spread: self.spread,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    /// `prev`, `next`, `ArrowLeft` or `ArrowRight`
    input: String,
}

/// Reader page, or back to the landing page when there is nothing to open
async fn open_reader(State(state): State<AppState>, Query(query): Query<ReaderQuery>) -> Response {
    let url = match query.url {
        Some(url) if !url.trim().is_empty() => url,
        _ => {
            tracing::debug!("Reader opened without a URL, redirecting to landing page");
            return Redirect::to("/").into_response();
        }
    };

    let view = state.views().open(url.clone()).await;
    ReaderTemplate { view, url }.into_response()
}

async fn load_view(
    State(state): State<AppState>,
    Path(view): Path<Uuid>,
    Json(request): Json<LoadRequest>,
) -> Result<Json<Page>> {
    let ticket = state.views().begin_load(view).await?;

    let rendition = match state.engine().load(ticket.url(), request.options()).await {
        Ok(rendition) => rendition,
        Err(e) => {
            state.views().fail_load(ticket).await;
            return Err(e.into());
        }
    };

    let page = state.views().finish_load(ticket, rendition).await?;
    tracing::info!(view = %view, sections = page.location.total, "Reader view loaded");
    Ok(Json(present(view, page)?))
}

async fn turn_page(
    State(state): State<AppState>,
    Path(view): Path<Uuid>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<Page>> {
    let turn: PageTurn = request.input.parse().map_err(AppError::BadRequest)?;
    let page = state.views().turn(view, turn).await?;
    Ok(Json(present(view, page)?))
}

async fn current_page(State(state): State<AppState>, Path(view): Path<Uuid>) -> Result<Json<Page>> {
    let page = state.views().page(view).await?;
    Ok(Json(present(view, page)?))
}

async fn close_view(State(state): State<AppState>, Path(view): Path<Uuid>) -> StatusCode {
    if state.views().close(view).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn view_resource(
    State(state): State<AppState>,
    Path((view, href)): Path<(Uuid, String)>,
) -> Result<Response> {
    let resource = state.views().resource(view, &href).await?;

    Ok((
        [
            (header::CONTENT_TYPE, resource.media_type),
            (header::CACHE_CONTROL, "private, max-age=3600".to_string()),
        ],
        resource.data,
    )
        .into_response())
}

/// Point section references at this view's resource endpoint
fn present(view: Uuid, mut page: Page) -> Result<Page> {
    let prefix = resource_prefix(view);
    for section in &mut page.sections {
        section.html = rewrite_section(&section.html, &section.href, &prefix)
            .map_err(|e| AppError::Internal(e.to_string()))?;
    }
    Ok(page)
}
