//! Health check endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    /// Reader views currently registered
    pub active_views: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: "libros-reader",
        active_views: state.views().view_count().await,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::routes::app;
    use crate::state::AppState;
    use crate::testing::{FakeEngine, FakeStore};

    #[tokio::test]
    async fn test_health_on_both_paths() {
        let state = AppState::new(
            Config::default(),
            Arc::new(FakeStore::new()),
            Arc::new(FakeEngine::new()),
        );
        state.views().open("https://example.com/book.epub").await;

        for path in ["/health", "/api/v1/health"] {
            let response = app(state.clone())
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["status"], "healthy");
            assert_eq!(body["service"], "libros-reader");
            assert_eq!(body["activeViews"], 1);
        }
    }
}
