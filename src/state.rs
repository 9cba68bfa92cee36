//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::reader::{RenderEngine, ViewRegistry};
use crate::storage::BookStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: Arc<dyn BookStore>,
    engine: Arc<dyn RenderEngine>,
    views: ViewRegistry,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn BookStore>, engine: Arc<dyn RenderEngine>) -> Self {
        let views = ViewRegistry::new(config.reader.view_idle());
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                engine,
                views,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the book store
    pub fn store(&self) -> &dyn BookStore {
        self.inner.store.as_ref()
    }

    /// Get the rendering engine
    pub fn engine(&self) -> &dyn RenderEngine {
        self.inner.engine.as_ref()
    }

    /// Get the reader view registry
    pub fn views(&self) -> &ViewRegistry {
        &self.inner.views
    }
}
