//! Reader view registry
//!
//! One reader view per reader page load. A view owns at most one rendition
//! and every load is bound to the view it was started for: a load that
//! completes after its view was closed or reloaded is disposed, never
//! installed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::epub::Resource;
use crate::error::LoadError;

use super::rendition::{Page, PageTurn, Rendition};

/// How often the idle sweep runs
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Proof that a load was started; only the latest ticket of an open view
/// may install its rendition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub view: Uuid,
    generation: u64,
    url: String,
}

impl LoadTicket {
    /// The document URL the view was opened for
    pub fn url(&self) -> &str {
        &self.url
    }
}

enum ViewState {
    /// Registered, nothing loaded yet
    Pending,
    /// A load with this generation is in flight
    Loading(u64),
    Ready(Box<dyn Rendition>),
    Closed,
}

impl ViewState {
    fn dispose(&mut self) {
        if let ViewState::Ready(rendition) = self {
            rendition.dispose();
        }
    }
}

struct ReaderView {
    /// Document this view reads; fixed when the reader page is served
    url: String,
    state: ViewState,
    generation: u64,
    last_seen: DateTime<Utc>,
}

impl ReaderView {
    fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    fn is_current(&self, ticket: &LoadTicket) -> bool {
        matches!(self.state, ViewState::Loading(generation) if generation == ticket.generation)
    }
}

type SharedView = Arc<Mutex<ReaderView>>;

/// All live reader views.
///
/// The map lock is only held to find a view. Work on a rendition happens
/// under that view's own lock, on the blocking pool, so one slow book never
/// stalls the other readers.
#[derive(Clone)]
pub struct ViewRegistry {
    inner: Arc<ViewRegistryInner>,
}

struct ViewRegistryInner {
    views: RwLock<HashMap<Uuid, SharedView>>,
    /// Views without activity for this long are closed by the sweep
    idle: Duration,
}

impl ViewRegistry {
    pub fn new(idle: Duration) -> Self {
        Self {
            inner: Arc::new(ViewRegistryInner {
                views: RwLock::new(HashMap::new()),
                idle,
            }),
        }
    }

    async fn view(&self, id: Uuid) -> Result<SharedView, LoadError> {
        self.inner
            .views
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(LoadError::ViewNotFound(id))
    }

    // ========================================================================
    // View Lifecycle
    // ========================================================================

    /// Register a new view reading `url`
    pub async fn open(&self, url: impl Into<String>) -> Uuid {
        let id = Uuid::new_v4();
        let view = ReaderView {
            url: url.into(),
            state: ViewState::Pending,
            generation: 0,
            last_seen: Utc::now(),
        };
        self.inner
            .views
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(view)));
        tracing::debug!(view = %id, "Opened reader view");
        id
    }

    /// Start a load into `view`, disposing whatever it currently shows
    pub async fn begin_load(&self, id: Uuid) -> Result<LoadTicket, LoadError> {
        let shared = self.view(id).await?;
        let mut view = shared.lock().await;

        if matches!(view.state, ViewState::Closed) {
            return Err(LoadError::ViewClosed(id));
        }

        view.state.dispose();
        view.generation += 1;
        view.state = ViewState::Loading(view.generation);
        view.touch();

        Ok(LoadTicket {
            view: id,
            generation: view.generation,
            url: view.url.clone(),
        })
    }

    /// Install a loaded rendition and display its first location.
    ///
    /// If the view was closed or a newer load started meanwhile, the
    /// rendition is disposed and the load fails with [`LoadError::Abandoned`].
    /// If the first display fails, the view is closed.
    pub async fn finish_load(
        &self,
        ticket: LoadTicket,
        mut rendition: Box<dyn Rendition>,
    ) -> Result<Page, LoadError> {
        let mut view = match self.view(ticket.view).await {
            Ok(shared) => shared.lock_owned().await,
            Err(_) => return Err(abandon(&ticket, rendition)),
        };
        if !view.is_current(&ticket) {
            return Err(abandon(&ticket, rendition));
        }
        view.touch();

        run_blocking(move || match rendition.display() {
            Ok(page) => {
                view.state = ViewState::Ready(rendition);
                Ok(page)
            }
            Err(e) => {
                rendition.dispose();
                view.state = ViewState::Closed;
                Err(e)
            }
        })
        .await
    }

    /// Record a failed load; the view is closed if the load was still current
    pub async fn fail_load(&self, ticket: LoadTicket) {
        if let Ok(shared) = self.view(ticket.view).await {
            let mut view = shared.lock().await;
            if view.is_current(&ticket) {
                view.state = ViewState::Closed;
            }
        }
    }

    /// Close a view and dispose its rendition. Returns false for unknown views.
    pub async fn close(&self, id: Uuid) -> bool {
        let Ok(shared) = self.view(id).await else {
            return false;
        };

        let mut view = shared.lock().await;
        view.state.dispose();
        view.state = ViewState::Closed;
        view.touch();
        tracing::debug!(view = %id, "Closed reader view");
        true
    }

    // ========================================================================
    // Rendition Access
    // ========================================================================

    async fn with_rendition<T, F>(&self, id: Uuid, f: F) -> Result<T, LoadError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Rendition) -> Result<T, LoadError> + Send + 'static,
    {
        let mut view = self.view(id).await?.lock_owned().await;
        view.touch();

        run_blocking(move || match &mut view.state {
            ViewState::Ready(rendition) => f(rendition.as_mut()),
            ViewState::Closed => Err(LoadError::ViewClosed(id)),
            ViewState::Pending | ViewState::Loading(_) => Err(LoadError::NotLoaded(id)),
        })
        .await
    }

    /// The page currently displayed
    pub async fn page(&self, id: Uuid) -> Result<Page, LoadError> {
        self.with_rendition(id, |rendition| rendition.display()).await
    }

    pub async fn turn(&self, id: Uuid, turn: PageTurn) -> Result<Page, LoadError> {
        self.with_rendition(id, move |rendition| rendition.turn(turn)).await
    }

    pub async fn resource(&self, id: Uuid, href: &str) -> Result<Resource, LoadError> {
        let href = href.to_string();
        self.with_rendition(id, move |rendition| rendition.resource(&href))
            .await
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    pub async fn view_count(&self) -> usize {
        self.inner.views.read().await.len()
    }

    /// Drop views idle since before `cutoff`, disposing their renditions.
    /// A view busy with a request is in use and kept.
    pub async fn cleanup_idle_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut views = self.inner.views.write().await;
        let before = views.len();

        views.retain(|id, shared| {
            let Ok(mut view) = shared.try_lock() else {
                return true;
            };
            if view.last_seen >= cutoff {
                return true;
            }
            view.state.dispose();
            view.state = ViewState::Closed;
            tracing::debug!(view = %id, "Dropped idle reader view");
            false
        });

        let count = before - views.len();
        if count > 0 {
            tracing::info!(count, "Cleaned up idle reader views");
        }
        count
    }

    pub async fn cleanup_idle(&self) -> usize {
        let idle =
            chrono::Duration::from_std(self.inner.idle).unwrap_or_else(|_| chrono::Duration::zero());
        self.cleanup_idle_before(Utc::now() - idle).await
    }

    /// Start background cleanup task
    pub fn start_cleanup_task(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);

            loop {
                interval.tick().await;
                self.cleanup_idle().await;
            }
        })
    }
}

fn abandon(ticket: &LoadTicket, mut rendition: Box<dyn Rendition>) -> LoadError {
    rendition.dispose();
    tracing::debug!(view = %ticket.view, "Discarded superseded load");
    LoadError::Abandoned(ticket.view)
}

/// Rendering inflates archive entries; keep it off the async workers
async fn run_blocking<T, F>(f: F) -> Result<T, LoadError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, LoadError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LoadError::Render(e.to_string()))?
}
