//! A filtered, paginated incident view kept in sync with the API and the
//! realtime feed.
//!
//! Page loads replace the store wholesale; realtime events patch it one
//! incident at a time. Both write through the same [`SharedStore`], and every
//! page load is tagged with a generation so that only the most recently issued
//! load can land.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::PageFetcher;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::filtering::{FilterCell, IncidentQuery};
use crate::metrics::{PAGE_FETCHES_TOTAL, PAGE_FETCH_DURATION_SECONDS};
use crate::models::{AutoUpdate, Filter, Incident, IncidentPk};
use crate::pagination::{PaginationController, DEFAULT_PAGE_SIZE};
use crate::realtime::{ConnectionState, RealtimeReconciler, RealtimeTransport, StateListener};
use crate::state::{IncidentStore, SharedStore, StoreChange};

/// Settings of one view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    pub page_size: usize,
    /// Sizes `change_page_size` accepts; empty accepts any positive size
    pub page_size_options: Vec<usize>,
    pub realtime_enabled: bool,
    pub auto_update: AutoUpdate,
    pub refresh_interval: Duration,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_size_options: vec![10, 25, 50, 100],
            realtime_enabled: true,
            auto_update: AutoUpdate::Realtime,
            refresh_interval: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for ViewConfig {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.pagination.default_page_size,
            page_size_options: config.pagination.page_size_options.clone(),
            realtime_enabled: config.realtime.enabled,
            auto_update: config.refresh.auto_update,
            refresh_interval: config.refresh.interval(),
        }
    }
}

/// Result of a page load that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// The page replaced the store contents
    Applied { count: usize },
    /// A newer load was issued while this one was in flight; nothing changed
    Stale,
}

/// Pagination as presented to an operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub page: usize,
    pub page_size: usize,
    /// `-1` until the last page has been reached
    pub total_elements: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

pub struct IncidentView {
    id: Uuid,
    config: ViewConfig,
    fetcher: Arc<dyn PageFetcher>,
    transport: Arc<dyn RealtimeTransport>,
    store: SharedStore,
    filter: FilterCell,
    pagination: Mutex<PaginationController>,
    generation: AtomicU64,
    connection: Arc<watch::Sender<ConnectionState>>,
}

impl IncidentView {
    /// Create a view and wire its reconciler and state listener into
    /// `transport`. Nothing is fetched or connected until asked.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        transport: Arc<dyn RealtimeTransport>,
        filter: Filter,
        config: ViewConfig,
    ) -> Self {
        let id = Uuid::new_v4();
        let store: SharedStore = Arc::new(Mutex::new(IncidentStore::new()));
        let filter = FilterCell::new(filter);

        transport.set_handlers(Arc::new(RealtimeReconciler::new(
            store.clone(),
            filter.clone(),
        )));

        let (connection, _) = watch::channel(transport.state());
        let connection = Arc::new(connection);
        let sink = connection.clone();
        let listener: StateListener = Arc::new(move |previous, current| {
            debug!(view_id = %id, from = %previous, to = %current, "View connection state");
            sink.send_replace(current);
        });
        transport.set_state_listener(listener);

        info!(view_id = %id, page_size = config.page_size, "Incident view created");

        Self {
            id,
            pagination: Mutex::new(PaginationController::new(config.page_size)),
            config,
            fetcher,
            transport,
            store,
            filter,
            generation: AtomicU64::new(0),
            connection,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Load the first page, then keep the view up to date the configured way.
    ///
    /// Returns the refresh task in interval mode.
    pub async fn start(self: &Arc<Self>) -> Result<Option<JoinHandle<()>>> {
        self.refresh().await?;

        match self.config.auto_update {
            AutoUpdate::Realtime if self.config.realtime_enabled => {
                self.start_realtime().await?;
                Ok(None)
            }
            AutoUpdate::Realtime => {
                info!(view_id = %self.id, "Realtime disabled by configuration");
                Ok(None)
            }
            AutoUpdate::Interval => Ok(Some(self.spawn_auto_refresh(self.config.refresh_interval))),
            AutoUpdate::Never => Ok(None),
        }
    }

    /// Connect the realtime transport
    pub async fn start_realtime(&self) -> Result<()> {
        info!(view_id = %self.id, "Starting realtime updates");
        self.transport.connect().await
    }

    // ------------------------------------------------------------------
    // Filter and pagination
    // ------------------------------------------------------------------

    /// Install a new filter, start over from the first page at the configured
    /// page size and reload.
    ///
    /// Realtime events see the new filter as soon as this is called, before
    /// the reload completes.
    pub async fn set_filter(&self, filter: Filter) -> Result<FetchOutcome> {
        self.filter.replace(filter);
        // Cursors are only valid for the filter they were issued under
        *self.pagination.lock() = PaginationController::new(self.config.page_size);
        info!(view_id = %self.id, "Filter changed, reloading from the first page");
        self.refresh().await
    }

    pub fn filter(&self) -> Filter {
        self.filter.filter()
    }

    /// Reload the current page
    pub async fn refresh(&self) -> Result<FetchOutcome> {
        let target = self.pagination.lock().clone();
        self.load(target).await
    }

    pub async fn next_page(&self) -> Result<FetchOutcome> {
        let mut target = self.pagination.lock().clone();
        target.next_page()?;
        self.load(target).await
    }

    pub async fn previous_page(&self) -> Result<FetchOutcome> {
        let mut target = self.pagination.lock().clone();
        target.previous_page()?;
        self.load(target).await
    }

    pub async fn change_page_size(&self, page_size: usize) -> Result<FetchOutcome> {
        if !self.config.page_size_options.is_empty()
            && !self.config.page_size_options.contains(&page_size)
        {
            return Err(AppError::Validation(format!(
                "page size {} is not one of {:?}",
                page_size, self.config.page_size_options
            )));
        }

        let mut target = self.pagination.lock().clone();
        target.change_page_size(page_size)?;
        self.load(target).await
    }

    /// Fetch the page `target` points at and, if this is still the newest
    /// load, commit both the page and `target`.
    async fn load(&self, mut target: PaginationController) -> Result<FetchOutcome> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let query = IncidentQuery::from_filter(self.filter.current().filter());
        let cursor = target.current_cursor().map(str::to_owned);

        debug!(
            view_id = %self.id,
            generation = generation,
            page = target.current_virtual_page(),
            page_size = target.page_size(),
            "Fetching incident page"
        );

        let timer = PAGE_FETCH_DURATION_SECONDS.start_timer();
        let result = self
            .fetcher
            .fetch_page(&query, cursor.as_deref(), target.page_size())
            .await;
        timer.observe_duration();

        // Checked and applied under the store lock so a newer load cannot
        // land in between.
        let mut store = self.store.lock();

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(view_id = %self.id, generation = generation, "Discarding superseded page");
            PAGE_FETCHES_TOTAL.with_label_values(&["stale"]).inc();
            return Ok(FetchOutcome::Stale);
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(view_id = %self.id, error = %e, "Incident page fetch failed, keeping current view");
                PAGE_FETCHES_TOTAL.with_label_values(&["failed"]).inc();
                return Err(e);
            }
        };

        let count = page.results.len();
        if let Err(e) = store.load_all(page.results) {
            warn!(view_id = %self.id, error = %e, "Rejected incident page");
            PAGE_FETCHES_TOTAL.with_label_values(&["failed"]).inc();
            return Err(e);
        }
        target.record_page(page.next, page.previous, count);
        *self.pagination.lock() = target;

        PAGE_FETCHES_TOTAL.with_label_values(&["applied"]).inc();
        info!(view_id = %self.id, count = count, "Incident page loaded");
        Ok(FetchOutcome::Applied { count })
    }

    /// Refresh every `period` until the view is dropped or the handle is
    /// aborted. Failed refreshes are logged and retried on the next tick.
    pub fn spawn_auto_refresh(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let view: Weak<Self> = Arc::downgrade(self);
        let start = tokio::time::Instant::now() + period;
        let mut ticks = IntervalStream::new(tokio::time::interval_at(start, period));

        info!(view_id = %self.id, interval_ms = period.as_millis() as u64, "Auto refresh started");

        tokio::spawn(async move {
            while ticks.next().await.is_some() {
                let Some(current) = view.upgrade() else {
                    break;
                };
                if let Err(e) = current.refresh().await {
                    warn!(view_id = %current.id, error = %e, "Auto refresh failed");
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Copy of the incidents currently in view, in store order
    pub fn incidents(&self) -> Vec<Incident> {
        self.store.lock().incidents().to_vec()
    }

    pub fn get(&self, pk: IncidentPk) -> Option<Incident> {
        self.store.lock().get_by_pk(pk).cloned()
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// The store handle, for local edits such as acknowledging an incident
    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.store.lock().subscribe()
    }

    pub fn pagination(&self) -> PaginationController {
        self.pagination.lock().clone()
    }

    pub fn total_elements(&self) -> i64 {
        self.pagination.lock().total_elements()
    }

    pub fn page_summary(&self) -> PageSummary {
        let pagination = self.pagination.lock();
        PageSummary {
            page: pagination.current_virtual_page(),
            page_size: pagination.page_size(),
            total_elements: pagination.total_elements(),
            has_next: pagination.has_next(),
            has_previous: pagination.has_previous(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    /// Watch connection state changes
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Disconnect, detach from the transport and discard the contents.
    ///
    /// Page loads still in flight are discarded when they complete.
    pub async fn shutdown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        if let Err(e) = self.transport.disconnect().await {
            warn!(view_id = %self.id, error = %e, "Realtime disconnect failed during shutdown");
        }
        self.transport.reset_handlers();
        self.transport.reset_state_listener();
        self.store.lock().clear();

        info!(view_id = %self.id, "Incident view shut down");
    }
}
