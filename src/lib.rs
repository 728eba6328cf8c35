//! Incident view synchronization engine
//!
//! Keeps a filtered, cursor-paginated view of incidents consistent across
//! page loads from the REST API, filter changes and realtime push events.
//!
//! - [`models`]: incidents, tags and view filters
//! - [`filtering`]: the admission predicate and its query translation
//! - [`state`]: the indexed incident store
//! - [`pagination`]: cursor pagination with a virtual page counter
//! - [`realtime`]: push transport, wire messages and the reconciler
//! - [`api`]: page fetching
//! - [`view`]: everything above wired into one view

pub mod api;
pub mod config;
pub mod error;
pub mod filtering;
pub mod metrics;
pub mod models;
pub mod pagination;
pub mod realtime;
pub mod state;
pub mod view;

pub use api::{CursorPage, HttpPageFetcher, PageFetcher};
pub use config::Config;
pub use error::{AppError, Result};
pub use filtering::{matches, FilterCell, FilterMatcher, IncidentQuery};
pub use models::{Filter, Incident, IncidentPk, SeverityLevel, ShowState, Tag};
pub use pagination::PaginationController;
pub use realtime::{ConnectionState, InMemoryTransport, RealtimeReconciler, RealtimeTransport};
pub use state::{IncidentStore, SharedStore, StoreChange};
pub use view::{FetchOutcome, IncidentView, PageSummary, ViewConfig};
