//! Filter evaluation for incident views
//!
//! - [`predicate`]: the pure admission test and its compiled form
//! - [`cell`]: the shared holder realtime callbacks read the filter through
//! - [`query`]: translation of a filter into list endpoint parameters

pub mod cell;
pub mod predicate;
pub mod query;

pub use cell::FilterCell;
pub use predicate::{matches, matches_at, FilterMatcher};
pub use query::IncidentQuery;
