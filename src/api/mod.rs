//! Incident list API access
//!
//! [`PageFetcher`] is the seam the view fetches through; [`HttpPageFetcher`]
//! is the reqwest implementation used against a live deployment.

pub mod fetcher;
pub mod http;

pub use fetcher::{CursorPage, PageFetcher};
pub use http::HttpPageFetcher;
