use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filtering::IncidentQuery;
use crate::models::Incident;

/// One page of a cursor-paginated list response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorPage<T> {
    pub results: Vec<T>,
    /// Absolute URL of the next page
    #[serde(default)]
    pub next: Option<String>,
    /// Absolute URL of the previous page
    #[serde(default)]
    pub previous: Option<String>,
}

impl<T> CursorPage<T> {
    pub fn new(results: Vec<T>, next: Option<String>, previous: Option<String>) -> Self {
        Self {
            results,
            next,
            previous,
        }
    }

    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// Source of incident pages.
///
/// When `cursor` is set it is the complete URL of the page and every other
/// argument is ignored.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        query: &IncidentQuery,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<CursorPage<Incident>>;
}
