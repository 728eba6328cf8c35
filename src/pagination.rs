//! Cursor pagination with a client-side virtual page counter
//!
//! The list endpoint hands out opaque `next`/`previous` cursors and never a
//! total count, so the page number shown to operators is a counter the client
//! keeps itself. The server stays the source of truth for whether a next or
//! previous page exists.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Result};

/// Reported as the total element count until the last page has been seen
pub const UNKNOWN_TOTAL: i64 = -1;

/// Page size used when nothing else is configured
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Server-issued cursor state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    pub next: Option<String>,
    pub previous: Option<String>,
    /// Cursor the current page is fetched with; `None` is the first page
    pub current: Option<String>,
    pub page_size: usize,
}

/// Client-side page position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualCursor {
    pub current_virtual_page: usize,
    /// Known once a page without a `next` cursor has been seen
    pub last_virtual_page: Option<usize>,
    /// Items on the most recently recorded page
    pub items_on_page: Option<usize>,
}

/// State machine over `next_page`, `previous_page` and `change_page_size`.
///
/// Moving consumes the cursor it moved with: `next` and `previous` stay empty
/// until [`PaginationController::record_page`] stores the cursors of the newly
/// fetched page, so a move can never be applied twice against one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationController {
    cursor: CursorState,
    virtual_cursor: VirtualCursor,
}

impl PaginationController {
    pub fn new(page_size: usize) -> Self {
        Self {
            cursor: CursorState {
                next: None,
                previous: None,
                current: None,
                page_size: page_size.max(1),
            },
            virtual_cursor: VirtualCursor::default(),
        }
    }

    pub fn cursor(&self) -> &CursorState {
        &self.cursor
    }

    pub fn virtual_cursor(&self) -> &VirtualCursor {
        &self.virtual_cursor
    }

    pub fn current_cursor(&self) -> Option<&str> {
        self.cursor.current.as_deref()
    }

    pub fn page_size(&self) -> usize {
        self.cursor.page_size
    }

    pub fn current_virtual_page(&self) -> usize {
        self.virtual_cursor.current_virtual_page
    }

    pub fn has_next(&self) -> bool {
        self.cursor.next.is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.cursor.previous.is_some()
    }

    /// Move forward. Only allowed while the server reports a next page.
    pub fn next_page(&mut self) -> Result<()> {
        let next = self
            .cursor
            .next
            .take()
            .ok_or_else(|| AppError::Pagination("no next page".to_string()))?;

        self.cursor.previous = None;
        self.cursor.current = Some(next);
        self.virtual_cursor.current_virtual_page += 1;
        self.virtual_cursor.items_on_page = None;

        debug!(page = self.virtual_cursor.current_virtual_page, "Moved to next page");
        Ok(())
    }

    /// Move back. Only allowed while the server reports a previous page.
    ///
    /// Arriving at virtual page 0 drops the cursor: the first page is always
    /// fetched without one.
    pub fn previous_page(&mut self) -> Result<()> {
        let previous = self
            .cursor
            .previous
            .take()
            .ok_or_else(|| AppError::Pagination("no previous page".to_string()))?;

        self.cursor.next = None;
        self.virtual_cursor.current_virtual_page =
            self.virtual_cursor.current_virtual_page.saturating_sub(1);
        self.cursor.current = if self.virtual_cursor.current_virtual_page == 0 {
            None
        } else {
            Some(previous)
        };
        self.virtual_cursor.items_on_page = None;

        debug!(page = self.virtual_cursor.current_virtual_page, "Moved to previous page");
        Ok(())
    }

    /// Start over from the first page at a new size
    pub fn change_page_size(&mut self, page_size: usize) -> Result<()> {
        if page_size == 0 {
            return Err(AppError::Validation("page size must be positive".to_string()));
        }
        *self = Self::new(page_size);
        debug!(page_size = page_size, "Page size changed, pagination restarted");
        Ok(())
    }

    /// Back to the first page, keeping the page size
    pub fn reset(&mut self) {
        *self = Self::new(self.cursor.page_size);
    }

    /// Store the cursors and size of a freshly fetched page
    pub fn record_page(&mut self, next: Option<String>, previous: Option<String>, items: usize) {
        if next.is_none() {
            self.virtual_cursor.last_virtual_page = Some(self.virtual_cursor.current_virtual_page);
        }
        self.cursor.next = next;
        self.cursor.previous = previous;
        self.virtual_cursor.items_on_page = Some(items);
    }

    /// Whether the total element count can be computed right now
    pub fn total_elements_known(&self) -> bool {
        self.cursor.next.is_none() && self.virtual_cursor.items_on_page.is_some()
    }

    /// Approximate total number of elements, or [`UNKNOWN_TOTAL`].
    ///
    /// Derived from the current cursor state on every call; only meaningful
    /// until the cursor state changes again.
    pub fn total_elements(&self) -> i64 {
        match self.virtual_cursor.items_on_page {
            Some(items) if self.cursor.next.is_none() => {
                (self.cursor.page_size * self.virtual_cursor.current_virtual_page + items) as i64
            }
            _ => UNKNOWN_TOTAL,
        }
    }
}

impl Default for PaginationController {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}
