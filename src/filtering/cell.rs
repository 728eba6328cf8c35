use parking_lot::RwLock;
use std::sync::Arc;

use super::predicate::FilterMatcher;
use crate::models::{Filter, Incident};

/// Shared, swappable holder of the current filter.
///
/// Realtime callbacks read the filter through this cell on every event, so a
/// filter change is visible to the very next event without reinstalling
/// anything in the transport.
#[derive(Clone)]
pub struct FilterCell {
    inner: Arc<RwLock<Arc<FilterMatcher>>>,
}

impl FilterCell {
    pub fn new(filter: Filter) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(FilterMatcher::new(filter)))),
        }
    }

    /// Compile and install a new filter, returning the previous one
    pub fn replace(&self, filter: Filter) -> Filter {
        let compiled = Arc::new(FilterMatcher::new(filter));
        let previous = std::mem::replace(&mut *self.inner.write(), compiled);
        previous.filter().clone()
    }

    /// Snapshot of the current compiled filter
    pub fn current(&self) -> Arc<FilterMatcher> {
        self.inner.read().clone()
    }

    /// Clone of the current filter value
    pub fn filter(&self) -> Filter {
        self.inner.read().filter().clone()
    }

    pub fn matches(&self, incident: &Incident) -> bool {
        self.inner.read().matches(incident)
    }
}

impl Default for FilterCell {
    fn default() -> Self {
        Self::new(Filter::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShowState;

    #[test]
    fn test_replace_is_seen_by_clones() {
        let cell = FilterCell::default();
        let shared = cell.clone();

        let previous = cell.replace(Filter::default().with_show(ShowState::Closed));

        assert_eq!(previous.show, ShowState::Open);
        assert_eq!(shared.filter().show, ShowState::Closed);
        assert_eq!(shared.current().filter().show, ShowState::Closed);
    }
}
