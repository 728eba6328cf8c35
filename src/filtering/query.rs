//! Query parameters sent to the incidents list endpoint

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Filter, Tag};

/// Server-side filter parameters derived from a view [`Filter`].
///
/// The server only ever narrows; it is asked for unacked incidents when acked
/// ones are hidden, never for "only acked".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentQuery {
    /// `open=true|false`, omitted to get both
    pub open: Option<bool>,

    /// `acked=false`, omitted when acked incidents are shown
    pub acked: Option<bool>,

    /// `tags=<comma-joined originals>`, omitted when empty
    pub tags: Vec<String>,

    /// `source__id__in=<comma-joined ids>`
    pub source_ids: Option<Vec<i64>>,

    /// `stateful=true|false`
    pub stateful: Option<bool>,

    /// `level__lte=<n>`
    pub max_level: Option<u8>,

    /// `start_time__gte=<RFC 3339>`, set when the timeframe is limited
    pub start_time_gte: Option<DateTime<Utc>>,
}

impl IncidentQuery {
    /// Parameters for `filter`, with the timeframe measured back from now
    pub fn from_filter(filter: &Filter) -> Self {
        Self::from_filter_at(filter, Utc::now())
    }

    pub fn from_filter_at(filter: &Filter, now: DateTime<Utc>) -> Self {
        Self {
            open: filter.show.required_open(),
            acked: if filter.show_acked { None } else { Some(false) },
            tags: filter.tags.iter().map(|t: &Tag| t.original.clone()).collect(),
            source_ids: filter.sources_by_id.clone().filter(|ids| !ids.is_empty()),
            stateful: filter.stateful,
            max_level: filter.max_level.map(|level| level.as_number()),
            start_time_gte: filter.timeframe_start(now),
        }
    }

    /// Render as ordered `(name, value)` pairs, `page_size` last
    pub fn to_pairs(&self, page_size: usize) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(acked) = self.acked {
            params.push(("acked", acked.to_string()));
        }
        if let Some(open) = self.open {
            params.push(("open", open.to_string()));
        }
        if let Some(stateful) = self.stateful {
            params.push(("stateful", stateful.to_string()));
        }
        if let Some(level) = self.max_level {
            params.push(("level__lte", level.to_string()));
        }
        if let Some(ids) = &self.source_ids {
            let joined = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
            params.push(("source__id__in", joined));
        }
        if let Some(start) = self.start_time_gte {
            params.push(("start_time__gte", start.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if !self.tags.is_empty() {
            params.push(("tags", self.tags.join(",")));
        }
        params.push(("page_size", page_size.to_string()));
        params
    }
}

impl From<&Filter> for IncidentQuery {
    fn from(filter: &Filter) -> Self {
        Self::from_filter(filter)
    }
}
