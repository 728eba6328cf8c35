//! Admission test deciding whether an incident belongs in a filtered view

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashSet};

use crate::models::{Filter, Incident, SeverityLevel, ShowState, Tag};

/// Open/closed sub-predicate
pub fn matches_show(incident: &Incident, show: ShowState) -> bool {
    match show.required_open() {
        None => true,
        Some(open) => incident.open == open,
    }
}

/// Acknowledgement sub-predicate. Showing acked incidents means showing
/// everything, not only acked ones.
pub fn matches_acked(incident: &Incident, show_acked: bool) -> bool {
    show_acked || !incident.acked
}

/// Tag sub-predicate: for every key in the filter at least one of that key's
/// tags must be on the incident.
pub fn matches_tags(incident: &Incident, tags: &[Tag]) -> bool {
    if tags.is_empty() {
        return true;
    }
    let incident_tags: HashSet<&str> = incident.tag_strings().collect();
    group_by_key(tags)
        .values()
        .all(|alternatives| alternatives.iter().any(|t| incident_tags.contains(t.as_str())))
}

/// Source sub-predicate
pub fn matches_sources(incident: &Incident, sources_by_id: Option<&[i64]>) -> bool {
    match sources_by_id {
        None | Some([]) => true,
        Some(sources) => sources.contains(&incident.source.pk),
    }
}

/// Severity sub-predicate
pub fn matches_max_level(incident: &Incident, max_level: Option<SeverityLevel>) -> bool {
    max_level.map_or(true, |max| incident.level <= max)
}

/// Statefulness sub-predicate
pub fn matches_stateful(incident: &Incident, stateful: Option<bool>) -> bool {
    stateful.map_or(true, |stateful| incident.stateful == stateful)
}

/// Timeframe sub-predicate: started no earlier than `hours` before `now`.
/// Zero hours admits everything.
pub fn matches_timeframe(incident: &Incident, hours: u32, now: DateTime<Utc>) -> bool {
    hours == 0 || incident.start_time >= now - Duration::hours(i64::from(hours))
}

/// Whether `incident` belongs in the view selected by `filter`, with the
/// timeframe measured back from now.
pub fn matches(incident: &Incident, filter: &Filter) -> bool {
    matches_at(incident, filter, Utc::now())
}

/// [`matches`] with an explicit clock. Pure and total: a conjunction of
/// independent sub-predicates.
pub fn matches_at(incident: &Incident, filter: &Filter, now: DateTime<Utc>) -> bool {
    matches_show(incident, filter.show)
        && matches_acked(incident, filter.show_acked)
        && matches_tags(incident, &filter.tags)
        && matches_sources(incident, filter.sources_by_id.as_deref())
        && matches_max_level(incident, filter.max_level)
        && matches_stateful(incident, filter.stateful)
        && matches_timeframe(incident, filter.timeframe_hours, now)
}

fn group_by_key(tags: &[Tag]) -> BTreeMap<&str, Vec<String>> {
    let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for tag in tags {
        let group = groups.entry(tag.key.as_str()).or_default();
        if !group.contains(&tag.original) {
            group.push(tag.original.clone());
        }
    }
    groups
}

/// A filter compiled once so per-event admission does not regroup tags.
///
/// Always agrees with [`matches`] for the filter it was built from.
#[derive(Debug, Clone)]
pub struct FilterMatcher {
    filter: Filter,
    tag_groups: Vec<HashSet<String>>,
    sources: Option<HashSet<i64>>,
}

impl FilterMatcher {
    pub fn new(filter: Filter) -> Self {
        let tag_groups = group_by_key(&filter.tags)
            .into_values()
            .map(|group| group.into_iter().collect())
            .collect();
        let sources = filter
            .sources_by_id
            .as_ref()
            .filter(|ids| !ids.is_empty())
            .map(|ids| ids.iter().copied().collect());

        Self {
            filter,
            tag_groups,
            sources,
        }
    }

    /// The filter this matcher was compiled from
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn matches(&self, incident: &Incident) -> bool {
        self.matches_at(incident, Utc::now())
    }

    pub fn matches_at(&self, incident: &Incident, now: DateTime<Utc>) -> bool {
        if !matches_show(incident, self.filter.show)
            || !matches_acked(incident, self.filter.show_acked)
            || !matches_max_level(incident, self.filter.max_level)
            || !matches_stateful(incident, self.filter.stateful)
            || !matches_timeframe(incident, self.filter.timeframe_hours, now)
        {
            return false;
        }

        if let Some(sources) = &self.sources {
            if !sources.contains(&incident.source.pk) {
                return false;
            }
        }

        self.tag_groups
            .iter()
            .all(|group| incident.tag_strings().any(|t| group.contains(t)))
    }
}

impl From<Filter> for FilterMatcher {
    fn from(filter: Filter) -> Self {
        Self::new(filter)
    }
}
