use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use super::transport::RealtimeHandlers;
use crate::filtering::FilterCell;
use crate::metrics::REALTIME_EVENTS_TOTAL;
use crate::models::Incident;
use crate::state::SharedStore;

/// What the reconciler did with one realtime event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Admission {
    /// Written to the store
    Applied,
    /// Not relevant to the current view, store untouched
    Ignored,
    /// No longer matches the filter, removed from the store
    Evicted,
}

/// Applies pushed incident events to a store, admitting them against the
/// filter that is current when each event arrives.
///
/// Never fails: every event ends as one store operation or none.
#[derive(Clone)]
pub struct RealtimeReconciler {
    store: SharedStore,
    filter: FilterCell,
}

impl RealtimeReconciler {
    pub fn new(store: SharedStore, filter: FilterCell) -> Self {
        Self { store, filter }
    }

    pub fn handle_add(&self, incident: Incident) -> Admission {
        let pk = incident.pk;
        let admission = if self.filter.matches(&incident) {
            self.store.lock().add(incident);
            Admission::Applied
        } else {
            Admission::Ignored
        };
        self.record("add", pk, admission)
    }

    pub fn handle_modify(&self, incident: Incident) -> Admission {
        let pk = incident.pk;
        let admission = if self.filter.matches(&incident) {
            self.store.lock().modify(incident);
            Admission::Applied
        } else {
            let mut store = self.store.lock();
            if store.remove(pk).is_some() {
                Admission::Evicted
            } else {
                Admission::Ignored
            }
        };
        self.record("modify", pk, admission)
    }

    pub fn handle_remove(&self, incident: Incident) -> Admission {
        let pk = incident.pk;
        let admission = match self.store.lock().remove(pk) {
            Some(_) => Admission::Applied,
            None => Admission::Ignored,
        };
        self.record("remove", pk, admission)
    }

    fn record(&self, kind: &str, pk: i64, admission: Admission) -> Admission {
        debug!(kind = kind, pk = pk, decision = %admission, "Realtime event reconciled");
        REALTIME_EVENTS_TOTAL
            .with_label_values(&[kind, &admission.to_string()])
            .inc();
        admission
    }
}

impl RealtimeHandlers for RealtimeReconciler {
    /// The initial snapshot is not applied; the REST page load owns the
    /// store's baseline.
    fn on_initial(&self, incidents: Vec<Incident>) {
        debug!(count = incidents.len(), "Ignoring realtime start snapshot");
    }

    fn on_add(&self, incident: Incident) {
        self.handle_add(incident);
    }

    fn on_modify(&self, incident: Incident) {
        self.handle_modify(incident);
    }

    fn on_remove(&self, incident: Incident) {
        self.handle_remove(incident);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Filter, IncidentPk, IncidentTag, SeverityLevel, ShowState, SourceSystem,
    };
    use crate::state::IncidentStore;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn incident(pk: IncidentPk) -> Incident {
        Incident {
            pk,
            start_time: Utc::now(),
            end_time: None,
            stateful: true,
            details_url: String::new(),
            description: String::new(),
            ticket_url: String::new(),
            open: true,
            acked: false,
            level: SeverityLevel::High,
            source: SourceSystem {
                pk: 1,
                name: "argus".to_string(),
                source_type: "argus".to_string(),
            },
            source_incident_id: String::new(),
            tags: vec![IncidentTag::new("host=a")],
        }
    }

    fn reconciler(filter: Filter) -> (RealtimeReconciler, SharedStore, FilterCell) {
        let store: SharedStore = Arc::new(Mutex::new(IncidentStore::new()));
        let cell = FilterCell::new(filter);
        (
            RealtimeReconciler::new(store.clone(), cell.clone()),
            store,
            cell,
        )
    }

    #[test]
    fn test_add_admits_only_matching() {
        let (reconciler, store, _) = reconciler(Filter::default());

        assert_eq!(reconciler.handle_add(incident(1)), Admission::Applied);

        let mut closed = incident(2);
        closed.open = false;
        assert_eq!(reconciler.handle_add(closed), Admission::Ignored);

        assert_eq!(store.lock().len(), 1);
        assert!(store.lock().contains(1));
    }

    #[test]
    fn test_ack_evicts_from_unacked_view() {
        let (reconciler, store, _) = reconciler(Filter::default());
        store.lock().load_all(vec![incident(7)]).unwrap();

        let mut acked = incident(7);
        acked.acked = true;

        assert_eq!(reconciler.handle_modify(acked), Admission::Evicted);
        assert!(store.lock().get_by_pk(7).is_none());
    }

    #[test]
    fn test_evict_then_readmit() {
        let (reconciler, store, _) = reconciler(Filter::default());
        store.lock().load_all(vec![incident(7)]).unwrap();

        let mut acked = incident(7);
        acked.acked = true;
        reconciler.handle_modify(acked.clone());
        assert!(!store.lock().contains(7));

        // Still not matching: nothing to evict
        assert_eq!(reconciler.handle_modify(acked), Admission::Ignored);

        let unacked = incident(7);
        assert_eq!(reconciler.handle_modify(unacked.clone()), Admission::Applied);
        assert_eq!(store.lock().get_by_pk(7), Some(&unacked));
    }

    #[test]
    fn test_remove_is_unconditional() {
        let (reconciler, store, _) = reconciler(Filter::default());
        store.lock().load_all(vec![incident(1), incident(2)]).unwrap();

        let mut closed = incident(1);
        closed.open = false;
        assert_eq!(reconciler.handle_remove(closed), Admission::Applied);
        assert_eq!(reconciler.handle_remove(incident(99)), Admission::Ignored);
        assert_eq!(store.lock().len(), 1);
    }

    #[test]
    fn test_reads_filter_at_event_time() {
        let (reconciler, store, cell) = reconciler(Filter::default());

        let mut closed = incident(3);
        closed.open = false;
        assert_eq!(reconciler.handle_add(closed.clone()), Admission::Ignored);

        cell.replace(Filter::default().with_show(ShowState::Both));
        assert_eq!(reconciler.handle_add(closed), Admission::Applied);
        assert!(store.lock().contains(3));
    }

    #[test]
    fn test_initial_snapshot_is_not_applied() {
        let (reconciler, store, _) = reconciler(Filter::everything());
        reconciler.on_initial(vec![incident(1), incident(2)]);
        assert!(store.lock().is_empty());
    }
}
