use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::filtering::FilterMatcher;
use crate::metrics::{STORE_DUPLICATE_LOADS_TOTAL, STORE_FALLBACKS_TOTAL, STORE_INCIDENTS};
use crate::models::{Incident, IncidentPk};

/// Default capacity of the change notification channel
pub const DEFAULT_CHANGE_CAPACITY: usize = 256;

/// A change applied to an [`IncidentStore`], published to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreChange {
    /// Contents replaced wholesale
    Loaded { count: usize },
    Added { pk: IncidentPk },
    Modified { pk: IncidentPk },
    Removed { pk: IncidentPk },
    /// Contents discarded on teardown
    Cleared,
}

/// Ordered incident collection with O(1) lookup by primary key.
///
/// `index_by_pk[pk] == i` holds exactly when `incidents[i].pk == pk`. Appends
/// and in-place replacements patch the index pointwise; removals re-derive
/// every shifted position.
#[derive(Debug)]
pub struct IncidentStore {
    incidents: Vec<Incident>,
    index_by_pk: HashMap<IncidentPk, usize>,
    /// Millis since epoch of the last change to each incident
    last_modified: HashMap<IncidentPk, i64>,
    changes: broadcast::Sender<StoreChange>,
}

impl IncidentStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANGE_CAPACITY)
    }

    /// Create a store whose change channel buffers `capacity` notifications
    pub fn with_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            incidents: Vec::new(),
            index_by_pk: HashMap::new(),
            last_modified: HashMap::new(),
            changes,
        }
    }

    /// Subscribe to changes. Slow observers see `RecvError::Lagged` and should
    /// re-read the store.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Replace the whole contents.
    ///
    /// Every incident is stamped with the same load time. Fails without
    /// touching the store when `incidents` repeats a primary key.
    pub fn load_all(&mut self, incidents: Vec<Incident>) -> Result<()> {
        let mut index_by_pk = HashMap::with_capacity(incidents.len());
        for (index, incident) in incidents.iter().enumerate() {
            if index_by_pk.insert(incident.pk, index).is_some() {
                STORE_DUPLICATE_LOADS_TOTAL.inc();
                warn!(pk = incident.pk, "Rejecting bulk load with duplicate primary key");
                return Err(AppError::DuplicateKey { pk: incident.pk });
            }
        }

        let millis = now_millis();
        let last_modified = incidents.iter().map(|i| (i.pk, millis)).collect();

        let previous_len = self.incidents.len();
        self.incidents = incidents;
        self.index_by_pk = index_by_pk;
        self.last_modified = last_modified;
        STORE_INCIDENTS.add(self.incidents.len() as i64 - previous_len as i64);

        debug!(count = self.incidents.len(), "Incidents loaded");
        self.publish(StoreChange::Loaded {
            count: self.incidents.len(),
        });
        Ok(())
    }

    /// Append an incident. An incident already present is modified instead.
    pub fn add(&mut self, incident: Incident) -> StoreChange {
        if self.index_by_pk.contains_key(&incident.pk) {
            STORE_FALLBACKS_TOTAL.with_label_values(&["add_existing"]).inc();
            warn!(pk = incident.pk, "Adding incident that already exists, modifying instead");
            return self.replace_existing(incident);
        }
        self.append(incident)
    }

    /// Replace an incident in place. A missing incident is added instead.
    pub fn modify(&mut self, incident: Incident) -> StoreChange {
        if !self.index_by_pk.contains_key(&incident.pk) {
            STORE_FALLBACKS_TOTAL.with_label_values(&["modify_missing"]).inc();
            warn!(pk = incident.pk, "Modifying incident that does not exist, adding instead");
            return self.append(incident);
        }
        self.replace_existing(incident)
    }

    /// Remove an incident, returning it. Removing a missing incident is a no-op.
    pub fn remove(&mut self, pk: IncidentPk) -> Option<Incident> {
        let Some(index) = self.index_by_pk.remove(&pk) else {
            STORE_FALLBACKS_TOTAL.with_label_values(&["remove_missing"]).inc();
            warn!(pk = pk, "Removing incident that does not exist, ignoring");
            return None;
        };

        let removed = self.incidents.remove(index);
        for (offset, incident) in self.incidents[index..].iter().enumerate() {
            self.index_by_pk.insert(incident.pk, index + offset);
        }
        self.last_modified.remove(&pk);
        STORE_INCIDENTS.dec();

        debug!(pk = pk, "Incident removed");
        self.publish(StoreChange::Removed { pk });
        Some(removed)
    }

    /// Discard every incident
    pub fn clear(&mut self) {
        STORE_INCIDENTS.sub(self.incidents.len() as i64);
        self.incidents.clear();
        self.index_by_pk.clear();
        self.last_modified.clear();
        self.publish(StoreChange::Cleared);
    }

    pub fn get_by_pk(&self, pk: IncidentPk) -> Option<&Incident> {
        self.index_by_pk.get(&pk).map(|&index| &self.incidents[index])
    }

    pub fn contains(&self, pk: IncidentPk) -> bool {
        self.index_by_pk.contains_key(&pk)
    }

    /// Position of an incident in [`IncidentStore::incidents`]
    pub fn index_of(&self, pk: IncidentPk) -> Option<usize> {
        self.index_by_pk.get(&pk).copied()
    }

    /// Millis since epoch of the last change to `pk`
    pub fn last_modified(&self, pk: IncidentPk) -> Option<i64> {
        self.last_modified.get(&pk).copied()
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    /// Incidents currently satisfying `matcher`, in store order
    pub fn filtered(&self, matcher: &FilterMatcher) -> Vec<Incident> {
        self.incidents
            .iter()
            .filter(|incident| matcher.matches(incident))
            .cloned()
            .collect()
    }

    /// Mark an incident closed locally
    pub fn close(&mut self, pk: IncidentPk) -> Result<StoreChange> {
        self.edit(pk, "close", |incident| incident.open = false)
    }

    /// Mark an incident open locally
    pub fn reopen(&mut self, pk: IncidentPk) -> Result<StoreChange> {
        self.edit(pk, "reopen", |incident| incident.open = true)
    }

    /// Mark an incident acknowledged locally
    pub fn acknowledge(&mut self, pk: IncidentPk) -> Result<StoreChange> {
        self.edit(pk, "acknowledge", |incident| incident.acked = true)
    }

    /// Whether the index, timestamps and array agree
    pub fn is_consistent(&self) -> bool {
        self.index_by_pk.len() == self.incidents.len()
            && self.last_modified.len() == self.incidents.len()
            && self.incidents.iter().enumerate().all(|(i, incident)| {
                self.index_by_pk.get(&incident.pk) == Some(&i)
                    && self.last_modified.contains_key(&incident.pk)
            })
    }

    fn edit<F>(&mut self, pk: IncidentPk, action: &str, apply: F) -> Result<StoreChange>
    where
        F: FnOnce(&mut Incident),
    {
        let mut incident = self.get_by_pk(pk).cloned().ok_or_else(|| {
            AppError::NotFound(format!("Unable to {} incident {}, couldn't find it", action, pk))
        })?;
        apply(&mut incident);
        Ok(self.modify(incident))
    }

    fn append(&mut self, incident: Incident) -> StoreChange {
        let pk = incident.pk;
        self.index_by_pk.insert(pk, self.incidents.len());
        self.last_modified.insert(pk, now_millis());
        self.incidents.push(incident);
        STORE_INCIDENTS.inc();

        debug!(pk = pk, "Incident added");
        self.publish(StoreChange::Added { pk })
    }

    fn replace_existing(&mut self, incident: Incident) -> StoreChange {
        let pk = incident.pk;
        let index = self.index_by_pk[&pk];
        self.incidents[index] = incident;
        self.last_modified.insert(pk, now_millis());

        debug!(pk = pk, "Incident modified");
        self.publish(StoreChange::Modified { pk })
    }

    fn publish(&self, change: StoreChange) -> StoreChange {
        // No subscribers is fine
        let _ = self.changes.send(change.clone());
        change
    }
}

impl Default for IncidentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IncidentStore {
    fn drop(&mut self) {
        STORE_INCIDENTS.sub(self.incidents.len() as i64);
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
