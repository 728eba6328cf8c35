//! Integration tests for realtime updates flowing into a view

mod common;

use common::*;
use incident_sync::models::{Filter, Incident};
use incident_sync::realtime::{
    ConnectionState, InMemoryTransport, RealtimeMessage, RealtimeTransport,
};
use incident_sync::state::StoreChange;
use incident_sync::{IncidentView, ViewConfig};
use std::sync::Arc;
use std::time::Duration;

async fn live_view(initial: std::ops::Range<i64>) -> (Arc<IncidentView>, Arc<InMemoryTransport>) {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.push_page(page(initial, None, None));

    let transport = Arc::new(InMemoryTransport::new());
    let view = Arc::new(IncidentView::new(
        fetcher,
        transport.clone(),
        Filter::default(),
        ViewConfig::default(),
    ));
    view.start().await.unwrap();
    (view, transport)
}

fn message(kind: &str, incident: &Incident) -> String {
    serde_json::json!({ "type": kind, "payload": incident }).to_string()
}

#[tokio::test]
async fn test_start_connects_and_subscribes() {
    let (view, transport) = live_view(1..3).await;

    assert_eq!(view.len(), 2);
    assert_eq!(transport.state(), ConnectionState::Opened);
    assert_eq!(transport.sent_actions().len(), 1);
    assert_eq!(view.connection_state(), ConnectionState::Opened);
}

#[tokio::test]
async fn test_wire_messages_are_reconciled() {
    let (view, transport) = live_view(1..3).await;

    transport.deliver_json(&message("created", &incident(10))).unwrap();
    transport.deliver_json(&message("created", &closed(11))).unwrap();
    transport.deliver_json(&message("modified", &acked(1))).unwrap();
    transport.deliver_json(&message("deleted", &incident(2))).unwrap();

    assert_eq!(pks(&view.incidents()), vec![10]);
    assert!(view.store().lock().is_consistent());
}

#[tokio::test]
async fn test_evicted_incident_is_readmitted() {
    let (view, transport) = live_view(1..4).await;

    transport
        .deliver(RealtimeMessage::Modified { payload: acked(2) })
        .unwrap();
    assert!(view.get(2).is_none());

    transport
        .deliver(RealtimeMessage::Modified { payload: acked(2) })
        .unwrap();
    assert!(view.get(2).is_none());

    transport
        .deliver(RealtimeMessage::Modified { payload: incident(2) })
        .unwrap();

    // Readmitted at the end, not at its old position
    assert_eq!(pks(&view.incidents()), vec![1, 3, 2]);
}

#[tokio::test]
async fn test_events_use_filter_current_at_arrival() {
    let (view, transport) = live_view(1..2).await;

    transport
        .deliver(RealtimeMessage::Created { payload: acked(5) })
        .unwrap();
    assert!(view.get(5).is_none());

    view.set_filter(Filter::default().with_show_acked(true))
        .await
        .unwrap();

    transport
        .deliver(RealtimeMessage::Created { payload: acked(6) })
        .unwrap();
    transport
        .deliver(RealtimeMessage::Modified { payload: acked(6) })
        .unwrap();
    assert!(view.get(6).is_some());
}

#[tokio::test]
async fn test_subscribed_snapshot_does_not_replace_store() {
    let (view, transport) = live_view(1..3).await;

    transport
        .deliver(RealtimeMessage::Subscribed {
            start_incidents: vec![incident(40), incident(41), incident(42)],
        })
        .unwrap();

    assert_eq!(pks(&view.incidents()), vec![1, 2]);
    assert_eq!(transport.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_store_changes_are_broadcast() {
    let (view, transport) = live_view(1..2).await;
    let mut changes = view.subscribe();

    transport
        .deliver(RealtimeMessage::Created { payload: incident(7) })
        .unwrap();
    transport
        .deliver(RealtimeMessage::Deleted { payload: incident(1) })
        .unwrap();

    assert_eq!(changes.recv().await.unwrap(), StoreChange::Added { pk: 7 });
    assert_eq!(changes.recv().await.unwrap(), StoreChange::Removed { pk: 1 });
}

#[tokio::test]
async fn test_connection_lifecycle_is_observable() {
    let (view, transport) = live_view(1..2).await;
    let mut states = view.watch_connection();

    transport
        .deliver(RealtimeMessage::Created { payload: incident(3) })
        .unwrap();
    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), ConnectionState::Connected);

    let retry_in = transport.drop_connection().unwrap();
    assert_eq!(retry_in, Duration::from_secs(1));
    assert_eq!(view.connection_state(), ConnectionState::Closed);

    transport.reconnect().await.unwrap();
    assert_eq!(view.connection_state(), ConnectionState::Opened);

    view.shutdown().await;
    assert_eq!(transport.state(), ConnectionState::Closed);
    assert!(view.is_empty());
}

#[tokio::test]
async fn test_page_load_replaces_realtime_additions() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.push_page(page(1..3, None, None));
    fetcher.push_delayed(Duration::from_millis(50), page(1..4, None, None));

    let transport = Arc::new(InMemoryTransport::new());
    let view = Arc::new(IncidentView::new(
        fetcher,
        transport.clone(),
        Filter::default(),
        ViewConfig::default(),
    ));
    view.start().await.unwrap();

    let reload = {
        let view = view.clone();
        tokio::spawn(async move { view.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Arrives while the reload is in flight
    transport
        .deliver(RealtimeMessage::Created { payload: incident(99) })
        .unwrap();
    assert!(view.get(99).is_some());

    reload.await.unwrap().unwrap();

    assert_eq!(pks(&view.incidents()), vec![1, 2, 3]);
    assert!(view.store().lock().is_consistent());
}
