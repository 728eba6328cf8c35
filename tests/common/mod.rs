//! Common test utilities
//!
//! Incident fixtures, a scripted page fetcher and helpers for reading the
//! Prometheus exposition output.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use incident_sync::api::{CursorPage, PageFetcher};
use incident_sync::error::{AppError, Result};
use incident_sync::filtering::IncidentQuery;
use incident_sync::models::{Incident, IncidentPk, IncidentTag, SeverityLevel, SourceSystem};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// An open, unacknowledged incident tagged `host=a`
pub fn incident(pk: IncidentPk) -> Incident {
    Incident {
        pk,
        start_time: Utc::now() - ChronoDuration::minutes(pk),
        end_time: None,
        stateful: true,
        details_url: format!("https://nav.example.org/incidents/{}", pk),
        description: format!("Incident {}", pk),
        ticket_url: String::new(),
        open: true,
        acked: false,
        level: SeverityLevel::Moderate,
        source: SourceSystem {
            pk: 1,
            name: "nav".to_string(),
            source_type: "nav".to_string(),
        },
        source_incident_id: pk.to_string(),
        tags: vec![IncidentTag::new("host=a")],
    }
}

pub fn acked(pk: IncidentPk) -> Incident {
    Incident {
        acked: true,
        ..incident(pk)
    }
}

pub fn closed(pk: IncidentPk) -> Incident {
    Incident {
        open: false,
        end_time: Some(Utc::now()),
        ..incident(pk)
    }
}

/// Incidents `from..to` as one page
pub fn page(
    pks: std::ops::Range<IncidentPk>,
    next: Option<&str>,
    previous: Option<&str>,
) -> CursorPage<Incident> {
    CursorPage::new(
        pks.map(incident).collect(),
        next.map(str::to_owned),
        previous.map(str::to_owned),
    )
}

pub fn pks(incidents: &[Incident]) -> Vec<IncidentPk> {
    incidents.iter().map(|i| i.pk).collect()
}

/// A request the fetcher received
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub query: IncidentQuery,
    pub cursor: Option<String>,
    pub page_size: usize,
}

struct Scripted {
    delay: Option<Duration>,
    response: Result<CursorPage<Incident>>,
}

/// Page fetcher answering from a script, in order. Once the script runs out
/// every request gets an empty last page.
#[derive(Default)]
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, page: CursorPage<Incident>) {
        self.push(None, Ok(page));
    }

    /// Answer the next request only after `delay`
    pub fn push_delayed(&self, delay: Duration, page: CursorPage<Incident>) {
        self.push(Some(delay), Ok(page));
    }

    pub fn push_error(&self, error: AppError) {
        self.push(None, Err(error));
    }

    fn push(&self, delay: Option<Duration>, response: Result<CursorPage<Incident>>) {
        self.script.lock().push_back(Scripted { delay, response });
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(
        &self,
        query: &IncidentQuery,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<CursorPage<Incident>> {
        self.requests.lock().push(FetchRequest {
            query: query.clone(),
            cursor: cursor.map(str::to_owned),
            page_size,
        });

        let next = self.script.lock().pop_front();
        match next {
            Some(Scripted { delay, response }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                response
            }
            None => Ok(CursorPage::new(vec![], None, None)),
        }
    }
}

/// Value of the sample of `metric` carrying all of `labels`
/// Example: `metric{a="1",b="2"} 42` with `[("a", "1")]` -> Some(42.0)
pub fn metric_value(output: &str, metric: &str, labels: &[(&str, &str)]) -> Option<f64> {
    output
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter(|line| line.starts_with(&format!("{}{{", metric)) || line.starts_with(&format!("{} ", metric)))
        .find(|line| {
            let found = extract_labels(line);
            labels
                .iter()
                .all(|(key, value)| found.get(*key).map(String::as_str) == Some(*value))
        })
        .and_then(|line| line.split_whitespace().last()?.parse::<f64>().ok())
}

/// Extract labels from a Prometheus metric line
pub fn extract_labels(line: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();

    if let (Some(start), Some(end)) = (line.find('{'), line.find('}')) {
        for pair in line[start + 1..end].split(',') {
            if let Some((key, value)) = pair.split_once('=') {
                labels.insert(key.trim().to_string(), value.trim().trim_matches('"').to_string());
            }
        }
    }

    labels
}
