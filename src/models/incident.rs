use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// Primary key of an incident as issued by the upstream API
pub type IncidentPk = i64;

/// An incident as reported by the upstream monitoring system.
///
/// Fields hold whatever the API or the realtime feed last reported, unless a
/// local edit (close, reopen, acknowledge) changed them since.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Primary key, unique within a store
    pub pk: IncidentPk,

    /// When the incident started
    pub start_time: DateTime<Utc>,

    /// When the incident ended. `None` for stateless incidents and for
    /// stateful incidents that are still ongoing (sent as `"infinity"`).
    #[serde(default, deserialize_with = "deserialize_end_time")]
    pub end_time: Option<DateTime<Utc>>,

    /// Whether the incident has a start and an end
    pub stateful: bool,

    #[serde(default)]
    pub details_url: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub ticket_url: String,

    /// Open/closed state
    pub open: bool,

    /// Whether someone acknowledged the incident
    pub acked: bool,

    /// Severity level, 1 (critical) through 5 (information)
    pub level: SeverityLevel,

    /// The system that reported the incident
    pub source: SourceSystem,

    #[serde(default)]
    pub source_incident_id: String,

    /// Tags in `key=value` form
    #[serde(default)]
    pub tags: Vec<IncidentTag>,
}

impl Incident {
    /// Iterate over the raw `key=value` tag strings
    pub fn tag_strings(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.tag.as_str())
    }

    /// Whether the incident carries the exact tag string
    pub fn has_tag(&self, original: &str) -> bool {
        self.tag_strings().any(|t| t == original)
    }

    /// Stateful incident without an end time
    pub fn is_ongoing(&self) -> bool {
        self.stateful && self.end_time.is_none()
    }
}

fn deserialize_end_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("infinity") | Some("") => Ok(None),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}

/// Reference to the system an incident came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSystem {
    pub pk: i64,
    pub name: String,
    #[serde(rename = "type", default)]
    pub source_type: String,
}

/// A tag attached to an incident
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentTag {
    /// Raw `key=value` string
    pub tag: String,
    #[serde(default)]
    pub added_by: Option<i64>,
    #[serde(default)]
    pub added_time: Option<DateTime<Utc>>,
}

impl IncidentTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            added_by: None,
            added_time: None,
        }
    }
}

/// Incident severity. Lower numbers are more severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum SeverityLevel {
    Critical = 1,
    High = 2,
    Moderate = 3,
    Low = 4,
    Information = 5,
}

impl SeverityLevel {
    /// Numeric level as used by the API
    pub fn as_number(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for SeverityLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SeverityLevel::Critical),
            2 => Ok(SeverityLevel::High),
            3 => Ok(SeverityLevel::Moderate),
            4 => Ok(SeverityLevel::Low),
            5 => Ok(SeverityLevel::Information),
            other => Err(format!("severity level must be 1..=5, got {}", other)),
        }
    }
}

impl From<SeverityLevel> for u8 {
    fn from(level: SeverityLevel) -> Self {
        level.as_number()
    }
}
