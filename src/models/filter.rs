use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumString};

use super::incident::SeverityLevel;

/// A filter tag parsed from its `key=value` form.
///
/// Two tags are the same filter term when their `original` strings match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
    pub original: String,
}

impl Tag {
    /// Parse a tag by splitting on the first `=`.
    ///
    /// A string without `=` becomes a key with an empty value.
    pub fn parse(original: &str) -> Self {
        let (key, value) = original.split_once('=').unwrap_or((original, ""));
        Self {
            key: key.to_string(),
            value: value.to_string(),
            original: original.to_string(),
        }
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.original == other.original
    }
}

impl Eq for Tag {}

impl std::hash::Hash for Tag {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.original.hash(state);
    }
}

impl FromStr for Tag {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Tag::parse(s))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// Which incidents to show by open/closed state
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ShowState {
    #[default]
    Open,
    Closed,
    Both,
}

impl ShowState {
    /// The `open` flag an incident must have, or `None` when either is fine
    pub fn required_open(&self) -> Option<bool> {
        match self {
            ShowState::Open => Some(true),
            ShowState::Closed => Some(false),
            ShowState::Both => None,
        }
    }
}

/// How a view keeps itself up to date after the initial load
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AutoUpdate {
    Never,
    #[default]
    Realtime,
    Interval,
}

/// The currently selected incident view filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Open, closed or both
    #[serde(default)]
    pub show: ShowState,

    /// Include acknowledged incidents
    #[serde(default)]
    pub show_acked: bool,

    /// Tag terms: AND across keys, OR within a key
    #[serde(default)]
    pub tags: Vec<Tag>,

    /// Restrict to these source system ids. `None` or empty means all sources.
    #[serde(default)]
    pub sources_by_id: Option<Vec<i64>>,

    /// Only incidents at least this severe (numerically `<=`)
    #[serde(default)]
    pub max_level: Option<SeverityLevel>,

    /// Restrict to stateful (`true`) or stateless (`false`) incidents
    #[serde(default)]
    pub stateful: Option<bool>,

    /// Only incidents that started within this many hours. 0 means no limit.
    #[serde(default)]
    pub timeframe_hours: u32,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            show: ShowState::Open,
            show_acked: false,
            tags: Vec::new(),
            sources_by_id: None,
            max_level: None,
            stateful: None,
            timeframe_hours: 0,
        }
    }
}

impl Filter {
    /// A filter that lets every incident through
    pub fn everything() -> Self {
        Self {
            show: ShowState::Both,
            show_acked: true,
            ..Default::default()
        }
    }

    pub fn with_show(mut self, show: ShowState) -> Self {
        self.show = show;
        self
    }

    pub fn with_show_acked(mut self, show_acked: bool) -> Self {
        self.show_acked = show_acked;
        self
    }

    /// Add tag terms from their `key=value` strings, skipping ones already present
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in tags {
            let tag = Tag::parse(raw.as_ref());
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self
    }

    pub fn with_sources(mut self, sources: Vec<i64>) -> Self {
        self.sources_by_id = Some(sources);
        self
    }

    pub fn with_max_level(mut self, level: SeverityLevel) -> Self {
        self.max_level = Some(level);
        self
    }

    pub fn with_stateful(mut self, stateful: bool) -> Self {
        self.stateful = Some(stateful);
        self
    }

    pub fn with_timeframe_hours(mut self, hours: u32) -> Self {
        self.timeframe_hours = hours;
        self
    }

    /// Earliest start time admitted at `now`, if the timeframe is limited
    pub fn timeframe_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (self.timeframe_hours > 0).then(|| now - Duration::hours(i64::from(self.timeframe_hours)))
    }
}
