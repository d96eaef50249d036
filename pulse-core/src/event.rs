//! Analytics events as they travel over the bus.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DecodeError;

/// Bus subject carrying every analytics event.
pub const ANALYTICS_SUBJECT: &str = "events.analytics";

/// Schema-less payload attached to an event, stored verbatim.
pub type EventData = serde_json::Map<String, serde_json::Value>;

/// Kind of tracked user action.
///
/// Transmitted as a plain string so producers can introduce new kinds without
/// breaking consumers that do not know them yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// A user viewed a page.
    PageView,
    /// A user logged in.
    UserLogin,
    /// Any kind this build does not know about. Never holds a known tag:
    /// build values through [`EventType::parse`] or `From<String>` so that
    /// `Other("page_view")` cannot exist alongside `PageView`. An empty tag
    /// is never valid and fails [`AnalyticsEvent::from_json`].
    Other(String),
}

impl EventType {
    /// Map a wire tag to its kind, falling back to `Other` for unknown tags.
    pub fn parse(tag: impl Into<String>) -> Self {
        Self::from(tag.into())
    }

    /// Re-map an `Other` that carries a known tag.
    fn normalized(self) -> Self {
        match self {
            EventType::Other(tag) => Self::from(tag),
            known => known,
        }
    }

    /// Wire representation of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::PageView => "page_view",
            EventType::UserLogin => "user_login",
            EventType::Other(s) => s,
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "page_view" => EventType::PageView,
            "user_login" => EventType::UserLogin,
            _ => EventType::Other(s),
        }
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        match t {
            EventType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One occurrence of a tracked user action.
///
/// `created_at` is assigned by the producer and is authoritative; nothing
/// downstream rewrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    /// What happened.
    pub event_type: EventType,
    /// Who did it. Not validated against any user table.
    pub user_id: i64,
    /// When it happened, in UTC.
    pub created_at: DateTime<Utc>,
    /// Opaque extra data, passed through to storage untouched.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub event_data: EventData,
}

impl AnalyticsEvent {
    /// Create an event stamped with the current time and no extra data.
    pub fn new(event_type: EventType, user_id: i64) -> Self {
        Self {
            event_type: event_type.normalized(),
            user_id,
            created_at: Utc::now(),
            event_data: EventData::new(),
        }
    }

    /// Set the creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Add one entry to the event data.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.event_data.insert(key.into(), value.into());
        self
    }

    /// Decode and validate a bus payload.
    ///
    /// A decode error is permanent: the same bytes will fail again on every
    /// redelivery.
    pub fn from_json(payload: &[u8]) -> Result<Self, DecodeError> {
        let event: AnalyticsEvent = serde_json::from_slice(payload)?;
        if event.event_type.as_str().is_empty() {
            return Err(DecodeError::Invalid("event_type must not be empty"));
        }
        Ok(event)
    }

    /// Encode as a bus payload.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Generate a random event, used by the `produce` tool.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let event_type = if rng.gen_bool(0.5) {
            EventType::PageView
        } else {
            EventType::UserLogin
        };
        Self::new(event_type, rng.gen_range(0..300)).with_data("page", "/dashboard")
    }
}

/// Producers that serialize an empty map as `null` still decode cleanly.
fn null_as_empty<'de, D>(deserializer: D) -> Result<EventData, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<EventData>::deserialize(deserializer).map(Option::unwrap_or_default)
}
