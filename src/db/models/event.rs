use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::schedule;

// ============================================================================
// Event (fiesta) models
// ============================================================================

/// A stored event row. `starts_at` is a UTC instant; the civil date/time the
/// town sees is always derived in the fixed timezone, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub img: String,
    pub description: String,
    pub location: String,
    pub provisional: bool,
    pub starts_at: NaiveDateTime,
    pub attendees: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Wire representation of an event: the row plus the derived civil strings
/// the pages render directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: i64,
    pub title: String,
    pub img: String,
    pub description: String,
    pub location: String,
    pub provisional: bool,
    pub attendees: Vec<String>,
    pub tags: Vec<String>,
    pub starts_at: DateTime<Utc>,
    pub date: String,
    pub time: String,
}

impl From<Event> for EventView {
    fn from(ev: Event) -> Self {
        let (date, time) = schedule::civil_parts(ev.starts_at);
        EventView {
            id: ev.id,
            title: ev.title,
            img: ev.img,
            description: ev.description,
            location: ev.location,
            provisional: ev.provisional,
            attendees: ev.attendees,
            tags: ev.tags,
            starts_at: schedule::as_utc(ev.starts_at),
            date,
            time,
        }
    }
}

/// Validated insert payload; optional text fields are already resolved to
/// the empty string and attendees are duplicate-free.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub img: String,
    pub description: String,
    pub location: String,
    pub provisional: bool,
    pub starts_at: DateTime<Utc>,
    pub attendees: Vec<String>,
    pub tags: Vec<String>,
}

/// Partial patch; only present fields mutate the row. A new `date` or `time`
/// recomputes the stored instant from the patched-or-current civil strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    pub title: Option<String>,
    pub img: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub provisional: Option<bool>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub attendees: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

/// Lookup key for update/delete/attend: the surrogate id when the caller has
/// it, otherwise the legacy natural key. An omitted (or blank) `date`/`time`
/// is a wildcard, not "equals empty string". `startsAt` is an optional extra
/// disambiguator carrying the raw stored instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventMatch {
    ById {
        id: i64,
    },
    ByKey {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<String>,
        #[serde(
            default,
            rename = "startsAt",
            skip_serializing_if = "Option::is_none"
        )]
        starts_at: Option<DateTime<Utc>>,
    },
}

impl EventMatch {
    pub fn by_id(id: i64) -> Self {
        EventMatch::ById { id }
    }

    pub fn by_key(title: &str, date: Option<&str>, time: Option<&str>) -> Self {
        EventMatch::ByKey {
            title: title.to_string(),
            date: date.map(str::to_string),
            time: time.map(str::to_string),
            starts_at: None,
        }
    }

    /// Whether a wire-level event satisfies this key. Used by the intranet
    /// client to re-derive membership after a list refetch.
    pub fn matches_view(&self, view: &EventView) -> bool {
        match self {
            EventMatch::ById { id } => view.id == *id,
            EventMatch::ByKey {
                title,
                date,
                time,
                starts_at,
            } => {
                let date_ok = match normalized(date) {
                    Some(d) => view.date == d,
                    None => true,
                };
                let time_ok = match normalized(time) {
                    Some(t) => view.time == t,
                    None => true,
                };
                let instant_ok = starts_at.map_or(true, |s| view.starts_at == s);
                view.title == *title && date_ok && time_ok && instant_ok
            }
        }
    }
}

/// Treat blanks the same as absent so legacy callers sending `date: ""`
/// still get wildcard semantics.
pub fn normalized(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Drop duplicate and blank attendee names, keeping first-seen order.
pub fn dedup_attendees(names: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for name in names {
        let name = name.trim();
        if !name.is_empty() && !seen.iter().any(|s: &String| s == name) {
            seen.push(name.to_string());
        }
    }
    seen
}

// ============================================================================
// Attendance wire types
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendAction {
    #[default]
    Toggle,
    Add,
    Remove,
}

/// The concrete action the server performed — never the client's guess.
/// `Noop` means the requested add/remove was already satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveAction {
    Add,
    Remove,
    Noop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendRequest {
    #[serde(rename = "match")]
    pub target: EventMatch,
    #[serde(default)]
    pub action: AttendAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendOutcome {
    pub ok: bool,
    pub action: EffectiveAction,
}
