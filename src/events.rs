//! Event records from the flat JSON data file.
//!
//! The file is read once at startup. The image core only needs the `no`
//! field, which keys the media store's `events/{no}` folder convention; the
//! rest is served as-is to the calendar pages with `status` derived from the
//! event date at read time.

use std::fs;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Past,
    Upcoming,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    /// Join key into the media store folder convention, `events/{no}`.
    pub no: String,
    pub title: String,
    /// ISO date, `YYYY-MM-DD`.
    pub date: String,
    pub time: String,
    pub location: String,
    pub course: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strava_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub komoot_link: Option<String>,
    #[serde(default = "EventStatus::upcoming")]
    pub status: EventStatus,
}

impl EventStatus {
    fn upcoming() -> Self {
        EventStatus::Upcoming
    }
}

#[derive(Error, Debug)]
pub enum EventsError {
    #[error("failed to read events file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse events file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct EventsDocument {
    events: Vec<Event>,
}

pub struct EventsFile {
    events: Vec<Event>,
}

impl EventsFile {
    pub fn load(path: &str) -> Result<Self, EventsError> {
        let raw = fs::read_to_string(path).map_err(|source| EventsError::Read {
            path: path.to_string(),
            source,
        })?;

        let document: EventsDocument =
            serde_json::from_str(&raw).map_err(|source| EventsError::Parse {
                path: path.to_string(),
                source,
            })?;

        Ok(Self::new(document.events))
    }

    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// All events with their status derived from today's date.
    pub fn all(&self) -> Vec<Event> {
        self.events.iter().map(with_current_status).collect()
    }

    /// Looks an event up by `id` or `no`.
    pub fn find(&self, key: &str) -> Option<Event> {
        self.events
            .iter()
            .find(|event| event.id == key || event.no == key)
            .map(with_current_status)
    }
}

fn with_current_status(event: &Event) -> Event {
    let mut event = event.clone();
    event.status = event_status(&event.date);
    event
}

/// Events strictly before today are past; today's events are still upcoming.
pub fn event_status(date: &str) -> EventStatus {
    let Ok(event_date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
        warn!(date, "Unparseable event date, treating as upcoming");
        return EventStatus::Upcoming;
    };

    if event_date < Utc::now().date_naive() {
        EventStatus::Past
    } else {
        EventStatus::Upcoming
    }
}
