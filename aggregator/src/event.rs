//! Event types shared by the ingestion gate, the queue and the consumer pool.
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Offset-aware layouts accepted on top of RFC 3339.
const AWARE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TimestampError {
    #[error("'{0}' is not a valid ISO-8601 timestamp")]
    Invalid(String),
}

/// A single log event, as submitted by clients and carried through the queue.
///
/// `payload` is opaque to the pipeline: it is stored and returned untouched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Event {
    pub topic: String,
    pub event_id: String,
    pub timestamp: String,
    pub source: String,
    pub payload: Map<String, Value>,
}

impl Event {
    /// Check the parts of the event that the type system can't, namely the timestamp.
    pub fn validate(&self) -> Result<(), TimestampError> {
        parse_timestamp(&self.timestamp).map(|_| ())
    }

    /// Build the record handed to the store, normalizing the timestamp with `mode`.
    pub fn into_record(self, mode: TimestampMode) -> Result<EventRecord, TimestampError> {
        let timestamp = parse_timestamp(&self.timestamp)?.normalize(mode);

        Ok(EventRecord {
            topic: self.topic,
            event_id: self.event_id,
            timestamp,
            source: self.source,
            payload: self.payload,
        })
    }
}

/// An event ready to be inserted: same fields as `Event`, with a naive timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub topic: String,
    pub event_id: String,
    pub timestamp: NaiveDateTime,
    pub source: String,
    pub payload: Map<String, Value>,
}

/// An event as persisted in the store.
///
/// The surrogate id and insertion time are storage details and are not serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEvent {
    #[serde(skip_serializing)]
    pub id: i64,
    pub topic: String,
    pub event_id: String,
    pub timestamp: NaiveDateTime,
    pub source: String,
    pub payload: Map<String, Value>,
    #[serde(skip_serializing)]
    pub received_at: NaiveDateTime,
}

/// How an offset-aware timestamp is turned into the naive value we store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampMode {
    /// Keep the wall-clock time as written and drop the offset.
    #[default]
    Strip,
    /// Convert to UTC first, then drop the offset.
    Utc,
}

impl FromStr for TimestampMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "strip" => Ok(TimestampMode::Strip),
            "utc" => Ok(TimestampMode::Utc),
            _ => Err(format!("Unknown timestamp mode: {s}, must be STRIP or UTC")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTimestamp {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl ParsedTimestamp {
    pub fn normalize(self, mode: TimestampMode) -> NaiveDateTime {
        match (self, mode) {
            (ParsedTimestamp::Aware(at), TimestampMode::Strip) => at.naive_local(),
            (ParsedTimestamp::Aware(at), TimestampMode::Utc) => at.naive_utc(),
            (ParsedTimestamp::Naive(at), _) => at,
        }
    }
}

/// Parse an ISO-8601 timestamp, with or without an offset, or a bare date (midnight).
pub fn parse_timestamp(raw: &str) -> Result<ParsedTimestamp, TimestampError> {
    let trimmed = raw.trim();

    if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ParsedTimestamp::Aware(at));
    }
    for format in AWARE_FORMATS {
        if let Ok(at) = DateTime::parse_from_str(trimmed, format) {
            return Ok(ParsedTimestamp::Aware(at));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(at) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ParsedTimestamp::Naive(at));
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(ParsedTimestamp::Naive)
        .ok_or_else(|| TimestampError::Invalid(raw.to_owned()))
}
