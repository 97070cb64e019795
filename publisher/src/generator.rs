//! Random traffic: mostly new events, with a share of exact replays of recent ones.
use std::collections::VecDeque;

use chrono::{DateTime, SecondsFormat, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Map, Value};
use uuid::Builder;

use aggregator::event::Event;

pub const TOPICS: &[&str] = &[
    "system.logs",
    "payment.gateway",
    "user.auth",
    "order.processing",
];

pub const SOURCES: &[&str] = &["service-a", "service-b", "mobile-app", "web-frontend"];

#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    New(Event),
    /// A copy of an event that was generated before.
    Duplicate(Event),
}

impl Generated {
    pub fn event(&self) -> &Event {
        match self {
            Generated::New(event) | Generated::Duplicate(event) => event,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Generated::Duplicate(_))
    }
}

pub struct EventGenerator<R: Rng> {
    rng: R,
    history: VecDeque<Event>,
    history_size: usize,
    duplicate_rate: f64,
}

impl<R: Rng> EventGenerator<R> {
    pub fn new(rng: R, history_size: usize, duplicate_rate: f64) -> Self {
        Self {
            rng,
            history: VecDeque::with_capacity(history_size),
            history_size,
            duplicate_rate: if duplicate_rate.is_nan() {
                0.0
            } else {
                duplicate_rate.clamp(0.0, 1.0)
            },
        }
    }

    /// Replay a remembered event with probability `duplicate_rate`, otherwise make a new one.
    pub fn next_event(&mut self, now: DateTime<Utc>) -> Generated {
        if !self.history.is_empty() && self.rng.gen_bool(self.duplicate_rate) {
            let index = self.rng.gen_range(0..self.history.len());
            if let Some(event) = self.history.get(index) {
                return Generated::Duplicate(event.clone());
            }
        }

        let event = self.new_event(now);
        if self.history_size > 0 {
            if self.history.len() == self.history_size {
                self.history.pop_front();
            }
            self.history.push_back(event.clone());
        }
        Generated::New(event)
    }

    fn new_event(&mut self, now: DateTime<Utc>) -> Event {
        let topic = TOPICS.choose(&mut self.rng).copied().unwrap_or(TOPICS[0]);
        let source = SOURCES.choose(&mut self.rng).copied().unwrap_or(SOURCES[0]);
        let event_id = Builder::from_random_bytes(self.rng.gen()).into_uuid();

        let mut payload = Map::new();
        payload.insert(
            "cpu_usage".to_owned(),
            json!(self.rng.gen_range(10..=90)),
        );
        payload.insert("memory".to_owned(), json!(self.rng.gen_range(100..=1024)));
        payload.insert("status".to_owned(), Value::from("active"));

        Event {
            topic: topic.to_owned(),
            event_id: event_id.to_string(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Micros, true),
            source: source.to_owned(),
            payload,
        }
    }
}
