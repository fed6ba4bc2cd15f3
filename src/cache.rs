use crate::models::{Event, DATE_FORMAT};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;
use tokio::time::{Duration, Instant};

/// Shape of a listing query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    All,
    Date(NaiveDate),
}

impl CacheKey {
    pub fn for_selection(selected_date: Option<NaiveDate>) -> Self {
        match selected_date {
            Some(date) => Self::Date(date),
            None => Self::All,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Date(date) => write!(f, "{}", date.format(DATE_FORMAT)),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    events: Vec<Event>,
    captured_at: Instant,
}

#[derive(Debug)]
pub struct QueryCache {
    ttl: Duration,
    entries: HashMap<CacheKey, CacheEntry>,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Returns the snapshot for `key` while it is younger than the TTL.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<Event>> {
        let entry = self.entries.get(key)?;
        if entry.captured_at.elapsed() < self.ttl {
            Some(entry.events.clone())
        } else {
            None
        }
    }

    pub fn put(&mut self, key: CacheKey, events: Vec<Event>) {
        self.entries.insert(
            key,
            CacheEntry {
                events,
                captured_at: Instant::now(),
            },
        );
    }

    /// Swaps the snapshot of a live entry without extending its lifetime.
    pub fn replace_events(&mut self, key: &CacheKey, events: Vec<Event>) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.events = events;
        }
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
