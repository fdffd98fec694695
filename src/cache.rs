//! In-memory analysis cache with time-to-live.
//!
//! Records are keyed by the SHA-256 of the uploaded bytes. Expiry is
//! enforced on read as well as by the periodic sweep, so a record past
//! its `expires_at` is never served even if the sweeper has not run.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::clock::SharedClock;
use crate::models::AnalysisRecord;

// ═══════════════════════════════════════════════════════════
// Entries: map plus expiry index
// ═══════════════════════════════════════════════════════════

#[derive(Default)]
struct Entries {
    records: HashMap<String, AnalysisRecord>,
    /// Ordered by expiry so a sweep only walks what has expired.
    expiry: BTreeSet<(DateTime<Utc>, String)>,
}

impl Entries {
    fn remove(&mut self, key: &str) -> Option<AnalysisRecord> {
        let record = self.records.remove(key)?;
        self.expiry.remove(&(record.expires_at, key.to_string()));
        Some(record)
    }
}

// ═══════════════════════════════════════════════════════════
// AnalysisCache
// ═══════════════════════════════════════════════════════════

pub struct AnalysisCache {
    ttl: Duration,
    clock: SharedClock,
    entries: Mutex<Entries>,
}

impl AnalysisCache {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(Entries::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or replace a record, stamping `created_at` and `expires_at`.
    /// Returns the stored copy.
    pub fn put(&self, record: AnalysisRecord) -> AnalysisRecord {
        self.replace(record).0
    }

    /// Like [`put`](Self::put), but also hands back the record that was
    /// displaced, live or expired, so its stored upload can be deleted.
    pub fn replace(&self, mut record: AnalysisRecord) -> (AnalysisRecord, Option<AnalysisRecord>) {
        let now = self.clock.now();
        record.created_at = now;
        record.expires_at = now + self.ttl;

        let key = record.content_hash.clone();
        let mut entries = self.lock();
        let previous = entries.remove(&key);
        entries.expiry.insert((record.expires_at, key.clone()));
        entries.records.insert(key, record.clone());
        (record, previous)
    }

    /// Fetch a live record. Expired records are treated as absent.
    pub fn get(&self, key: &str) -> Option<AnalysisRecord> {
        let now = self.clock.now();
        let entries = self.lock();
        entries
            .records
            .get(key)
            .filter(|r| now < r.expires_at)
            .cloned()
    }

    /// Whether a live record exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&self, key: &str) -> Option<AnalysisRecord> {
        self.lock().remove(key)
    }

    /// Drop every record whose `expires_at` is at or before now.
    /// Returns the removed records so the caller can clean up their files.
    pub fn sweep(&self) -> Vec<AnalysisRecord> {
        let now = self.clock.now();
        let mut entries = self.lock();

        let expired: Vec<String> = entries
            .expiry
            .iter()
            .take_while(|(at, _)| *at <= now)
            .map(|(_, key)| key.clone())
            .collect();

        expired
            .iter()
            .filter_map(|key| entries.remove(key))
            .collect()
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.records.clear();
        entries.expiry.clear();
    }

    /// Number of stored records, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }
}
