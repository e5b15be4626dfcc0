//! In-memory endpoint registry.
//!
//! Every known key maps to an [`EndpointRecord`]. Lookups are fail-open:
//! a key the registry has never seen counts as enabled. State lives only
//! for the lifetime of the process.

use std::{
    collections::BTreeMap,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde::Serialize;
use tracing::info;

use crate::core::{
    error::{AdmissionError, AdmissionResult},
    key::EndpointKey,
    matcher::compile_from_start,
};

/// Registered state of one endpoint key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointRecord {
    pub key: EndpointKey,
    pub enabled: bool,
    pub description: String,
}

/// Concurrent key to record store guarded by a single lock.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    entries: RwLock<BTreeMap<EndpointKey, EndpointRecord>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section leaves the map consistent, so a poisoned lock
    // still guards valid data.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<EndpointKey, EndpointRecord>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<EndpointKey, EndpointRecord>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the record for `key`.
    pub fn register(&self, key: EndpointKey, enabled: bool, description: impl Into<String>) {
        let record = EndpointRecord {
            key: key.clone(),
            enabled,
            description: description.into(),
        };
        self.write().insert(key, record);
    }

    /// Insert `key` only if it is unknown. Returns `true` when inserted.
    ///
    /// An existing record keeps its state; an empty description is filled in.
    pub fn register_if_absent(
        &self,
        key: EndpointKey,
        enabled: bool,
        description: impl Into<String>,
    ) -> bool {
        let mut entries = self.write();
        match entries.get_mut(&key) {
            Some(existing) => {
                if existing.description.is_empty() {
                    existing.description = description.into();
                }
                false
            }
            None => {
                let record = EndpointRecord {
                    key: key.clone(),
                    enabled,
                    description: description.into(),
                };
                entries.insert(key, record);
                true
            }
        }
    }

    /// Fail-open state lookup.
    pub fn is_enabled(&self, key: &str) -> bool {
        self.state(key).unwrap_or(true)
    }

    /// Recorded state, `None` for unknown keys.
    pub fn state(&self, key: &str) -> Option<bool> {
        self.read().get(key).map(|record| record.enabled)
    }

    pub fn get(&self, key: &str) -> Option<EndpointRecord> {
        self.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn enable(&self, key: EndpointKey) {
        self.set_enabled(key, true);
    }

    pub fn disable(&self, key: EndpointKey) {
        self.set_enabled(key, false);
    }

    /// Flip the state of `key` and return the new value. Unknown keys start
    /// from enabled, so their first toggle disables them.
    pub fn toggle(&self, key: EndpointKey) -> bool {
        let mut entries = self.write();
        let record = entries.entry(key.clone()).or_insert_with(|| EndpointRecord {
            key,
            enabled: true,
            description: String::new(),
        });
        record.enabled = !record.enabled;
        record.enabled
    }

    /// Set the state of `key`, registering it if needed.
    pub fn set_enabled(&self, key: EndpointKey, enabled: bool) {
        self.update(key, enabled, None);
    }

    /// Set state and optionally replace the description in one write.
    pub fn update(&self, key: EndpointKey, enabled: bool, description: Option<String>) {
        let mut entries = self.write();
        let record = entries.entry(key.clone()).or_insert_with(|| EndpointRecord {
            key,
            enabled,
            description: String::new(),
        });
        record.enabled = enabled;
        if let Some(description) = description {
            record.description = description;
        }
    }

    /// Snapshot of all records, ordered by key.
    pub fn list(&self) -> Vec<EndpointRecord> {
        self.read().values().cloned().collect()
    }

    /// Keys currently disabled.
    pub fn disabled_keys(&self) -> Vec<EndpointKey> {
        self.read()
            .values()
            .filter(|record| !record.enabled)
            .map(|record| record.key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Set `enabled` on every key that `pattern` matches from its first
    /// character. This is a prefix match: `^/api/v1/a` also hits
    /// `/api/v1/admin/...` and `/api/v1/auth/...`.
    ///
    /// The pattern is compiled before the lock is taken, so an invalid
    /// pattern leaves the registry untouched.
    pub fn bulk_update(&self, pattern: &str, enabled: bool) -> AdmissionResult<usize> {
        let regex = compile_from_start(pattern).map_err(|source| AdmissionError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let mut matched = 0;
        for record in self.write().values_mut() {
            if regex.is_match(record.key.as_str()) {
                record.enabled = enabled;
                matched += 1;
            }
        }

        info!(pattern, enabled, matched, "Bulk endpoint update applied");
        Ok(matched)
    }
}
