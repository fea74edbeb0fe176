//! The persistence store.
//!
//! Owns the on-device record format: one envelope under a fixed key inside
//! a size-bounded namespace. Failures are reported twice: as an `Err` to the
//! caller and as an [`StoreEvent::Error`] to listeners. `load` degrades to
//! `None` instead.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::model::{Envelope, Snapshot, SCHEMA_VERSION};
use crate::storage::backend::{entry_size, namespace_usage, BackingStore};
use crate::storage::events::{EventBus, EventKind, StoreEvent, Subscription};
use crate::storage::hash::{has_changed, snapshot_fingerprint};
use crate::storage::migrations::{decode_snapshot, migrate, Migration};

/// What [`PersistenceStore::load_detailed`] found under the fixed key.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Nothing is stored.
    Empty,

    /// A current-version record.
    Current {
        snapshot: Snapshot,
        saved_at: DateTime<Utc>,
    },

    /// An older record, upgraded in memory. The stored copy is unchanged
    /// until the next save.
    Migrated {
        snapshot: Snapshot,
        saved_at: DateTime<Utc>,
        from: String,
    },

    /// A record from a version with no migration path.
    Unmigrated {
        from: String,
        payload: Value,
        saved_at: DateTime<Utc>,
    },
}

impl LoadOutcome {
    /// The snapshot, if one could be produced.
    #[must_use]
    pub fn into_snapshot(self) -> Option<Snapshot> {
        match self {
            Self::Current { snapshot, .. } | Self::Migrated { snapshot, .. } => Some(snapshot),
            Self::Empty | Self::Unmigrated { .. } => None,
        }
    }
}

/// Storage statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    /// Bytes of the serialized snapshot (compacted).
    pub data_size: usize,
    pub last_saved: Option<DateTime<Utc>>,
    /// Schema version of the stored record.
    pub schema_version: Option<String>,
    /// Top-level fields of the stored snapshot.
    pub items_count: usize,
    /// Estimated bytes used by every entry in the namespace.
    pub total_storage_size: u64,
    pub storage_item_count: usize,
    pub available_storage: i64,
    /// Percentage of the budget in use, one decimal.
    pub storage_usage: f64,
}

#[derive(Debug, Default)]
struct Tracked {
    /// Fingerprint of the last snapshot written or read in current form.
    fingerprint: Option<String>,
    /// Backend change token observed alongside `fingerprint`.
    fingerprint_token: Option<u64>,
    /// What this store last knew to be at the fixed key. Reads may prime
    /// it; only this store's writes and `poll_external_change` move it.
    baseline: Baseline,
}

#[derive(Debug, Default)]
struct Baseline {
    raw: Option<String>,
    token: Option<u64>,
    primed: bool,
}

/// Versioned save/load/migrate/cleanup over a [`BackingStore`].
///
/// Shared through `Arc`; every method takes `&self`.
pub struct PersistenceStore<B: BackingStore> {
    backend: B,
    config: StoreConfig,
    events: EventBus,
    /// Serializes writers: manual saves, clears, cleanups, auto-save ticks.
    write_lock: Mutex<()>,
    tracked: Mutex<Tracked>,
    pub(super) auto_save: Mutex<Option<JoinHandle<()>>>,
}

impl<B: BackingStore> std::fmt::Debug for PersistenceStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceStore")
            .field("storage_key", &self.config.storage_key)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl<B: BackingStore> PersistenceStore<B> {
    /// Create a store over `backend`.
    #[must_use]
    pub fn new(backend: B, config: StoreConfig) -> Self {
        Self {
            backend,
            config,
            events: EventBus::new(),
            write_lock: Mutex::new(()),
            tracked: Mutex::new(Tracked::default()),
            auto_save: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Register a listener for one kind of event.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, listener)
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.events.unsubscribe(subscription)
    }

    // ── Save ──────────────────────────────────────────────────

    /// Persist a snapshot under the fixed key, replacing any prior record.
    ///
    /// If the namespace would exceed its budget, entries older than
    /// `compaction_max_age_days` are evicted first.
    ///
    /// # Errors
    ///
    /// - `Error::EmptySnapshot` if nothing in the snapshot is non-empty
    /// - `Error::QuotaExceeded` if the record does not fit even after compaction
    /// - `Error::StorageUnavailable` if the backend rejects the write
    pub fn save(&self, snapshot: &Snapshot) -> Result<Envelope> {
        let mut outbox = Vec::new();
        let result = {
            let _guard = self.lock_writes();
            self.save_locked(snapshot, &mut outbox)
        };
        self.flush(outbox);
        result
    }

    /// Save with the write lock already held.
    ///
    /// Events are queued in `outbox`; the caller emits them once the lock
    /// is released, so listeners may call back into the store.
    pub(super) fn save_locked(
        &self,
        snapshot: &Snapshot,
        outbox: &mut Vec<StoreEvent>,
    ) -> Result<Envelope> {
        match self.write_envelope(snapshot, outbox) {
            Ok(envelope) => {
                debug!(key = %self.config.storage_key, "Saved snapshot");
                outbox.push(StoreEvent::Save {
                    envelope: envelope.clone(),
                });
                Ok(envelope)
            }
            Err(Error::EmptySnapshot) => {
                warn!("Refusing to save an empty snapshot");
                Err(Error::EmptySnapshot)
            }
            Err(e) => {
                outbox.push(self.failure(&e));
                Err(e)
            }
        }
    }

    fn write_envelope(&self, snapshot: &Snapshot, outbox: &mut Vec<StoreEvent>) -> Result<Envelope> {
        let envelope = Envelope::seal(snapshot, Utc::now())?;
        let raw = envelope.to_json()?;
        let fingerprint = snapshot_fingerprint(snapshot)?;
        let key = self.config.storage_key.as_str();
        let budget = self.config.max_storage_bytes;

        self.note_external_change(outbox);

        let mut projected = self.projected_usage(key, &raw)?;
        if projected > budget {
            warn!(projected, budget, "Data size exceeds limit, performing cleanup");
            self.cleanup_inner(self.config.compaction_max_age_days, outbox)?;
            projected = self.projected_usage(key, &raw)?;
            if projected > budget {
                return Err(Error::QuotaExceeded {
                    needed: projected,
                    budget,
                });
            }
        }

        self.backend.set(key, &raw)?;

        let token = self.backend.change_token().ok().flatten();
        let mut tracked = self.lock_tracked();
        tracked.fingerprint = Some(fingerprint);
        tracked.fingerprint_token = token;
        tracked.baseline = Baseline {
            raw: Some(raw),
            token,
            primed: true,
        };
        Ok(envelope)
    }

    /// Namespace usage if `raw` replaced whatever is stored under `key`.
    fn projected_usage(&self, key: &str, raw: &str) -> Result<u64> {
        let mut total = entry_size(key, raw);
        for other in self.backend.keys()? {
            if other == key {
                continue;
            }
            if let Some(value) = self.backend.get(&other)? {
                total += entry_size(&other, &value);
            }
        }
        Ok(total)
    }

    // ── Load ──────────────────────────────────────────────────

    /// Load the stored snapshot.
    ///
    /// Returns `None` when nothing is stored, and also when the record is
    /// corrupt or from a version with no migration path; those cases emit
    /// exactly one `error` event.
    pub fn load(&self) -> Option<Snapshot> {
        match self.load_detailed() {
            Ok(LoadOutcome::Empty) => None,
            Ok(
                LoadOutcome::Current { snapshot, saved_at }
                | LoadOutcome::Migrated {
                    snapshot, saved_at, ..
                },
            ) => {
                self.events.emit(&StoreEvent::Load {
                    snapshot: snapshot.clone(),
                    saved_at,
                });
                Some(snapshot)
            }
            Ok(LoadOutcome::Unmigrated { from, .. }) => {
                self.report(&Error::IncompatibleVersion {
                    found: from,
                    supported: SCHEMA_VERSION.to_string(),
                });
                None
            }
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    /// Load and classify the stored record without emitting events.
    ///
    /// # Errors
    ///
    /// - `Error::StorageUnavailable` if the backend cannot be read
    /// - `Error::CorruptRecord` if the record does not parse
    pub fn load_detailed(&self) -> Result<LoadOutcome> {
        let key = self.config.storage_key.as_str();
        let raw = self.backend.get(key)?;
        let token = self.backend.change_token().ok().flatten();
        {
            let mut tracked = self.lock_tracked();
            tracked.fingerprint = None;
            tracked.fingerprint_token = token;
            if !tracked.baseline.primed {
                tracked.baseline = Baseline {
                    raw: raw.clone(),
                    token,
                    primed: true,
                };
            }
        }

        let Some(raw) = raw else {
            return Ok(LoadOutcome::Empty);
        };

        let corrupt = |reason: String| Error::CorruptRecord {
            key: key.to_string(),
            reason,
        };
        let envelope = Envelope::from_json(&raw).map_err(|e| corrupt(e.to_string()))?;
        let payload = envelope.unpack().map_err(|e| corrupt(e.to_string()))?;
        let saved_at = envelope.saved_at;

        if envelope.is_current() {
            let snapshot = decode_snapshot(payload).map_err(|e| corrupt(e.to_string()))?;
            self.lock_tracked().fingerprint = snapshot_fingerprint(&snapshot).ok();
            return Ok(LoadOutcome::Current { snapshot, saved_at });
        }

        // The stored record is in an older shape, so the fingerprint stays
        // unset and the next save rewrites it even if nothing changed.
        let from = envelope.schema_version;
        match migrate(payload, &from)? {
            Migration::Upgraded(snapshot) => {
                info!(from = %from, to = SCHEMA_VERSION, "Migrated stored record");
                Ok(LoadOutcome::Migrated {
                    snapshot,
                    saved_at,
                    from,
                })
            }
            Migration::NoPath { from, payload } => Ok(LoadOutcome::Unmigrated {
                from,
                payload,
                saved_at,
            }),
        }
    }

    /// The raw string stored under the fixed key.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` if the backend cannot be read.
    pub fn raw_record(&self) -> Result<Option<String>> {
        self.backend.get(&self.config.storage_key)
    }

    // ── Clear ─────────────────────────────────────────────────

    /// Remove the stored record. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` if the backend cannot be written.
    pub fn clear(&self) -> Result<()> {
        let mut outbox = Vec::new();
        let result = {
            let _guard = self.lock_writes();
            self.clear_locked(&mut outbox)
        };
        self.flush(outbox);
        result
    }

    fn clear_locked(&self, outbox: &mut Vec<StoreEvent>) -> Result<()> {
        self.note_external_change(outbox);
        if let Err(e) = self.backend.remove(&self.config.storage_key) {
            outbox.push(self.failure(&e));
            return Err(e);
        }

        let token = self.backend.change_token().ok().flatten();
        {
            let mut tracked = self.lock_tracked();
            tracked.fingerprint = None;
            tracked.fingerprint_token = token;
            tracked.baseline = Baseline {
                raw: None,
                token,
                primed: true,
            };
        }
        info!(key = %self.config.storage_key, "Cleared stored record");
        outbox.push(StoreEvent::Clear);
        Ok(())
    }

    // ── Cleanup ───────────────────────────────────────────────

    /// Evict stale entries from the namespace.
    ///
    /// Removes every entry, other than the fixed key, whose value is JSON
    /// with a `timestamp` older than `max_age_days`, plus unparseable values
    /// under transient keys. Emits `cleanup` when anything was removed.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` if the backend cannot be scanned.
    pub fn cleanup_old_data(&self, max_age_days: u32) -> Result<usize> {
        let mut outbox = Vec::new();
        let result = {
            let _guard = self.lock_writes();
            self.cleanup_inner(max_age_days, &mut outbox)
        };
        if let Err(e) = &result {
            outbox.push(self.failure(e));
        }
        self.flush(outbox);
        result
    }

    fn cleanup_inner(&self, max_age_days: u32, outbox: &mut Vec<StoreEvent>) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(i64::from(max_age_days));
        let mut removed = 0;

        for key in self.backend.keys()? {
            if key == self.config.storage_key {
                continue;
            }
            let Some(value) = self.backend.get(&key)? else {
                continue;
            };

            let evict = match serde_json::from_str::<Value>(&value) {
                Ok(parsed) => record_timestamp(&parsed).is_some_and(|ts| ts < cutoff),
                Err(_) => self.config.is_transient_key(&key),
            };
            if evict {
                debug!(key = %key, "Evicting stale entry");
                self.backend.remove(&key)?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, max_age_days, "Cleaned up old entries");
            outbox.push(StoreEvent::Cleanup { removed });
        }
        Ok(removed)
    }

    // ── Change detection ──────────────────────────────────────

    /// Whether `snapshot` differs from the last persisted one.
    ///
    /// Uses the cached fingerprint when storage has not changed underneath
    /// this store, and reads the stored record otherwise. Any failure
    /// counts as a change.
    pub fn has_changes(&self, snapshot: &Snapshot) -> bool {
        let Ok(current) = snapshot_fingerprint(snapshot) else {
            return true;
        };

        let token = self.backend.change_token().ok().flatten();
        let cached = {
            let tracked = self.lock_tracked();
            if tracked.fingerprint_token == token {
                tracked.fingerprint.clone()
            } else {
                None
            }
        };

        let stored = cached.or_else(|| match self.load_detailed() {
            Ok(LoadOutcome::Current { snapshot, .. }) => snapshot_fingerprint(&snapshot).ok(),
            _ => None,
        });

        has_changed(&current, stored.as_deref())
    }

    /// Check whether another execution context changed the fixed key.
    ///
    /// Emits `externalChange` with the previous and new raw values and
    /// returns `true` if so. The first call only records a baseline.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` if the backend cannot be read.
    pub fn poll_external_change(&self) -> Result<bool> {
        let event = {
            let _guard = self.lock_writes();
            let token = self.backend.change_token()?;
            {
                let tracked = self.lock_tracked();
                let baseline = &tracked.baseline;
                if baseline.primed && token.is_some() && baseline.token == token {
                    return Ok(false);
                }
            }
            let current = self.backend.get(&self.config.storage_key)?;
            self.advance_baseline(token, current)
        };

        match event {
            Some(event) => {
                self.events.emit(&event);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Queue `externalChange` if another context wrote the fixed key since
    /// the baseline. Called before this store overwrites it.
    fn note_external_change(&self, outbox: &mut Vec<StoreEvent>) {
        let Ok(token) = self.backend.change_token() else {
            return;
        };
        {
            let tracked = self.lock_tracked();
            let baseline = &tracked.baseline;
            if !baseline.primed || (token.is_some() && baseline.token == token) {
                return;
            }
        }
        if let Ok(current) = self.backend.get(&self.config.storage_key) {
            outbox.extend(self.advance_baseline(token, current));
        }
    }

    /// Move the baseline to `current`, returning the change event if it
    /// differs from what the baseline held. An unprimed baseline is only
    /// recorded.
    fn advance_baseline(&self, token: Option<u64>, current: Option<String>) -> Option<StoreEvent> {
        let mut tracked = self.lock_tracked();
        let baseline = &mut tracked.baseline;
        baseline.token = token;
        if !baseline.primed {
            baseline.raw = current;
            baseline.primed = true;
            return None;
        }
        if baseline.raw == current {
            return None;
        }
        let old_value = std::mem::replace(&mut baseline.raw, current.clone());
        tracked.fingerprint = None;

        info!(key = %self.config.storage_key, "Stored record changed externally");
        Some(StoreEvent::ExternalChange {
            old_value,
            new_value: current,
        })
    }

    // ── Statistics ────────────────────────────────────────────

    /// Bytes left in the namespace budget. Negative when over budget.
    ///
    /// Reports the whole budget if the backend cannot be read.
    pub fn available_space(&self) -> i64 {
        let budget = i64::try_from(self.config.max_storage_bytes).unwrap_or(i64::MAX);
        namespace_usage(&self.backend).map_or(budget, |used| {
            budget.saturating_sub(i64::try_from(used).unwrap_or(i64::MAX))
        })
    }

    /// Summarize the stored record and namespace usage.
    ///
    /// An unreadable record is reported as absent rather than failing.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` if the namespace cannot be listed.
    pub fn stats(&self) -> Result<StorageStats> {
        let (snapshot, saved_at, version) = match self.load_detailed() {
            Ok(LoadOutcome::Current { snapshot, saved_at }) => {
                (Some(snapshot), Some(saved_at), Some(SCHEMA_VERSION.to_string()))
            }
            Ok(LoadOutcome::Migrated {
                snapshot,
                saved_at,
                from,
            }) => (Some(snapshot), Some(saved_at), Some(from)),
            Ok(LoadOutcome::Unmigrated { from, saved_at, .. }) => (None, Some(saved_at), Some(from)),
            Ok(LoadOutcome::Empty) => (None, None, None),
            Err(e) => {
                warn!(error = %e, "Stored record unreadable while collecting stats");
                (None, None, None)
            }
        };

        let keys = self.backend.keys()?;
        let total = namespace_usage(&self.backend)?;
        let budget = self.config.max_storage_bytes;

        let data_size = snapshot
            .as_ref()
            .and_then(|s| serde_json::to_value(s).ok())
            .map(crate::model::compact)
            .and_then(|v| serde_json::to_string(&v).ok())
            .map_or(0, |s| s.len());

        #[allow(clippy::cast_precision_loss)]
        let usage = if budget == 0 {
            0.0
        } else {
            (total as f64 / budget as f64 * 1000.0).round() / 10.0
        };

        Ok(StorageStats {
            data_size,
            last_saved: saved_at,
            schema_version: version,
            items_count: snapshot.as_ref().map_or(0, Snapshot::field_count),
            total_storage_size: total,
            storage_item_count: keys.len(),
            available_storage: i64::try_from(budget)
                .unwrap_or(i64::MAX)
                .saturating_sub(i64::try_from(total).unwrap_or(i64::MAX)),
            storage_usage: usage,
        })
    }

    // ── Internals ─────────────────────────────────────────────

    /// Log an error and emit it to `error` listeners.
    fn report(&self, err: &Error) {
        let event = self.failure(err);
        self.events.emit(&event);
    }

    /// Log an error and build its `error` event.
    fn failure(&self, err: &Error) -> StoreEvent {
        let code = err.error_code();
        error!(key = %self.config.storage_key, code = code.as_str(), error = %err, "Store operation failed");
        StoreEvent::Error {
            code,
            message: err.to_string(),
        }
    }

    pub(super) fn emit(&self, event: &StoreEvent) {
        self.events.emit(event);
    }

    /// Emit events queued while the write lock was held.
    pub(super) fn flush(&self, outbox: Vec<StoreEvent>) {
        for event in &outbox {
            self.events.emit(event);
        }
    }

    pub(super) fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tracked(&self) -> MutexGuard<'_, Tracked> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: BackingStore> Drop for PersistenceStore<B> {
    fn drop(&mut self) {
        let slot = self
            .auto_save
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

/// The `timestamp` of an envelope-shaped JSON value.
fn record_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.get("timestamp")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
