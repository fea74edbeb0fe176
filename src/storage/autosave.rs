//! Periodic auto-save.
//!
//! One tokio task per store. The task sleeps for the interval, asks the
//! producer for a snapshot and saves it if it changed, then sleeps again, so
//! a slow tick delays the next one instead of overlapping it. The task only
//! holds a weak reference: dropping the last `Arc` to the store ends it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::model::Snapshot;
use crate::storage::backend::BackingStore;
use crate::storage::events::StoreEvent;
use crate::storage::store::PersistenceStore;

impl<B: BackingStore + 'static> PersistenceStore<B> {
    /// Start saving `producer()` every `interval`.
    ///
    /// A timer that is already running is cancelled first, so at most one
    /// exists per store. The producer returning `None` skips that tick.
    ///
    /// # Errors
    ///
    /// - `Error::Runtime` when called outside a tokio runtime
    /// - `Error::InvalidArgument` for a zero interval
    pub fn start_auto_save<F>(self: &Arc<Self>, producer: F, interval: Duration) -> Result<()>
    where
        F: FnMut() -> Option<Snapshot> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(Error::InvalidArgument(
                "auto-save interval must be positive".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Runtime(format!("auto-save needs a tokio runtime: {e}")))?;

        let mut slot = self.auto_save.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            debug!("Cancelling previous auto-save timer");
            previous.abort();
        }

        let store = Arc::downgrade(self);
        *slot = Some(runtime.spawn(run_auto_save(store, producer, interval)));
        info!(interval_ms = interval.as_millis(), "Auto-save started");
        Ok(())
    }

    /// Cancel the auto-save timer. Returns `false` if none was running.
    pub fn stop_auto_save(&self) -> bool {
        let handle = self
            .auto_save
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => {
                handle.abort();
                info!("Auto-save stopped");
                true
            }
            None => false,
        }
    }

    /// Whether an auto-save timer is active.
    #[must_use]
    pub fn is_auto_saving(&self) -> bool {
        self.auto_save
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Run one auto-save tick with an already produced snapshot.
    ///
    /// Saves only if the snapshot differs from the last persisted one, then
    /// emits `autoSave` after `save`. Returns whether anything was written.
    ///
    /// # Errors
    ///
    /// Propagates the save failure (already reported to `error` listeners).
    pub fn auto_save_tick(&self, snapshot: Option<Snapshot>) -> Result<bool> {
        let Some(snapshot) = snapshot else {
            return Ok(false);
        };

        let mut outbox = Vec::new();
        let result = {
            let _guard = self.lock_writes();
            if !self.has_changes(&snapshot) {
                debug!("Auto-save tick: no changes");
                return Ok(false);
            }
            self.save_locked(&snapshot, &mut outbox)
        };
        self.flush(outbox);

        let envelope = result?;
        let data_size = envelope
            .payload
            .get("data")
            .and_then(Value::as_str)
            .map_or(0, str::len);
        self.emit(&StoreEvent::AutoSave {
            timestamp: Utc::now(),
            data_size,
        });
        Ok(true)
    }
}

async fn run_auto_save<B, F>(store: Weak<PersistenceStore<B>>, mut producer: F, interval: Duration)
where
    B: BackingStore + 'static,
    F: FnMut() -> Option<Snapshot> + Send + 'static,
{
    loop {
        tokio::time::sleep(interval).await;

        let Some(store) = store.upgrade() else {
            debug!("Store dropped, ending auto-save");
            return;
        };

        // Producing and committing happen with no await in between, so a
        // cancelled timer never leaves half a tick behind.
        let snapshot = match catch_unwind(AssertUnwindSafe(&mut producer)) {
            Ok(snapshot) => snapshot,
            Err(_) => {
                error!("Auto-save producer panicked; skipping tick");
                continue;
            }
        };

        if let Err(e) = store.auto_save_tick(snapshot) {
            warn!(error = %e, "Auto-save tick failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::storage::events::EventKind;
    use crate::storage::memory::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn snapshot(name: &str) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.personal.full_name = name.to_string();
        snapshot
    }

    fn shared_store() -> Arc<PersistenceStore<MemoryStore>> {
        Arc::new(PersistenceStore::new(
            MemoryStore::new(),
            StoreConfig::default(),
        ))
    }

    /// A producer that counts calls and returns a different name each time.
    fn counting_producer(calls: &Arc<AtomicUsize>) -> impl FnMut() -> Option<Snapshot> + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Some(snapshot(&format!("Ada {n}")))
        }
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let store = shared_store();
        let result = store.start_auto_save(|| None, Duration::from_secs(1));
        assert!(matches!(result, Err(Error::Runtime(_))));
        assert!(!store.is_auto_saving());
    }

    #[test]
    fn test_stop_without_timer_is_noop() {
        let store = shared_store();
        assert!(!store.stop_auto_save());
    }

    #[test]
    fn test_tick_unchanged_is_noop() {
        let store = shared_store();
        let saves = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&saves);
        store.subscribe(EventKind::Save, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(store.auto_save_tick(Some(snapshot("Ada"))).unwrap());
        assert!(!store.auto_save_tick(Some(snapshot("Ada"))).unwrap());
        assert!(!store.auto_save_tick(None).unwrap());
        assert_eq!(saves.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tick_emits_save_then_auto_save() {
        let store = shared_store();
        let order = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::Save, EventKind::AutoSave] {
            let order = Arc::clone(&order);
            store.subscribe(kind, move |event| order.lock().unwrap().push(event.kind()));
        }

        store.auto_save_tick(Some(snapshot("Ada"))).unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec![EventKind::Save, EventKind::AutoSave]
        );
    }

    #[test]
    fn test_tick_reports_external_change_before_overwriting() {
        use crate::storage::sqlite::SqliteStore;

        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("cv.db");
        let ours = PersistenceStore::new(SqliteStore::open(&path, "cv").unwrap(), StoreConfig::default());
        let theirs = PersistenceStore::new(SqliteStore::open(&path, "cv").unwrap(), StoreConfig::default());
        assert!(ours.auto_save_tick(Some(snapshot("Ada"))).unwrap());

        let order = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::ExternalChange, EventKind::Save, EventKind::AutoSave] {
            let order = Arc::clone(&order);
            ours.subscribe(kind, move |event| order.lock().unwrap().push(event.kind()));
        }
        theirs.save(&snapshot("Grace")).unwrap();

        assert!(ours.auto_save_tick(Some(snapshot("Ada"))).unwrap());
        assert!(!ours.poll_external_change().unwrap());
        assert_eq!(
            *order.lock().unwrap(),
            vec![EventKind::ExternalChange, EventKind::Save, EventKind::AutoSave]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_interval() {
        let store = shared_store();
        let calls = Arc::new(AtomicUsize::new(0));

        store
            .start_auto_save(counting_producer(&calls), Duration::from_millis(100))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(store.is_auto_saving());
        assert_eq!(store.load().unwrap().personal.full_name, "Ada 2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_cancels_previous_timer() {
        let store = shared_store();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        store
            .start_auto_save(counting_producer(&first), Duration::from_millis(100))
            .unwrap();
        store
            .start_auto_save(counting_producer(&second), Duration::from_millis(100))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_ticks() {
        let store = shared_store();
        let calls = Arc::new(AtomicUsize::new(0));

        store
            .start_auto_save(counting_producer(&calls), Duration::from_millis(100))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(store.stop_auto_save());
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!store.is_auto_saving());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_producer_keeps_timer_alive() {
        let store = shared_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        store
            .start_auto_save(
                move || {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("producer bug");
                    }
                    Some(snapshot("Ada"))
                },
                Duration::from_millis(100),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.load().is_some());
    }
}
