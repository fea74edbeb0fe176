//! Storage layer for cvstore.
//!
//! A [`PersistenceStore`] keeps one versioned envelope under a fixed key of a
//! [`BackingStore`], a synchronous quota-bounded key-value namespace.
//!
//! # Submodules
//!
//! - [`backend`] - The backing store trait and size estimation
//! - [`memory`] - In-process backing store
//! - [`sqlite`] - SQLite backing store
//! - [`schema`] - SQLite schema
//! - [`events`] - Store notifications
//! - [`migrations`] - Payload migrations between schema versions
//! - [`hash`] - Fingerprints for change detection
//! - [`store`] - The persistence store itself
//! - [`autosave`] - Periodic auto-save task

pub mod autosave;
pub mod backend;
pub mod events;
pub mod hash;
pub mod memory;
pub mod migrations;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use backend::BackingStore;
pub use events::{EventBus, EventKind, StoreEvent, Subscription};
pub use memory::MemoryStore;
pub use migrations::{migrate, Migration};
pub use sqlite::SqliteStore;
pub use store::{LoadOutcome, PersistenceStore, StorageStats};
