//! Data models for cvstore.
//!
//! - [`Snapshot`] and its entries: the form state handed over by the wizard
//! - [`Envelope`]: the versioned record actually written to storage

pub mod envelope;
pub mod snapshot;

pub use envelope::{compact, Envelope, SCHEMA_VERSION};
pub use snapshot::{
    EducationEntry, EntryId, EntryIdAllocator, ExperienceEntry, PersonalInfo, Snapshot,
};
