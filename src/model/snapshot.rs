//! Snapshot model for the CV form.
//!
//! A [`Snapshot`] is the complete serializable state of the wizard at one
//! point in time. It is built fresh for every save and never mutated once
//! persisted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;

/// Stable identifier of an education or experience entry.
///
/// Ids are positive, unique within their collection, and never reused
/// after removal (see [`EntryIdAllocator`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(NonZeroU32);

impl EntryId {
    /// Build an id from a raw integer. Returns `None` for zero.
    #[must_use]
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// The raw integer value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out entry ids for one collection.
///
/// The counter only moves forward: removing the entry with the highest id
/// does not make that id available again.
#[derive(Debug, Clone)]
pub struct EntryIdAllocator {
    next: u32,
}

impl Default for EntryIdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl EntryIdAllocator {
    /// Start a fresh allocator (first id is 1).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start past every id already in use.
    #[must_use]
    pub fn seeded<I: IntoIterator<Item = EntryId>>(ids: I) -> Self {
        let max = ids.into_iter().map(EntryId::get).max().unwrap_or(0);
        Self {
            next: max.checked_add(1).unwrap_or(0),
        }
    }

    /// Allocate the next id, or `None` once the id space is exhausted.
    pub fn allocate(&mut self) -> Option<EntryId> {
        let id = EntryId::new(self.next)?;
        // u32::MAX is handed out once; the counter then parks on zero.
        self.next = self.next.checked_add(1).unwrap_or(0);
        Some(id)
    }
}

/// Personal information block of the form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub full_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phone: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub linkedin: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub portfolio: String,
}

/// One education entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationEntry {
    pub id: EntryId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub degree: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub institution: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub year: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub grade: String,
}

impl EducationEntry {
    /// An empty entry carrying only its id.
    #[must_use]
    pub fn new(id: EntryId) -> Self {
        Self {
            id,
            degree: String::new(),
            institution: String::new(),
            year: String::new(),
            grade: String::new(),
        }
    }
}

/// One work experience entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceEntry {
    pub id: EntryId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub company: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub start_date: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub end_date: String,
    #[serde(default)]
    pub current: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ExperienceEntry {
    /// An empty entry carrying only its id.
    #[must_use]
    pub fn new(id: EntryId) -> Self {
        Self {
            id,
            title: String::new(),
            company: String::new(),
            start_date: String::new(),
            end_date: String::new(),
            current: false,
            description: String::new(),
        }
    }
}

/// The complete serializable state of the CV form.
///
/// Wire names are camelCase (`fullName`, `profilePic`, `currentStep`).
/// Top-level fields this version does not know about are kept in
/// [`Snapshot::extra`] so they survive a load/save cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(flatten)]
    pub personal: PersonalInfo,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub education: Vec<EducationEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub experience: Vec<ExperienceEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,

    /// Embedded profile image as a data URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,

    /// Wizard step the user was on (1-based).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Snapshot {
    /// Add a skill unless an equal one (case-insensitive, trimmed) exists.
    ///
    /// Returns `true` if the skill was added.
    pub fn add_skill(&mut self, skill: &str) -> bool {
        let skill = skill.trim();
        if skill.is_empty()
            || self
                .skills
                .iter()
                .any(|s| s.trim().eq_ignore_ascii_case(skill))
        {
            return false;
        }
        self.skills.push(skill.to_string());
        true
    }

    /// Number of top-level fields that would be persisted.
    #[must_use]
    pub fn field_count(&self) -> usize {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_object().map(serde_json::Map::len))
            .unwrap_or(0)
    }
}
