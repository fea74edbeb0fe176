//! cvstore - versioned local persistence for the CV Builder
//!
//! This crate provides the storage layer behind the résumé wizard and the
//! `cvstore` maintenance CLI.
//!
//! # Architecture
//!
//! - [`model`] - Snapshot, entries, and the persisted envelope
//! - [`storage`] - Backing stores, the persistence store, migrations, auto-save
//! - [`transfer`] - Export, import, backup and restore
//! - [`validate`] - Field validation for snapshots
//! - [`config`] - Configuration management
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod transfer;
pub mod validate;

pub use error::{Error, Result};
