//! Error types for cvstore.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=storage, 3=record, 4=validation, etc.)
//! - Retryability flags
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use thiserror::Error;

/// Result type alias for cvstore operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Listeners and scripts match on the string; shells on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Storage (exit 2)
    StorageUnavailable,
    QuotaExceeded,
    DatabaseError,

    // Stored record (exit 3)
    CorruptRecord,
    IncompatibleVersion,
    NoData,

    // Validation (exit 4)
    EmptySnapshot,
    InvalidImportFile,
    UnsupportedFormat,
    InvalidArgument,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    RuntimeError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::StorageUnavailable => "STORAGE_UNAVAILABLE",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::CorruptRecord => "CORRUPT_RECORD",
            Self::IncompatibleVersion => "INCOMPATIBLE_VERSION",
            Self::NoData => "NO_DATA",
            Self::EmptySnapshot => "EMPTY_SNAPSHOT",
            Self::InvalidImportFile => "INVALID_IMPORT_FILE",
            Self::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::RuntimeError => "RUNTIME_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::RuntimeError => 1,
            Self::StorageUnavailable | Self::QuotaExceeded | Self::DatabaseError => 2,
            Self::CorruptRecord | Self::IncompatibleVersion | Self::NoData => 3,
            Self::EmptySnapshot
            | Self::InvalidImportFile
            | Self::UnsupportedFormat
            | Self::InvalidArgument => 4,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether retrying with corrected input can succeed.
    ///
    /// True for validation errors and for quota pressure (the caller can
    /// shrink the snapshot, e.g. drop the embedded image).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmptySnapshot
                | Self::InvalidImportFile
                | Self::UnsupportedFormat
                | Self::InvalidArgument
                | Self::QuotaExceeded
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in cvstore operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage quota exceeded: {needed} bytes needed, budget is {budget} bytes")]
    QuotaExceeded { needed: u64, budget: u64 },

    #[error("Corrupt record under '{key}': {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("Incompatible schema version {found} (supported: {supported})")]
    IncompatibleVersion { found: String, supported: String },

    #[error("Invalid import file: {0}")]
    InvalidImportFile(String),

    #[error("Refusing to save an empty snapshot")]
    EmptySnapshot,

    #[error("No data to export")]
    NoData,

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
            Self::QuotaExceeded { .. } => ErrorCode::QuotaExceeded,
            Self::CorruptRecord { .. } => ErrorCode::CorruptRecord,
            Self::IncompatibleVersion { .. } => ErrorCode::IncompatibleVersion,
            Self::InvalidImportFile(_) => ErrorCode::InvalidImportFile,
            Self::EmptySnapshot => ErrorCode::EmptySnapshot,
            Self::NoData => ErrorCode::NoData,
            Self::UnsupportedFormat(_) => ErrorCode::UnsupportedFormat,
            Self::Runtime(_) => ErrorCode::RuntimeError,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::StorageUnavailable(_) => Some(
                "Check that the database file is writable, or pass another location with --db"
                    .to_string(),
            ),
            Self::QuotaExceeded { .. } => Some(
                "Remove stale entries with `cvstore cleanup --max-age-days 0`, \
                 or drop the embedded profile picture"
                    .to_string(),
            ),
            Self::CorruptRecord { .. } => Some(
                "The stored draft cannot be read. Restore a backup with `cvstore restore <file>` \
                 or start over with `cvstore clear`"
                    .to_string(),
            ),
            Self::IncompatibleVersion { found, .. } => Some(format!(
                "No migration is registered for version {found}. Export the raw record before clearing it."
            )),
            Self::NoData => Some("Nothing has been saved yet. Use `cvstore save <file>` first.".to_string()),
            Self::UnsupportedFormat(_) => Some("Supported formats: json, txt".to_string()),
            Self::EmptySnapshot => {
                Some("The snapshot has no non-empty fields; nothing was written".to_string())
            }
            Self::InvalidImportFile(_)
            | Self::Runtime(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_exit_codes() {
        assert_eq!(Error::StorageUnavailable("x".into()).exit_code(), 2);
        assert_eq!(
            Error::QuotaExceeded {
                needed: 10,
                budget: 5
            }
            .exit_code(),
            2
        );
        assert_eq!(
            Error::CorruptRecord {
                key: "k".into(),
                reason: "bad".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(Error::InvalidImportFile("x".into()).exit_code(), 4);
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::NoData;
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "NO_DATA");
        assert_eq!(json["error"]["retryable"], false);
        assert!(json["error"]["hint"].is_string());
    }

    #[test]
    fn test_quota_is_retryable() {
        assert!(ErrorCode::QuotaExceeded.is_retryable());
        assert!(!ErrorCode::CorruptRecord.is_retryable());
    }
}
