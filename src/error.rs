//! Crate-wide error taxonomy.
//!
//! Mirrors the kinds laid out in the specification's error-handling design:
//! validation, corruption, load, writer, migration, aborted, and invariant
//! failures. Every variant carries enough structured context to populate a
//! `tracing` event field-for-field rather than only a formatted message.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::error;

use crate::model::Oid;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EventgraphError>;

/// Top-level error taxonomy for the engine.
#[derive(Debug, Error)]
pub enum EventgraphError {
    /// A shard, envelope, patch, or limit failed validation.
    #[error("validation failed: {message}")]
    Validation {
        /// Human-readable description of what failed.
        message: String,
        /// Path of the object under validation, if any.
        path: Option<String>,
        /// Object hash involved, if any.
        oid: Option<Oid>,
    },
    /// Data read back from storage could not be parsed or reconstructed.
    #[error("corruption detected at {path}: {reason}")]
    Corruption {
        /// Path of the corrupted object.
        path: String,
        /// Object hash involved, if any.
        oid: Option<Oid>,
        /// Description of the corruption.
        reason: String,
    },
    /// The storage layer rejected a read or write. Always fatal.
    #[error("storage load failed: {0}")]
    Load(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// A writer-session error (empty patch, CAS race, persist failure).
    #[error("writer error: {0}")]
    Writer(#[from] WriterError),
    /// The graph's history contains schema-1 patches with no migration
    /// checkpoint; migration is out of scope for this engine.
    #[error("migration required: {0}")]
    Migration(String),
    /// Cooperative cancellation via an abort signal.
    #[error("operation aborted")]
    Aborted,
    /// An invariant the engine relies on does not hold.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Errors specific to the writer (patch-append) path.
#[derive(Debug, Error)]
pub enum WriterError {
    /// A patch was submitted with an empty `ops` list.
    #[error("patch has no ops")]
    EmptyPatch,
    /// The writer's ref advanced between session open and commit.
    #[error("writer ref advanced since session open")]
    WriterRefAdvanced,
    /// The patch object or ref update failed to persist.
    #[error("failed to persist patch: {0}")]
    PersistWriteFailed(String),
}

impl EventgraphError {
    /// Builds a [`EventgraphError::Validation`] with no path/oid context.
    pub fn validation(message: impl Into<String>) -> Self {
        EventgraphError::Validation {
            message: message.into(),
            path: None,
            oid: None,
        }
    }

    /// Builds a [`EventgraphError::Validation`] with path context.
    pub fn validation_at(message: impl Into<String>, path: impl Into<String>) -> Self {
        EventgraphError::Validation {
            message: message.into(),
            path: Some(path.into()),
            oid: None,
        }
    }

    /// Builds a [`EventgraphError::Corruption`] for the given path.
    pub fn corruption(path: impl Into<String>, reason: impl Into<String>) -> Self {
        EventgraphError::Corruption {
            path: path.into(),
            oid: None,
            reason: reason.into(),
        }
    }

    /// Wraps an arbitrary storage-layer error as a fatal load failure.
    pub fn load(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        EventgraphError::Load(Box::new(err))
    }

    /// True for error kinds that must never be swallowed by lenient-mode
    /// policies (load and writer failures).
    pub fn always_fatal(&self) -> bool {
        matches!(self, EventgraphError::Load(_) | EventgraphError::Writer(_))
    }
}

/// A minimal string-backed error used where wrapping a concrete type would
/// pull in a dependency the engine otherwise has no use for.
#[derive(Debug)]
pub struct StringError(pub String);

impl fmt::Display for StringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for StringError {}

/// Locks `mutex`, converting poison errors into a fatal [`EventgraphError::Corruption`].
///
/// A poisoned lock means a prior holder panicked mid-mutation; the engine
/// treats that as unrecoverable rather than risk observing torn state.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| {
        error!("engine lock poisoned - fatal error");
        EventgraphError::corruption("<lock>", "engine lock poisoned - fatal error")
    })
}
