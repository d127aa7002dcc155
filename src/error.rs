//! Error types for leader election.
//!
//! Store failures are absorbed by the election loop and never end a run;
//! only configuration errors reach the caller.

use thiserror::Error;

/// Errors returned by a [`LeaseStore`](crate::lease::LeaseStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The record changed since it was read, or already exists on create.
    #[error("lease '{name}' was modified concurrently")]
    Conflict {
        /// Name of the contested lease.
        name: String,
    },

    /// The backend could not be reached or rejected the request.
    #[error("lease store unavailable: {0}")]
    Unavailable(String),

    /// A stored item could not be decoded into a lease record.
    #[error("malformed lease record: {0}")]
    Malformed(String),
}

impl StoreError {
    /// Creates a `Conflict` error.
    pub fn conflict(name: impl Into<String>) -> Self {
        Self::Conflict { name: name.into() }
    }

    /// Creates an `Unavailable` error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Creates a `Malformed` error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Returns `true` for optimistic-concurrency conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Errors reported to the caller before the election loop starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElectionError {
    /// The configuration violates a timing or identity constraint.
    #[error("invalid election config: {0}")]
    ConfigInvalid(String),
}

impl ElectionError {
    /// Creates a `ConfigInvalid` error.
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid(message.into())
    }
}
