//! Unified error types for the bakeplan workspace.
//!
//! This module provides a common error type [`PlanError`] that can represent
//! errors from any part of the system. Domain-specific error types are
//! converted to `PlanError` for uniform handling at API boundaries.

use thiserror::Error;

/// Unified error type for all planning operations.
#[derive(Error, Debug)]
pub enum PlanError {
    /// I/O errors (scratch directory, model dumps)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad input configuration (unknown ids, missing calendar days, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input passed structural checks but violates a planning rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network structure errors (dangling routes, unreachable demand)
    #[error("Network error: {0}")]
    Network(String),

    /// Solver backend errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// A post-solve or post-allocation invariant did not hold
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// The solve was cancelled before completion
    #[error("Cancelled by user")]
    Cancelled,

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using PlanError.
pub type PlanResult<T> = Result<T, PlanError>;

impl From<anyhow::Error> for PlanError {
    fn from(err: anyhow::Error) -> Self {
        PlanError::Other(err.to_string())
    }
}

impl From<String> for PlanError {
    fn from(s: String) -> Self {
        PlanError::Other(s)
    }
}

impl From<&str> for PlanError {
    fn from(s: &str) -> Self {
        PlanError::Other(s.to_string())
    }
}
