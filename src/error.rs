// src/error.rs

use std::error::Error;
use std::path::PathBuf;
use thiserror::Error;

/// A thread-safe wrapper for standard dynamic errors,
/// so they implement `Send` and `Sync`.
pub type ThreadSafeStdError = Box<dyn Error + Send + Sync + 'static>;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, BasisError>;

/// Errors produced while fitting, applying, persisting or validating a basis.
#[derive(Error, Debug)]
pub enum BasisError {
    /// Unknown factorization method or matrices whose inner dimensions do not agree.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The data source ran dry before the training/test buffers were filled.
    #[error("Insufficient data: needed {needed} samples but the source yielded only {available}")]
    InsufficientData { needed: usize, available: usize },

    /// Reading or writing a basis, singular values or statistics record failed.
    #[error("Storage error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: ThreadSafeStdError,
    },

    /// A LAPACK routine (QR or SVD) reported failure.
    #[error("Linear algebra failure: {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),

    /// Error raised by the external waveform source while probing or iterating.
    #[error("Waveform source failed: {0}")]
    Source(#[source] ThreadSafeStdError),

    /// The basis holds no matrices yet.
    #[error("SVD basis is empty. Fit or load a basis first.")]
    Unfitted,
}

impl BasisError {
    pub(crate) fn storage<E>(path: impl Into<PathBuf>, source: E) -> Self
    where
        E: Into<ThreadSafeStdError>,
    {
        BasisError::Storage {
            path: path.into(),
            source: source.into(),
        }
    }
}
