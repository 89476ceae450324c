//! Engine failure taxonomy.
//!
//! Every engine-facing operation fails with an [`EngineError`] carrying one
//! of four kinds, which the sequencer matches exhaustively:
//!
//! - `Critical`: unrecoverable process-level fault, propagated to the
//!   caller.
//! - `Reset`: chain-ancestry or engine-state inconsistency; sequencing must
//!   not continue until the engine has resynchronized.
//! - `Temporary`: expected transient condition, safe to retry after a
//!   short backoff.
//! - `Other`: unrecognized failure mode, not trusted to self-resolve.

use thiserror::Error;

/// Discriminant of [`EngineError`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EngineErrorKind {
    Critical,
    Reset,
    Temporary,
    Other,
}

/// A classified engine failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("critical engine failure: {0}")]
    Critical(anyhow::Error),

    #[error("engine requires reset: {0}")]
    Reset(anyhow::Error),

    #[error("temporary engine failure: {0}")]
    Temporary(anyhow::Error),

    #[error("unclassified engine failure: {0}")]
    Other(anyhow::Error),
}

impl EngineError {
    pub fn critical(err: impl Into<anyhow::Error>) -> Self {
        Self::Critical(err.into())
    }

    pub fn reset(err: impl Into<anyhow::Error>) -> Self {
        Self::Reset(err.into())
    }

    pub fn temporary(err: impl Into<anyhow::Error>) -> Self {
        Self::Temporary(err.into())
    }

    pub fn other(err: impl Into<anyhow::Error>) -> Self {
        Self::Other(err.into())
    }

    pub fn kind(&self) -> EngineErrorKind {
        match self {
            Self::Critical(_) => EngineErrorKind::Critical,
            Self::Reset(_) => EngineErrorKind::Reset,
            Self::Temporary(_) => EngineErrorKind::Temporary,
            Self::Other(_) => EngineErrorKind::Other,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
