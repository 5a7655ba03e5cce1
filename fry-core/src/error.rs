//! Errors raised by reactive bodies and by write propagation.

use std::fmt;

use thiserror::Error;

use crate::reactive::{SinkKind, SourceId, SubscriberId};

/// Boxed error returned by fallible effect and computed bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Everything that can go wrong while running the reactive graph.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// One or more subscribers failed while a write propagated.
    ///
    /// Every subscriber was still attempted.
    #[error(transparent)]
    Propagation(#[from] PropagationFailure),

    /// An effect or computed body returned an error.
    #[error("reactive body failed: {0}")]
    Body(#[source] BoxError),

    /// An effect or computed body panicked.
    #[error("reactive body panicked: {0}")]
    Panicked(String),
}

impl ReactiveError {
    /// The per-subscriber failures when this is a propagation failure.
    pub fn failures(&self) -> &[SinkFailure] {
        match self {
            ReactiveError::Propagation(failure) => &failure.failures,
            _ => &[],
        }
    }
}

/// Aggregate of the subscriber failures of one write, in fan-out order.
#[derive(Debug, Error)]
pub struct PropagationFailure {
    /// The source whose change was being propagated.
    pub origin: SourceId,
    pub failures: Vec<SinkFailure>,
}

impl fmt::Display for PropagationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} subscriber(s) of {} failed:",
            self.failures.len(),
            self.origin
        )?;
        for failure in &self.failures {
            write!(f, " [{} {}: {}]", failure.kind, failure.sink, failure.error)?;
        }
        Ok(())
    }
}

/// A single subscriber that failed during propagation.
#[derive(Debug)]
pub struct SinkFailure {
    pub sink: SubscriberId,
    pub kind: SinkKind,
    pub error: ReactiveError,
}
