//! Error taxonomy shared by the artifact pass and the recompute engine.
use thiserror::Error;

use crate::cache::Target;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("invalid interpolation window [{x1}, {x2}] for a signal of {len} samples")]
    InvalidWindow { x1: isize, x2: isize, len: usize },

    #[error("not enough samples around gap [{x1}, {x2}] (need {required} on each side, signal has {len})")]
    InsufficientBoundary {
        x1: isize,
        x2: isize,
        len: usize,
        required: usize,
    },

    #[error("window at {second} overlaps the window at {first}")]
    OverlappingWindows { first: isize, second: isize },

    #[error("channel {channel}, onset {onset}: {source}")]
    AtChannel {
        channel: usize,
        onset: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("reference signal has zero energy")]
    DivisionByZero,

    #[error("component {index} out of range (decomposition has {n_components})")]
    ComponentOutOfRange { index: usize, n_components: usize },

    #[error("a recompute for {0:?} is already in flight")]
    RecomputePending(Target),

    #[error("recompute engine has stopped")]
    EngineStopped,

    #[error("failed to start recompute worker: {0}")]
    WorkerSpawn(String),

    #[error("decomposition failed: {0}")]
    Decomposition(String),

    #[error("reconstruction panicked: {0}")]
    Panicked(String),

    #[error("recompute failed: {0}")]
    RecomputeFailed(#[source] Box<Error>),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Innermost cause, looking through `AtChannel` and `RecomputeFailed`.
    pub fn root(&self) -> &Error {
        match self {
            Error::AtChannel { source, .. } | Error::RecomputeFailed(source) => source.root(),
            other => other,
        }
    }

    pub(crate) fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Error::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_looks_through_wrappers() {
        let inner = Error::InsufficientBoundary {
            x1: 1,
            x2: 13,
            len: 500,
            required: 2,
        };
        let wrapped = Error::RecomputeFailed(Box::new(Error::AtChannel {
            channel: 3,
            onset: 3,
            source: Box::new(inner.clone()),
        }));
        assert_eq!(wrapped.root(), &inner);
        assert!(wrapped.to_string().contains("channel 3, onset 3"));
    }

    #[test]
    fn worker_spawn_is_its_own_root() {
        let err = Error::WorkerSpawn("resource temporarily unavailable".into());
        assert_eq!(err.root(), &err);
        assert_eq!(
            err.to_string(),
            "failed to start recompute worker: resource temporarily unavailable"
        );
    }
}
