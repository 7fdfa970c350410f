//! Errors surfaced by list construction and per-cgroup allocation.

use std::collections::TryReserveError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LruError {
    #[error("out of memory")]
    NoMemory,
    #[error("a list needs at least one node")]
    InvalidNodeCount,
}

impl From<TryReserveError> for LruError {
    fn from(_: TryReserveError) -> Self {
        LruError::NoMemory
    }
}
