//! Error types shared by the state wrappers, the registry and the bindings.

use thiserror::Error;

use crate::reactive::ConsumerId;
use crate::state::Key;

/// Result alias used throughout the crate.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors raised by store operations.
///
/// The first two variants are internal-consistency failures: the registry and
/// the callback map disagree about which consumers exist. They are never
/// recoverable and are surfaced to whichever write or teardown observed them.
/// The rest are usage errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("consumer {0} is registered as a reader but has no callback")]
    MissingCallback(ConsumerId),

    #[error("consumer {0} has no cleanup index")]
    MissingCleanupIndex(ConsumerId),

    #[error("consumer {0} has been destroyed")]
    Revoked(ConsumerId),

    #[error("invalid array length: {0}")]
    InvalidLength(f64),

    #[error("array index {0} is too far past the end of the array")]
    InvalidIndex(usize),

    #[error("property `{0}` is read-only")]
    ReadOnly(Key),

    #[error("property `{0}` is not callable")]
    NotCallable(Key),

    #[error("store root must be an object or array")]
    InvalidRoot,

    #[error("binding already has an active subscription")]
    AlreadySubscribed,
}

impl StoreError {
    /// Whether this error means the registry desynchronized from the
    /// callback map, as opposed to a caller misusing the API.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            StoreError::MissingCallback(_) | StoreError::MissingCleanupIndex(_)
        )
    }
}
