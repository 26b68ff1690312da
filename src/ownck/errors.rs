use thiserror::Error;

use crate::diag::{Span, SpannedError};

/// Ownership diagnostics. All are compile-time and fatal for the analyzed
/// unit; the checker keeps going past each one to surface further
/// independent diagnostics within the same body.
#[derive(Debug, Clone, Error)]
pub enum OwnErrorKind {
    #[error("Use of moved value `{0}`")]
    UseAfterMove(String),

    #[error("Cannot move a component out of `{0}`; destructure the whole value")]
    PartialMove(String),

    #[error("Cannot assign through `{0}`: not an exclusive reference binding")]
    CannotMutateImmutableRef(String),

    #[error("Conflicting borrow of `{0}`: an exclusive borrow excludes all other access")]
    OverlappingExclusiveBorrow(String),

    #[error("Borrow of `{0}` outlives the scope that owns it")]
    BorrowOutlivesOwner(String),

    #[error("Captured `{0}` cannot be moved into the escaping closure: it is still used afterwards")]
    ClosureCaptureEscapesScope(String),

    #[error("`{0}` cannot cross a thread boundary")]
    ThreadSafetyViolation(String),

    #[error("`{0}` is moved in this loop and used again on a later iteration")]
    LoopReuseAfterMove(String),
}

pub type OwnError = SpannedError<OwnErrorKind>;

impl OwnErrorKind {
    pub fn at(self, span: Span) -> OwnError {
        OwnError::new(self, span)
    }
}
