//! # Action Error Types
//!
//! Errors a scheduler delivers to action callbacks. Every failure of an action
//! function ends up here, exactly once, on the owner thread; the scheduler
//! itself never returns errors from `apply` or `close`.
//!
//! Action functions return `anyhow::Result`, so any error type can be raised
//! with `?`. A [`Cancelled`] raised through `anyhow` is recognised again when
//! the result is classified, which keeps `token.check()?` distinguishable
//! from genuine failures.

use thiserror::Error;

use crate::cancellation::Cancelled;

/// Failure delivered to an action's error sink.
#[derive(Error, Debug)]
pub enum ActionError {
    /// The function stopped because its token was cancelled and no newer
    /// input replaced it.
    #[error("Action cancelled: {0}")]
    Cancelled(#[from] Cancelled),

    /// The function panicked; the payload message is preserved.
    #[error("Action panicked: {0}")]
    Panicked(String),

    /// The function returned an error.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl ActionError {
    /// Classifies an error returned by an action function.
    pub fn from_failure(error: anyhow::Error) -> Self {
        match error.downcast::<Cancelled>() {
            Ok(cancelled) => ActionError::Cancelled(cancelled),
            Err(error) => ActionError::Failed(error),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ActionError::Cancelled(_))
    }
}

pub type ActionResult<T> = Result<T, ActionError>;
