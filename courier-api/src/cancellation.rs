//! # Cooperative cancellation
//!
//! Every action function receives a [`CancellationToken`]. The token captures
//! the generation of its work unit at the moment the invocation started; any
//! newer input for the same action bumps the generation and the token starts
//! reporting itself as superseded. Closing the scheduler interrupts every
//! token outright.
//!
//! Functions call [`CancellationToken::check`] at convenient points and
//! return early with `?`. Returning early is always safe: when the input was
//! superseded, the work unit simply invokes the function again with the newer
//! input.
//!
//! ```rust
//! use courier_api::CancellationToken;
//!
//! fn checksum(data: Vec<u8>, token: &CancellationToken) -> anyhow::Result<Option<u32>> {
//!     let mut sum = 0u32;
//!     for chunk in data.chunks(1024) {
//!         token.check()?;
//!         sum = chunk.iter().fold(sum, |acc, b| acc.wrapping_add(*b as u32));
//!     }
//!     Ok(Some(sum))
//! }
//!
//! assert_eq!(checksum(vec![1, 2, 3], &CancellationToken::never()).unwrap(), Some(6));
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Why an invocation was asked to stop.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancelled {
    #[error("input was superseded by a newer request")]
    Superseded,
    #[error("scheduler is shutting down")]
    Interrupted,
}

/// Handle an action function polls to learn that its work is stale.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    generation: Arc<AtomicU64>,
    started: u64,
    interrupted: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Token bound to a work unit's generation counter and interrupt flag.
    /// `started` is the generation the invocation's input belongs to.
    pub fn new(generation: Arc<AtomicU64>, started: u64, interrupted: Arc<AtomicBool>) -> Self {
        Self {
            generation,
            started,
            interrupted,
        }
    }

    /// Token that is never cancelled, for calling action functions directly.
    pub fn never() -> Self {
        Self::new(Arc::new(AtomicU64::new(0)), 0, Arc::new(AtomicBool::new(false)))
    }

    /// Generation this invocation started with.
    pub fn generation(&self) -> u64 {
        self.started
    }

    pub fn is_superseded(&self) -> bool {
        self.generation.load(Ordering::Acquire) != self.started
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.is_interrupted() || self.is_superseded()
    }

    /// `Err` once the invocation should stop.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_interrupted() {
            Err(Cancelled::Interrupted)
        } else if self.is_superseded() {
            Err(Cancelled::Superseded)
        } else {
            Ok(())
        }
    }
}
