//! # Courier Action Scheduler API
//!
//! Courier runs registered actions off an "owner" thread, coalesces repeated
//! requests for the same action while one is in flight, and delivers exactly
//! one result back on the owner thread. This crate holds the contracts a host
//! needs to talk to the engine without depending on its internals.
//!
//! ## Core Components
//!
//! - **Action ids**: dense integer ids assigned in registration order
//! - **Payloads**: type-erased action inputs that can be compared, cloned
//!   and downcast back to their concrete type
//! - **Snapshots**: the pending inputs of in-flight actions, handed to the
//!   host for persistence and handed back on restore
//! - **Cancellation**: the token every action function receives, which
//!   reports when its input has been superseded or the scheduler closed
//! - **Executors and thread factories**: the two capabilities the host
//!   injects into the engine
//!
//! ## Module Organization
//!
//! - [`types`]: action ids, action kinds and payloads
//! - [`snapshot`]: saved pending inputs
//! - [`cancellation`]: cancellation token and the `Cancelled` error
//! - [`errors`]: errors delivered to action callbacks
//! - [`executor`]: owner-thread executor contract
//! - [`factory`]: worker thread factory contract

pub mod cancellation;
pub mod errors;
pub mod executor;
pub mod factory;
pub mod snapshot;
pub mod types;

pub use cancellation::{CancellationToken, Cancelled};
pub use errors::{ActionError, ActionResult};
pub use executor::{Job, OwnerExecutor};
pub use factory::{StdThreadFactory, ThreadFactory};
pub use snapshot::Snapshot;
pub use types::{ActionId, ActionKind, BoxedPayload, Payload};
