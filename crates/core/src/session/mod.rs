//! Session controller: the state machine for one transcoding session.
//!
//! ```text
//! Idle -> AwaitingEngine -> Ready <-> Configuring -> Processing -> Complete
//!                 |                                     |
//!                 v                                     v
//!          Failed (reload)                    Failed (recoverable)
//! ```
//!
//! The [`SessionController`] owns the [`Session`] and is the only writer.
//! Every change replaces or edits it atomically and is broadcast on a
//! `watch` channel; observers get the latest state via
//! [`SessionController::subscribe`].
//!
//! Rejected files leave the session in `Ready` with a recoverable notice.
//! Engine failures, cancellation and timeouts end in a recoverable `Failed`
//! that can be retried. Only an engine that cannot load is terminal.

mod controller;
mod types;

pub use controller::{ControllerError, SessionController};
pub use types::{Session, SessionError, SessionErrorKind, SessionStep};
