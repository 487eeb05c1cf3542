//! Network layer.
//!
//! # Design Decisions
//! - TCP accepts are bounded by a semaphore (backpressure)
//! - Every loop is owned by an engine and stops on its cancellation token

pub mod listener;

pub use listener::{ConnectionPermit, Listener, ListenerError};
