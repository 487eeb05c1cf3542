//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Merge settings → Init logging → Rule files → Translate → Orchestrate
//!
//! Orchestration (orchestrator.rs):
//!     Start DNS → Start tunnel → Running → Close DNS → Close tunnel
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then logging, then engines
//! - A single shared [`Shutdown`] token ends the run

pub mod orchestrator;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use orchestrator::{Orchestrator, State};
pub use shutdown::Shutdown;
pub use startup::StartupError;
