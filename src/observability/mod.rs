//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, stdout or file)
//!     → metrics.rs (counters, gauges)
//! ```
//!
//! # Design Decisions
//! - The subscriber is installed after settings resolve, since `verbose`
//!   and `output` are settings themselves
//! - Metrics go through the `metrics` facade; the embedding process picks
//!   the recorder

pub mod logging;
pub mod metrics;
