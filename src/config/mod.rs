//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! Settings::default()
//!     → loader.rs (read config.yaml, expand $VARS, parse YAML layer)
//!     → merge.rs (defaults → file → flags, per field)
//!     → rules.rs (append rule files after inline rules)
//!     → validation.rs (semantic checks)
//!     → DnsConfig + TunnelConfig (validated, owned by their engines)
//! ```
//!
//! # Design Decisions
//! - Settings are resolved once at startup; there is no reload
//! - Every setting has a default so an empty config file is valid
//! - Syntactic errors come from serde/clap, semantic ones from validation.rs

pub mod loader;
pub mod merge;
pub mod rules;
pub mod schema;
pub mod validation;

pub use loader::{ConfigError, FileLayer};
pub use merge::ResolvedSettings;
pub use rules::{load_rules, RuleCategory};
pub use schema::{Origin, Settings, SettingsLayer, SETTINGS};
pub use validation::{translate, AddressSpec, ValidationError};
