//! Startup metrics.
//!
//! # Metrics
//! - `proxy_rules_loaded_total` (counter): rules read from rule files, by category
//! - `proxy_engine_up` (gauge): 1 while an engine runs, 0 once closed
//!
//! No exporter is installed here; without a recorder the calls are no-ops.

use ::metrics::{counter, gauge};

pub fn record_rules_loaded(category: &'static str, count: usize) {
    counter!("proxy_rules_loaded_total", "category" => category).increment(count as u64);
}

pub fn set_engine_up(engine: &'static str, up: bool) {
    gauge!("proxy_engine_up", "engine" => engine).set(if up { 1.0 } else { 0.0 });
}
