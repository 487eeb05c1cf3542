//! Source merging.
//!
//! # Data Flow
//! ```text
//! Settings::default()          (Origin::Default)
//!     → YAML file layer        (Origin::File, only fields present in the file)
//!     → command-line layer     (Origin::Flag, only flags actually passed)
//!     → rule files appended after the inline rules of each category
//! ```
//!
//! # Design Decisions
//! - Precedence is per field: an absent flag never blanks a file value
//! - Lists and maps are replaced as a whole by the layer that sets them
//! - The origin of every setting is recorded so precedence is observable

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::loader::{ConfigError, FileLayer};
use crate::config::rules::{append_rule_file, RuleCategory};
use crate::config::schema::{Origin, Settings, SettingsLayer, SETTINGS};

/// Merged settings that have not been validated yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    settings: Settings,
    origins: BTreeMap<&'static str, Origin>,
    config_file: Option<PathBuf>,
}

macro_rules! overlay {
    ($settings:expr, $origins:expr, $layer:expr, $origin:expr; $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $layer.$field {
                $settings.$field = value;
                $origins.insert(stringify!($field), $origin);
            }
        )+
    };
}

impl ResolvedSettings {
    /// Start from the compiled-in defaults.
    pub fn defaults() -> Self {
        Self {
            settings: Settings::default(),
            origins: SETTINGS.iter().map(|d| (d.name, Origin::Default)).collect(),
            config_file: None,
        }
    }

    /// Apply defaults, then the optional file layer, then the flag layer.
    pub fn resolve(file: Option<FileLayer>, flags: SettingsLayer) -> Self {
        let mut resolved = Self::defaults();
        if let Some(file) = file {
            resolved.apply(file.layer, Origin::File);
            resolved.config_file = Some(file.path);
        }
        resolved.apply(flags, Origin::Flag);
        resolved
    }

    /// Overlay every field present in `layer`.
    pub fn apply(&mut self, layer: SettingsLayer, origin: Origin) {
        overlay!(self.settings, self.origins, layer, origin;
            dns_address,
            dns_port,
            dns_upstream,
            dns_redirect_ipv4_to,
            dns_redirect_ipv6_to,
            dns_redirect_rules,
            dns_redirect_rules_file,
            dns_drop_rules,
            dns_cache_enabled,
            dns_cache_size,
            dns_cache_min_ttl,
            dns_cache_max_ttl,
            http_address,
            http_port,
            tls_address,
            tls_port,
            dot_address,
            dot_port,
            doh_address,
            doh_port,
            doq_address,
            doq_port,
            tls_cert_file,
            tls_key_file,
            bandwidth_rate,
            bandwidth_rules,
            forward_proxy,
            forward_rules,
            forward_rules_file,
            block_rules,
            block_rules_file,
            drop_rules,
            drop_rules_file,
            verbose,
            output,
        );
    }

    /// Append the contents of every configured rule file to its category.
    pub fn merge_rule_files(&mut self) -> Result<(), ConfigError> {
        for category in RuleCategory::ALL {
            append_rule_file(&mut self.settings, category)?;
        }
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Where the effective value of `name` (a YAML key) came from.
    pub fn origin(&self, name: &str) -> Option<Origin> {
        self.origins.get(name).copied()
    }

    /// The YAML file that contributed to these settings, if any.
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Settings as pretty JSON with credentials in `forward_proxy` masked.
    pub fn redacted_json(&self) -> String {
        let mut value = match serde_json::to_value(&self.settings) {
            Ok(value) => value,
            Err(e) => return format!("<unprintable settings: {e}>"),
        };
        value["forward_proxy"] = serde_json::Value::String(redact_url(&self.settings.forward_proxy));
        serde_json::to_string_pretty(&value).unwrap_or_default()
    }
}

impl Default for ResolvedSettings {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Mask the password of a URL, leaving anything unparsable untouched.
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("xxxxx")).is_ok() {
                parsed.to_string()
            } else {
                raw.to_string()
            }
        }
        _ => raw.to_string(),
    }
}
