//! Rule file loading.
//!
//! # Responsibilities
//! - Read line-oriented wildcard lists from plain-text files
//! - Map each rule category to its inline list and its file setting
//!
//! # Design Decisions
//! - A missing rule file means "no extra rules", not a failure
//! - Any other read failure is fatal to startup
//! - Rules are kept verbatim and in file order; duplicates survive

use std::fmt;
use std::fs;
use std::io;

use crate::config::loader::ConfigError;
use crate::config::schema::Settings;
use crate::observability::metrics;

/// The four independent rule sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCategory {
    /// DNS answers rewritten to the redirect target.
    Redirect,
    /// Tunnel connections withheld.
    Drop,
    /// Tunnel connections rejected.
    Block,
    /// Tunnel connections sent through the forward proxy.
    Forward,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 4] = [
        RuleCategory::Forward,
        RuleCategory::Redirect,
        RuleCategory::Block,
        RuleCategory::Drop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::Redirect => "redirect",
            RuleCategory::Drop => "drop",
            RuleCategory::Block => "block",
            RuleCategory::Forward => "forward",
        }
    }

    /// Setting holding the path of this category's rule file.
    pub fn file_setting(&self) -> &'static str {
        match self {
            RuleCategory::Redirect => "dns_redirect_rules_file",
            RuleCategory::Drop => "drop_rules_file",
            RuleCategory::Block => "block_rules_file",
            RuleCategory::Forward => "forward_rules_file",
        }
    }

    pub(crate) fn file_path<'a>(&self, settings: &'a Settings) -> &'a str {
        match self {
            RuleCategory::Redirect => &settings.dns_redirect_rules_file,
            RuleCategory::Drop => &settings.drop_rules_file,
            RuleCategory::Block => &settings.block_rules_file,
            RuleCategory::Forward => &settings.forward_rules_file,
        }
    }

    pub(crate) fn rules_mut<'a>(&self, settings: &'a mut Settings) -> &'a mut Vec<String> {
        match self {
            RuleCategory::Redirect => &mut settings.dns_redirect_rules,
            RuleCategory::Drop => &mut settings.drop_rules,
            RuleCategory::Block => &mut settings.block_rules,
            RuleCategory::Forward => &mut settings.forward_rules,
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read the rules stored in `path`.
///
/// Each line is trimmed; blank lines and lines starting with `#` are skipped.
/// An empty path or a file that does not exist yields no rules.
pub fn load_rules(path: &str) -> io::Result<Vec<String>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path, "Rules file does not exist, skipping");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    Ok(parse_rules(&content))
}

fn parse_rules(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Load the rule file of `category` and append its rules after the inline
/// ones already present in `settings`.
pub fn append_rule_file(settings: &mut Settings, category: RuleCategory) -> Result<usize, ConfigError> {
    let path = category.file_path(settings).to_string();
    if path.is_empty() {
        return Ok(0);
    }

    let rules = load_rules(&path).map_err(|source| ConfigError::RuleFile {
        category: category.as_str(),
        path: path.clone(),
        source,
    })?;

    let count = rules.len();
    if count > 0 {
        tracing::info!(category = %category, path = %path, count, "Loaded rules from file");
        metrics::record_rules_loaded(category.as_str(), count);
    }

    category.rules_mut(settings).extend(rules);
    Ok(count)
}
