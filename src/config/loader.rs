//! Configuration loading from disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use thiserror::Error;

use crate::config::schema::SettingsLayer;
use crate::config::validation::ValidationError;

/// Error type for configuration loading and resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to load {category} rules from {path}: {source}")]
    RuleFile {
        category: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Settings read from a YAML file, together with the path they came from.
#[derive(Debug, Clone)]
pub struct FileLayer {
    pub path: PathBuf,
    pub layer: SettingsLayer,
}

/// Load the YAML configuration file if it exists.
///
/// A missing file is not an error: the file layer is simply absent. The file
/// text goes through [`expand_env`] before it is parsed.
pub fn load_file_layer(path: &Path) -> Result<Option<FileLayer>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let layer = parse_layer(&expand_env(&content)).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(Some(FileLayer {
        path: path.to_path_buf(),
        layer,
    }))
}

/// Parse a YAML document into a settings layer.
///
/// An empty document (or one holding only comments) yields an empty layer.
pub fn parse_layer(yaml: &str) -> Result<SettingsLayer, serde_yaml::Error> {
    if yaml.trim().is_empty() {
        return Ok(SettingsLayer::default());
    }
    let layer: Option<SettingsLayer> = serde_yaml::from_str(yaml)?;
    Ok(layer.unwrap_or_default())
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$(?:\{([^}]*)\}|([A-Za-z0-9_]+|[*#$@!?\-]))")
            .expect("env pattern is a valid regex")
    })
}

/// Expand `$VAR` and `${VAR}` references from the process environment.
///
/// Undefined variables expand to the empty string, `${}` is removed and a
/// `$` that does not start a reference is kept as-is.
pub fn expand_env(text: &str) -> String {
    env_pattern()
        .replace_all(text, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or("");
            if name.is_empty() {
                return String::new();
            }
            std::env::var(name).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_expand_env_forms() {
        std::env::set_var("REDIRECT_PROXY_TEST_ADDR", "10.0.0.1");
        assert_eq!(expand_env("a: $REDIRECT_PROXY_TEST_ADDR"), "a: 10.0.0.1");
        assert_eq!(expand_env("a: ${REDIRECT_PROXY_TEST_ADDR}:53"), "a: 10.0.0.1:53");
        assert_eq!(expand_env("a: ${REDIRECT_PROXY_TEST_UNSET_VAR}"), "a: ");
        assert_eq!(expand_env("a: ${}b"), "a: b");
        assert_eq!(expand_env("cost: 5$"), "cost: 5$");
        assert_eq!(expand_env("x: $ y"), "x: $ y");
    }

    #[test]
    fn test_parse_empty_document() {
        assert_eq!(parse_layer("").unwrap(), SettingsLayer::default());
        assert_eq!(parse_layer("# nothing here\n").unwrap(), SettingsLayer::default());
    }

    #[test]
    fn test_parse_layer_fields() {
        let layer = parse_layer(
            "dns_port: 5353\ndns_redirect_rules:\n  - \"*.example.org\"\nbandwidth_rules:\n  \"video.*\": 1024\n",
        )
        .unwrap();
        assert_eq!(layer.dns_port, Some(5353));
        assert_eq!(layer.dns_redirect_rules, Some(vec!["*.example.org".to_string()]));
        assert_eq!(layer.bandwidth_rules.unwrap().get("video.*"), Some(&1024.0));
        assert!(layer.dns_address.is_none());
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        assert!(parse_layer("dns_port: not-a-port").is_err());
        assert!(parse_layer("dns_port: 70000").is_err());
    }

    #[test]
    fn test_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_file_layer(&dir.path().join("config.yaml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_file_is_env_expanded_before_parsing() {
        std::env::set_var("REDIRECT_PROXY_TEST_UPSTREAM", "1.1.1.1");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dns_upstream: ${{REDIRECT_PROXY_TEST_UPSTREAM}}").unwrap();

        let loaded = load_file_layer(file.path()).unwrap().unwrap();
        assert_eq!(loaded.layer.dns_upstream.as_deref(), Some("1.1.1.1"));
        assert_eq!(loaded.path, file.path());
    }

    #[test]
    fn test_parse_error_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dns_port: [unclosed").unwrap();

        let err = load_file_layer(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("cannot parse config file"));
    }
}
