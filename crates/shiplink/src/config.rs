use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

use crate::poll::Backoff;
use crate::session::ClientOptions;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "shiplink.yaml";

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Base URL of the ship, e.g. `http://localhost:8080`.
    #[serde(default)]
    pub server: Option<String>,
    /// User to authenticate as, e.g. `~zod`.
    #[serde(default)]
    pub user: Option<String>,
    /// Login code. Usually `${SHIP_CODE}`.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub poll: PollConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

impl Config {
    /// Load configuration from `path`. A missing file yields defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path.as_ref()).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Self::parse(&contents)
    }

    /// Parse configuration from YAML text, expanding `${VAR}` references first.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        Ok(serde_saphyr::from_str(&expanded)?)
    }

    /// Library options derived from this configuration.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: Duration::from_secs(self.timeouts.request_seconds),
            subscribe_timeout: Duration::from_secs(self.timeouts.subscribe_seconds),
            backoff: Backoff::new(
                Duration::from_secs(self.poll.backoff_base_seconds),
                Duration::from_secs(self.poll.backoff_max_seconds),
                self.poll.backoff_factor,
            ),
        }
    }
}

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_request_timeout() -> u64 {
    30
}

fn default_subscribe_timeout() -> u64 {
    30
}

fn default_backoff_base() -> u64 {
    10
}

fn default_backoff_max() -> u64 {
    300
}

fn default_backoff_factor() -> f64 {
    2.0
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand `${VAR}` and `${VAR:-default}` references.
///
/// `$$` produces a literal `$`. A `$` not followed by `{` or `$` is kept as-is.
/// Nested references inside defaults are not expanded.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(body) = after.strip_prefix('{') {
            let end = body.find('}').ok_or(ConfigError::UnclosedVarReference)?;
            out.push_str(&resolve_var(&body[..end])?);
            rest = &body[end + 1..];
        } else {
            out.push('$');
            rest = after;
        }
    }
    out.push_str(rest);

    Ok(out)
}

/// Resolve the inside of a `${...}` reference.
fn resolve_var(reference: &str) -> Result<String, ConfigError> {
    let (name, default) = match reference.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (reference, None),
    };

    match (std::env::var(name), default) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_string()),
        (Err(_), None) => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

// ============================================================================
// TimeoutsConfig
// ============================================================================

/// Bounded timeouts for every call except the long poll.
#[derive(Debug, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_request_timeout")]
    pub request_seconds: u64,
    /// Subscribe can hang when the target app is not listening.
    #[serde(default = "default_subscribe_timeout")]
    pub subscribe_seconds: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_seconds: default_request_timeout(),
            subscribe_seconds: default_subscribe_timeout(),
        }
    }
}

// ============================================================================
// PollConfig
// ============================================================================

/// Retry policy for the long-poll loop.
#[derive(Debug, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_backoff_base")]
    pub backoff_base_seconds: u64,
    #[serde(default = "default_backoff_max")]
    pub backoff_max_seconds: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            backoff_base_seconds: default_backoff_base(),
            backoff_max_seconds: default_backoff_max(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_plain_text_untouched() {
        assert_eq!(expand_env_vars("server: http://x").unwrap(), "server: http://x");
        assert_eq!(expand_env_vars("price: $100").unwrap(), "price: $100");
    }

    #[test]
    fn test_expand_escaped_dollar() {
        assert_eq!(expand_env_vars("a: $${HOME}").unwrap(), "a: ${HOME}");
    }

    #[test]
    fn test_expand_default_when_unset() {
        let out = expand_env_vars("code: ${SHIPLINK_TEST_SURELY_UNSET:-lidlut}").unwrap();
        assert_eq!(out, "code: lidlut");

        let out = expand_env_vars("code: ${SHIPLINK_TEST_SURELY_UNSET:-}").unwrap();
        assert_eq!(out, "code: ");
    }

    #[test]
    fn test_expand_set_variable() {
        let path = std::env::var("PATH").unwrap();
        assert_eq!(expand_env_vars("p: ${PATH:-none}").unwrap(), format!("p: {path}"));
    }

    #[test]
    fn test_expand_missing_required_variable() {
        let err = expand_env_vars("code: ${SHIPLINK_TEST_SURELY_UNSET}").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(name) if name == "SHIPLINK_TEST_SURELY_UNSET"));
    }

    #[test]
    fn test_expand_unclosed_reference() {
        let err = expand_env_vars("code: ${OOPS").unwrap_err();
        assert!(matches!(err, ConfigError::UnclosedVarReference));
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server: http://localhost:8080
user: "~zod"
code: ${SHIPLINK_TEST_SURELY_UNSET:-lidlut-tabwed}
timeouts:
  request_seconds: 5
poll:
  backoff_base_seconds: 1
  backoff_max_seconds: 8
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.server.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.user.as_deref(), Some("~zod"));
        assert_eq!(config.code.as_deref(), Some("lidlut-tabwed"));
        assert_eq!(config.timeouts.request_seconds, 5);
        assert_eq!(config.timeouts.subscribe_seconds, 30);

        let options = config.client_options();
        assert_eq!(options.request_timeout, Duration::from_secs(5));
        let mut backoff = options.backoff;
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_defaults_match_client_defaults() {
        let options = Config::default().client_options();
        assert_eq!(options.request_timeout, Duration::from_secs(30));
        assert_eq!(options.subscribe_timeout, Duration::from_secs(30));
        let mut backoff = options.backoff;
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.yaml")).await.unwrap();
        assert!(config.server.is_none());
        assert_eq!(config.poll.backoff_base_seconds, 10);
    }

    #[tokio::test]
    async fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "server: http://ship.example\nuser: \"~bus\"\n").unwrap();

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.server.as_deref(), Some("http://ship.example"));
        assert_eq!(config.user.as_deref(), Some("~bus"));
    }
}
