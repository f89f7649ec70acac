//! Environment loading and explicit configuration
//!
//! `load_environment()` is meant for `main()` only. Library code never reads
//! the environment at call time: it receives a [`GatewayConfig`] and a
//! [`LayoutConfig`] through constructors.
//!
//! ```rust
//! use topo_core::config::{load_environment, GatewayConfig};
//!
//! fn main() -> topo_core::Result<()> {
//!     load_environment();
//!     let gateway = GatewayConfig::from_env()?;
//!     assert!(!gateway.base_url.is_empty());
//!     Ok(())
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::Position;

/// Environment files to check, in priority order
pub const ENV_FILE_PATHS: &[&str] = &["/etc/topo/environment", "/etc/topo.env", ".env"];

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LAYOUT_STEP: f64 = 100.0;
pub const DEFAULT_LAYOUT_COLUMNS: usize = 8;

/// Files to try, `TOPO_ENV_FILE` first
fn env_file_candidates() -> impl Iterator<Item = PathBuf> {
    std::env::var_os("TOPO_ENV_FILE")
        .map(PathBuf::from)
        .into_iter()
        .chain(ENV_FILE_PATHS.iter().map(PathBuf::from))
}

/// Export the variables of the first existing environment file.
///
/// Variables already present in the process environment win over the file.
/// Returns the file that was applied.
pub fn load_environment() -> Option<PathBuf> {
    let applied = env_file_candidates().find(|path| path.is_file() && apply_env_file(path));
    if applied.is_none() {
        debug!("No environment file applied");
    }
    applied
}

fn apply_env_file(path: &Path) -> bool {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable environment file");
            return false;
        }
    };

    let (mut set, mut kept) = (0usize, 0usize);
    for (key, value) in content.lines().filter_map(parse_env_line) {
        if std::env::var_os(key).is_some() {
            kept += 1;
        } else {
            std::env::set_var(key, value);
            set += 1;
        }
    }
    debug!(path = %path.display(), set, kept, "Environment file applied");
    true
}

/// One `KEY=VALUE` assignment. Accepts an `export ` prefix, single or double
/// quotes, and a trailing ` #` comment after unquoted values.
fn parse_env_line(line: &str) -> Option<(&str, String)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, raw) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }

    let raw = raw.trim();
    let value = match raw.chars().next() {
        Some(quote @ ('"' | '\'')) => raw[1..].strip_suffix(quote)?,
        _ => raw.split_once(" #").map_or(raw, |(v, _)| v).trim_end(),
    };
    Some((key, value.to_string()))
}

/// Get a configuration value with a default.
pub fn get_config(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an optional, non-empty configuration value.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Connection settings for the backend gateway
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Base endpoint, without trailing slash
    pub base_url: String,
    /// Bearer token sent as `Authorization`
    pub token: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl GatewayConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from `TOPO_BACKEND_URL`, `TOPO_BACKEND_TOKEN` and `TOPO_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        let base_url = get_config("TOPO_BACKEND_URL", DEFAULT_BACKEND_URL);
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::config(format!(
                "TOPO_BACKEND_URL must be an http(s) URL, got '{}'",
                base_url
            )));
        }

        let mut config = Self::new(&base_url);
        config.token = get_config_opt("TOPO_BACKEND_TOKEN");

        if let Some(raw) = get_config_opt("TOPO_TIMEOUT_SECS") {
            let secs: u64 = raw
                .parse()
                .map_err(|_| Error::config(format!("TOPO_TIMEOUT_SECS is not a number: '{}'", raw)))?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Value of the `Authorization` header, if a token is configured
    pub fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }
}

/// Spacing rule for nodes created without explicit positions
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    /// Distance between successive nodes on x and between rows on y
    pub step: f64,
    /// Nodes per row before wrapping along y
    pub columns: usize,
    /// Start of the first row when a batch has no anchor
    pub origin: Position,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            step: DEFAULT_LAYOUT_STEP,
            columns: DEFAULT_LAYOUT_COLUMNS,
            origin: Position::default(),
        }
    }
}

impl LayoutConfig {
    /// Reject steps that would stack nodes on each other
    pub fn validated(self) -> Result<Self> {
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(Error::config(format!(
                "layout step must be positive, got {}",
                self.step
            )));
        }
        if self.columns == 0 {
            return Err(Error::config("layout columns must be at least 1"));
        }
        if !(self.origin.x.is_finite() && self.origin.y.is_finite()) {
            return Err(Error::config("layout origin must be finite"));
        }
        Ok(self)
    }
}
