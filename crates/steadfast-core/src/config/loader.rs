//! Configuration file loading and environment overrides

use crate::error::{Error, Result};
use crate::retry::RetryStrategy;
use crate::types::{RetryPoliciesConfig, RetryPolicy};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::{env, fs};
use tracing::debug;

/// Configuration file names to search for
const CONFIG_FILE_NAMES: &[&str] = &["steadfast.yaml", "steadfast.yml"];

/// On-disk layout of `steadfast.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SteadfastConfigFile {
    /// Retry policies
    #[serde(default)]
    pub retry_policies: RetryPoliciesConfig,
}

/// Loaded steadfast configuration
#[derive(Debug, Clone, Default)]
pub struct SteadfastConfig {
    /// The parsed configuration
    pub config: SteadfastConfigFile,

    /// Path of the file the configuration came from, if any
    pub config_path: Option<Utf8PathBuf>,
}

impl SteadfastConfig {
    /// Load configuration from the specified path or search for it
    ///
    /// An explicit path must exist. Without one, the current directory and
    /// its parents are searched and defaults are used when nothing is found.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let content = fs::read_to_string(p).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::config_not_found(p.as_str())
                    } else {
                        Error::Io(e)
                    }
                })?;
                Self::from_yaml(&content, Some(p.to_owned()))
            }
            None => {
                let cwd = env::current_dir()?;
                let cwd = Utf8PathBuf::try_from(cwd).map_err(|_| {
                    Error::invalid_config("Current directory path is not valid UTF-8")
                })?;
                Self::discover(&cwd)
            }
        }
    }

    /// Search `start` and its parents for a configuration file
    pub fn discover(start: &Utf8Path) -> Result<Self> {
        match Self::find_config(start)? {
            Some((path, content)) => Self::from_yaml(&content, Some(path)),
            None => {
                debug!("No steadfast.yaml found from {}, using defaults", start);
                Self::from_yaml("{}", None)
            }
        }
    }

    /// Retry policies after environment overrides
    pub fn retry_policies(&self) -> &RetryPoliciesConfig {
        &self.config.retry_policies
    }

    /// Resolved policy for `operation`
    pub fn policy_for(&self, operation: &str) -> &RetryPolicy {
        self.config.retry_policies.policy_for(operation)
    }

    /// Strategy for `operation`
    pub fn strategy_for(&self, operation: &str) -> RetryStrategy {
        self.config.retry_policies.strategy_for(operation)
    }

    fn from_yaml(content: &str, config_path: Option<Utf8PathBuf>) -> Result<Self> {
        // An empty document parses as null
        let config: SteadfastConfigFile = if content.trim().is_empty() {
            SteadfastConfigFile::default()
        } else {
            serde_yaml_ng::from_str(content)?
        };

        if let Some(path) = &config_path {
            debug!("Loaded configuration from {}", path);
        }

        let mut loaded = Self {
            config,
            config_path,
        };
        apply_env_overrides(&mut loaded.config.retry_policies.default)?;
        Ok(loaded)
    }

    fn find_config(start: &Utf8Path) -> Result<Option<(Utf8PathBuf, String)>> {
        let mut current = start;

        loop {
            for name in CONFIG_FILE_NAMES {
                let path = current.join(name);
                if path.is_file() {
                    let content = fs::read_to_string(&path)?;
                    return Ok(Some((path, content)));
                }
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
    }
}

/// Apply environment variable overrides to the default policy
fn apply_env_overrides(policy: &mut RetryPolicy) -> Result<()> {
    if let Ok(val) = env::var("STEADFAST_MAX_ATTEMPTS") {
        policy.max_attempts = val.parse().map_err(|_| {
            Error::invalid_config("STEADFAST_MAX_ATTEMPTS must be a valid number")
        })?;
    }

    if let Ok(val) = env::var("STEADFAST_BASE_DELAY_MS") {
        policy.base_delay_ms = val.parse().map_err(|_| {
            Error::invalid_config("STEADFAST_BASE_DELAY_MS must be a valid number")
        })?;
    }

    if let Ok(val) = env::var("STEADFAST_MAX_DELAY_MS") {
        policy.max_delay_ms = val.parse().map_err(|_| {
            Error::invalid_config("STEADFAST_MAX_DELAY_MS must be a valid number")
        })?;
    }

    if let Ok(val) = env::var("STEADFAST_MULTIPLIER") {
        policy.multiplier = val
            .parse()
            .map_err(|_| Error::invalid_config("STEADFAST_MULTIPLIER must be a valid number"))?;
    }

    if let Ok(val) = env::var("STEADFAST_JITTER_RATIO") {
        policy.jitter_ratio = val.parse().map_err(|_| {
            Error::invalid_config("STEADFAST_JITTER_RATIO must be a valid number")
        })?;
    }

    Ok(())
}
