// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Process-wide runtime settings for pipeline task threads.
//!
//! Resolution order: an installed config, then `CONFLUX_*` environment
//! variables, then defaults.

use std::env;
use std::num::NonZeroUsize;
use std::sync::OnceLock;
use std::thread;

use thiserror::Error;
use tracing::warn;

pub const ENV_THREAD_NAME: &str = "CONFLUX_THREAD_NAME";
pub const ENV_STACK_SIZE: &str = "CONFLUX_STACK_SIZE";
pub const ENV_WORKERS: &str = "CONFLUX_WORKERS";

static CURRENT: OnceLock<RuntimeConfig> = OnceLock::new();

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("runtime config already installed")]
    AlreadyInstalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RuntimeConfig {
    /// Prefix for task thread names; tasks are named `{thread_name}-{stage}`.
    pub thread_name: String,
    /// Stack size for task threads. `None` keeps the platform default.
    pub stack_size: Option<usize>,
    /// Worker count used by auto-sized worker pools.
    pub default_workers: NonZeroUsize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            thread_name: "conflux".to_string(),
            stack_size: None,
            default_workers: thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by any `CONFLUX_*` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_THREAD_NAME) {
            if name.trim().is_empty() {
                return Err(invalid(ENV_THREAD_NAME, name, "must not be empty"));
            }
            config.thread_name = name;
        }
        if let Some(raw) = lookup(ENV_STACK_SIZE) {
            let size = parse_positive(ENV_STACK_SIZE, raw)?;
            config.stack_size = Some(size.get());
        }
        if let Some(raw) = lookup(ENV_WORKERS) {
            config.default_workers = parse_positive(ENV_WORKERS, raw)?;
        }

        Ok(config)
    }

    /// Make this the process-wide config. Only the first call wins.
    pub fn install(self) -> Result<(), ConfigError> {
        CURRENT.set(self).map_err(|_| ConfigError::AlreadyInstalled)
    }

    /// The process-wide config, resolving it on first use.
    pub fn current() -> &'static RuntimeConfig {
        CURRENT.get_or_init(|| match Self::from_env() {
            Ok(config) => config,
            Err(err) => {
                warn!(%err, "ignoring runtime config from environment");
                Self::default()
            }
        })
    }

    pub(crate) fn thread_builder(&self, stage: &str) -> thread::Builder {
        let builder = thread::Builder::new().name(format!("{}-{}", self.thread_name, stage));
        match self.stack_size {
            Some(size) => builder.stack_size(size),
            None => builder,
        }
    }
}

fn parse_positive(key: &'static str, raw: String) -> Result<NonZeroUsize, ConfigError> {
    match raw.trim().parse::<usize>().map(NonZeroUsize::new) {
        Ok(Some(n)) => Ok(n),
        Ok(None) => Err(invalid(key, raw, "must be greater than zero")),
        Err(e) => {
            let reason = e.to_string();
            Err(invalid(key, raw, &reason))
        }
    }
}

fn invalid(key: &'static str, value: String, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value,
        reason: reason.to_string(),
    }
}
