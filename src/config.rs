// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracker configuration, read from `~/.jobwatch/config.json`.
//!
//! Every field is optional in the file; missing fields and a missing file both
//! fall back to the defaults below.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::monitor::{MonitorConfig, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL};
use crate::query::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use crate::registry::DEFAULT_HISTORY_CAPACITY;

const CONFIG_DIR: &str = ".jobwatch";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Finished jobs kept before the oldest are evicted
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Page size used when the caller does not give one
    #[serde(default = "default_list_limit")]
    pub default_list_limit: usize,
    #[serde(default)]
    pub monitor: MonitorSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_initial_delay_secs() -> u64 {
    DEFAULT_INITIAL_DELAY.as_secs()
}

fn default_max_polls() -> u32 {
    DEFAULT_MAX_POLLS
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            default_list_limit: default_list_limit(),
            monitor: MonitorSettings::default(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            initial_delay_secs: default_initial_delay_secs(),
            max_polls: default_max_polls(),
        }
    }
}

impl MonitorSettings {
    pub fn to_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            max_polls: self.max_polls,
        }
    }
}

impl TrackerConfig {
    /// `~/.jobwatch/config.json`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            bail!("history_capacity must be at least 1");
        }
        if self.default_list_limit > MAX_LIST_LIMIT as usize {
            bail!(
                "default_list_limit must be between 0 and {}, got {}",
                MAX_LIST_LIMIT,
                self.default_list_limit
            );
        }
        if self.monitor.poll_interval_secs == 0 {
            bail!("monitor.poll_interval_secs must be at least 1");
        }
        if self.monitor.max_polls == 0 {
            bail!("monitor.max_polls must be at least 1");
        }
        Ok(())
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        self.monitor.to_config()
    }
}
