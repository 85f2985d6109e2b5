//! Configuration loading and resolution.
//!
//! A single JSON file describes profiles, proxy lists, task groups,
//! automation rules and the live feed. Every field has a default so a
//! minimal file only needs the groups it wants to run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use dropcart::{AutomationRule, Mode, Profile, ProxyList, Site};
use serde::{Deserialize, Serialize};

use crate::checkout::TaskSettings;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "DROPCART_CONFIG";

/// Card tokenization endpoint used when the config does not override it.
pub const DEFAULT_DEPOSIT_URL: &str = "https://deposit.us.shopifycs.com/sessions";

// ── Timings ────────────────────────────────────────────

/// Backoff and poll intervals, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub retry_delay_ms: u64,
    pub not_found_delay_ms: u64,
    pub shipping_poll_interval_ms: u64,
    pub tax_poll_interval_ms: u64,
    pub processing_poll_interval_ms: u64,
    pub queue_poll_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            retry_delay_ms: 3500,
            not_found_delay_ms: 3500,
            shipping_poll_interval_ms: 1000,
            tax_poll_interval_ms: 1000,
            processing_poll_interval_ms: 1000,
            queue_poll_interval_ms: 3000,
            request_timeout_ms: 60_000,
        }
    }
}

impl Timings {
    /// Every interval set to `ms`, with the default request timeout.
    pub fn uniform(ms: u64) -> Self {
        Self {
            retry_delay_ms: ms,
            not_found_delay_ms: ms,
            shipping_poll_interval_ms: ms,
            tax_poll_interval_ms: ms,
            processing_poll_interval_ms: ms,
            queue_poll_interval_ms: ms,
            ..Self::default()
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn not_found_delay(&self) -> Duration {
        Duration::from_millis(self.not_found_delay_ms)
    }

    pub fn shipping_poll_interval(&self) -> Duration {
        Duration::from_millis(self.shipping_poll_interval_ms)
    }

    pub fn tax_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tax_poll_interval_ms)
    }

    pub fn processing_poll_interval(&self) -> Duration {
        Duration::from_millis(self.processing_poll_interval_ms)
    }

    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ── File format ────────────────────────────────────────

/// Live feed connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    pub key: String,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

fn default_reconnect_delay() -> u64 {
    5000
}

impl FeedConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// A named proxy list, inline or read from a text file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyListConfig {
    pub name: String,
    #[serde(default)]
    pub proxies: Vec<String>,
    /// One proxy per line. Relative paths resolve against the config file.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// One task line in a group; `count` copies are created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub site: Site,
    pub profile: String,
    #[serde(default)]
    pub proxy_list: Option<String>,
    #[serde(default)]
    pub mode: Mode,
    pub inputs: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default = "one")]
    pub count: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub timings: Timings,
    pub deposit_url: String,
    pub webhook_url: Option<String>,
    pub feed: Option<FeedConfig>,
    pub profiles: Vec<Profile>,
    pub proxy_lists: Vec<ProxyListConfig>,
    pub groups: Vec<GroupConfig>,
    pub automations: Vec<AutomationRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timings: Timings::default(),
            deposit_url: DEFAULT_DEPOSIT_URL.to_string(),
            webhook_url: None,
            feed: None,
            profiles: Vec::new(),
            proxy_lists: Vec::new(),
            groups: Vec::new(),
            automations: Vec::new(),
        }
    }
}

// ── Resolution ─────────────────────────────────────────

/// Resolve the config path: explicit flag, env var, working directory,
/// then `~/.dropcart/config.json`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        if !env_path.is_empty() {
            return PathBuf::from(env_path);
        }
    }

    let cwd_config = PathBuf::from("dropcart.json");
    if cwd_config.exists() {
        return cwd_config;
    }

    default_config_path()
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dropcart")
        .join("config.json")
}

// ── Loading ────────────────────────────────────────────

impl Config {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every profile and proxy list reference resolves.
    pub fn validate(&self) -> Result<()> {
        let profiles: Vec<&str> = self.profiles.iter().map(|p| p.name.as_str()).collect();
        let lists: Vec<&str> = self.proxy_lists.iter().map(|l| l.name.as_str()).collect();

        for group in &self.groups {
            for task in &group.tasks {
                if !profiles.contains(&task.profile.as_str()) {
                    bail!("group '{}' references unknown profile '{}'", group.name, task.profile);
                }
                if let Some(list) = &task.proxy_list {
                    if !lists.contains(&list.as_str()) {
                        bail!("group '{}' references unknown proxy list '{list}'", group.name);
                    }
                }
                if task.inputs.is_empty() {
                    bail!("group '{}' has a task with no monitor inputs", group.name);
                }
                if task.quantity == 0 {
                    bail!("group '{}' has a task with zero quantity", group.name);
                }
            }
        }

        for rule in &self.automations {
            for profile in &rule.profiles {
                if !profiles.contains(&profile.as_str()) {
                    bail!("automation '{}' references unknown profile '{profile}'", rule.name);
                }
            }
            if let Some(list) = &rule.proxy_list {
                if !lists.contains(&list.as_str()) {
                    bail!("automation '{}' references unknown proxy list '{list}'", rule.name);
                }
            }
        }

        Ok(())
    }

    /// Build every proxy list. File entries resolve relative to `base_dir`.
    pub fn build_proxy_lists(&self, base_dir: &Path) -> Result<HashMap<String, Arc<ProxyList>>> {
        let mut built = HashMap::new();
        for entry in &self.proxy_lists {
            let list = ProxyList::new(&entry.name);
            let mut skipped = 0usize;

            for raw in &entry.proxies {
                if !list.add(raw) {
                    skipped += 1;
                }
            }

            if let Some(file) = &entry.file {
                let path = if file.is_absolute() {
                    file.clone()
                } else {
                    base_dir.join(file)
                };
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read proxy file {}", path.display()))?;
                for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    if !list.add(line) {
                        skipped += 1;
                    }
                }
            }

            if skipped > 0 {
                tracing::warn!(list = %entry.name, "Skipped {skipped} malformed proxies");
            }
            built.insert(entry.name.clone(), Arc::new(list));
        }
        Ok(built)
    }

    /// Expand a group into task settings, one per `count`.
    pub fn task_settings(
        &self,
        group: &GroupConfig,
        proxy_lists: &HashMap<String, Arc<ProxyList>>,
    ) -> Result<Vec<TaskSettings>> {
        let mut settings = Vec::new();
        for task in &group.tasks {
            let profile = self
                .profiles
                .iter()
                .find(|p| p.name == task.profile)
                .with_context(|| format!("unknown profile '{}'", task.profile))?;
            let proxy_list = match &task.proxy_list {
                Some(name) => Some(
                    proxy_lists
                        .get(name)
                        .cloned()
                        .with_context(|| format!("unknown proxy list '{name}'"))?,
                ),
                None => None,
            };

            let profile = Arc::new(profile.clone());
            for _ in 0..task.count {
                settings.push(TaskSettings {
                    site: task.site.clone(),
                    profile: profile.clone(),
                    proxy_list: proxy_list.clone(),
                    mode: task.mode,
                    inputs: task.inputs.clone(),
                    sizes: task.sizes.clone(),
                    quantity: task.quantity,
                });
            }
        }
        Ok(settings)
    }
}
