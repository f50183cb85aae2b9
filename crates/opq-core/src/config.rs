use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::policy::{OfflinerPolicy, OrderPreference};

/// Retry/expiration limits (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Dispatches allowed per request before it stops being picked.
    pub max_started_tries: u32,
    /// Completed (budget-consuming) attempts before a request is removed.
    pub max_completed_tries: u32,
    /// Request age in seconds after which it is dropped.
    pub request_expiration_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let p = OfflinerPolicy::default();
        Self {
            max_started_tries: p.max_started_tries,
            max_completed_tries: p.max_completed_tries,
            request_expiration_secs: p.request_expiration.as_secs(),
        }
    }
}

/// Device gating for background (non-user-requested) work (optional section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatingConfig {
    pub power_required: bool,
    pub unmetered_required: bool,
    pub minimum_battery_percentage: u32,
}

impl Default for GatingConfig {
    fn default() -> Self {
        let p = OfflinerPolicy::default();
        Self {
            power_required: p.power_required_for_background,
            unmetered_required: p.unmetered_required_for_background,
            minimum_battery_percentage: p.minimum_battery_for_background,
        }
    }
}

/// Ordering preference between same-intent requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderConfig {
    #[default]
    RetryCountFirst,
    RecencyFirst,
}

/// Global configuration loaded from `~/.config/opq/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpqConfig {
    /// Optional retry/expiration limits; built-in defaults if missing.
    #[serde(default)]
    pub limits: Option<LimitsConfig>,
    /// Optional background gating overrides.
    #[serde(default)]
    pub gating: Option<GatingConfig>,
    /// Primary sort key for the picker.
    #[serde(default)]
    pub order: Option<OrderConfig>,
    /// Scheduled-window dispatch budget in seconds.
    #[serde(default)]
    pub scheduled_window_budget_secs: Option<u64>,
    /// Immediate-window dispatch budget in seconds.
    #[serde(default)]
    pub immediate_window_budget_secs: Option<u64>,
}

impl OpqConfig {
    /// Materialize the immutable policy the scheduler core consumes.
    pub fn policy(&self) -> OfflinerPolicy {
        let mut policy = OfflinerPolicy::default();
        if let Some(limits) = &self.limits {
            policy.max_started_tries = limits.max_started_tries;
            policy.max_completed_tries = limits.max_completed_tries;
            policy.request_expiration = Duration::from_secs(limits.request_expiration_secs);
        }
        if let Some(gating) = &self.gating {
            policy.power_required_for_background = gating.power_required;
            policy.unmetered_required_for_background = gating.unmetered_required;
            policy.minimum_battery_for_background = gating.minimum_battery_percentage;
        }
        if let Some(order) = self.order {
            policy.order = match order {
                OrderConfig::RetryCountFirst => OrderPreference::RetryCountFirst,
                OrderConfig::RecencyFirst => OrderPreference::RecencyFirst,
            };
        }
        if let Some(secs) = self.scheduled_window_budget_secs {
            policy.scheduled_window_budget = Duration::from_secs(secs);
        }
        if let Some(secs) = self.immediate_window_budget_secs {
            policy.immediate_window_budget = Duration::from_secs(secs);
        }
        policy
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("opq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<OpqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = OpqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: OpqConfig = toml::from_str(&data)?;
    Ok(cfg)
}
