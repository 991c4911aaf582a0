//! Runtime configuration.
//!
//! The engine needs very little: the bounded-sample cap for run records
//! and the alert distribution list. Deployments usually supply recipients
//! through RECON_ALERT_RECIPIENTS (comma-separated); a JSON config file
//! is supported where files are preferred. Absence of either is not an
//! error; alerting degrades to a logged no-op.

use serde::{Deserialize, Serialize};

pub const DEFAULT_SAMPLE_CAP: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconConfig {
    /// Per-bucket cap on the discrepancy samples embedded in the run record.
    /// The per-item table is never capped.
    #[serde(default = "default_sample_cap")]
    pub sample_cap: usize,

    /// Alert distribution list. Empty = alerting is a silent no-op.
    #[serde(default)]
    pub alert_recipients: Vec<String>,
}

fn default_sample_cap() -> usize {
    DEFAULT_SAMPLE_CAP
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            sample_cap: DEFAULT_SAMPLE_CAP,
            alert_recipients: Vec::new(),
        }
    }
}

impl ReconConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Environment-driven configuration for headless runs.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("RECON_ALERT_RECIPIENTS") {
            config.alert_recipients = parse_recipients(&raw);
        }
        if let Ok(raw) = std::env::var("RECON_SAMPLE_CAP") {
            if let Ok(cap) = raw.parse() {
                config.sample_cap = cap;
            }
        }
        config
    }
}

/// Split a comma-separated address list, dropping empty segments.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
