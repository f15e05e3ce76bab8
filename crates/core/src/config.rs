use crate::schema::RepairProtocol;
use anyhow::Context;
use std::env;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub tension_significance_threshold: f64,
    pub monitor_window_capacity: usize,
    pub drift_window_capacity: usize,
    pub deviation_threshold: f64,
    pub coherence_threshold: f64,
    pub value_misalignment_threshold: f64,
    pub relationship_integrity_threshold: f64,
    pub restoration_strength: f64,
    pub alert_after_consecutive_failures: u32,
    pub vertex_timeout_secs: u64,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let tension_significance_threshold = env_f64("PENTAGRAM_TENSION_THRESHOLD", 0.2)?;
        require_unit_range(
            "PENTAGRAM_TENSION_THRESHOLD",
            tension_significance_threshold,
        )?;

        let monitor_window_capacity = env_usize("PENTAGRAM_MONITOR_WINDOW", 100)?;
        require_positive_usize("PENTAGRAM_MONITOR_WINDOW", monitor_window_capacity)?;

        let drift_window_capacity = env_usize("PENTAGRAM_DRIFT_WINDOW", 50)?;
        require_positive_usize("PENTAGRAM_DRIFT_WINDOW", drift_window_capacity)?;

        let deviation_threshold = env_f64("PENTAGRAM_DEVIATION_THRESHOLD", 0.2)?;
        require_unit_range("PENTAGRAM_DEVIATION_THRESHOLD", deviation_threshold)?;

        let coherence_threshold = env_f64("PENTAGRAM_COHERENCE_THRESHOLD", 0.8)?;
        require_unit_range("PENTAGRAM_COHERENCE_THRESHOLD", coherence_threshold)?;

        let value_misalignment_threshold =
            env_f64("PENTAGRAM_VALUE_MISALIGNMENT_THRESHOLD", 0.15)?;
        require_unit_range(
            "PENTAGRAM_VALUE_MISALIGNMENT_THRESHOLD",
            value_misalignment_threshold,
        )?;

        let relationship_integrity_threshold =
            env_f64("PENTAGRAM_RELATIONSHIP_INTEGRITY_THRESHOLD", 0.9)?;
        require_unit_range(
            "PENTAGRAM_RELATIONSHIP_INTEGRITY_THRESHOLD",
            relationship_integrity_threshold,
        )?;

        let restoration_strength = env_f64("PENTAGRAM_RESTORATION_STRENGTH", 0.8)?;
        require_unit_range("PENTAGRAM_RESTORATION_STRENGTH", restoration_strength)?;

        let alert_after_consecutive_failures =
            env::var("PENTAGRAM_ALERT_AFTER_FAILURES")
                .unwrap_or_else(|_| "3".to_string())
                .parse::<u32>()
                .context("Failed to parse PENTAGRAM_ALERT_AFTER_FAILURES")?;
        if alert_after_consecutive_failures == 0 {
            anyhow::bail!("PENTAGRAM_ALERT_AFTER_FAILURES must be at least 1");
        }

        let vertex_timeout_secs = env::var("PENTAGRAM_VERTEX_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .context("Failed to parse PENTAGRAM_VERTEX_TIMEOUT_SECS")?;
        if vertex_timeout_secs == 0 || vertex_timeout_secs > 300 {
            anyhow::bail!(
                "PENTAGRAM_VERTEX_TIMEOUT_SECS must be between 1 and 300 (got {})",
                vertex_timeout_secs
            );
        }

        Ok(Self {
            tension_significance_threshold,
            monitor_window_capacity,
            drift_window_capacity,
            deviation_threshold,
            coherence_threshold,
            value_misalignment_threshold,
            relationship_integrity_threshold,
            restoration_strength,
            alert_after_consecutive_failures,
            vertex_timeout_secs,
        })
    }
}

impl Default for AppConfig {
    /// Defaults matching every threshold named in the spec; never fails,
    /// unlike `load()` which validates environment overrides.
    fn default() -> Self {
        Self {
            tension_significance_threshold: 0.2,
            monitor_window_capacity: 100,
            drift_window_capacity: 50,
            deviation_threshold: 0.2,
            coherence_threshold: 0.8,
            value_misalignment_threshold: 0.15,
            relationship_integrity_threshold: 0.9,
            restoration_strength: 0.8,
            alert_after_consecutive_failures: 3,
            vertex_timeout_secs: 30,
        }
    }
}

impl From<&AppConfig> for RepairProtocol {
    /// Scar documents that omit `repair_protocol` entirely, or individual
    /// fields of it, fall back to these config-driven defaults rather than
    /// the hardcoded spec constants — letting an operator retune repair
    /// sensitivity without editing the identity document itself.
    fn from(config: &AppConfig) -> Self {
        Self {
            deviation_threshold: config.deviation_threshold,
            coherence_threshold: config.coherence_threshold,
            value_misalignment_threshold: config.value_misalignment_threshold,
            relationship_integrity_threshold: config.relationship_integrity_threshold,
            restoration_strength: config.restoration_strength,
            alert_ryan_after_failures: config.alert_after_consecutive_failures,
        }
    }
}

fn env_f64(key: &str, default: f64) -> anyhow::Result<f64> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<f64>()
            .with_context(|| format!("Failed to parse {key}")),
        Err(_) => Ok(default),
    }
}

fn env_usize(key: &str, default: usize) -> anyhow::Result<usize> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("Failed to parse {key}")),
        Err(_) => Ok(default),
    }
}

fn require_unit_range(key: &str, value: f64) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&value) {
        anyhow::bail!("{key} must be between 0.0 and 1.0 (got {value})");
    }
    Ok(())
}

fn require_positive_usize(key: &str, value: usize) -> anyhow::Result<()> {
    if value == 0 {
        anyhow::bail!("{key} must be at least 1");
    }
    Ok(())
}
