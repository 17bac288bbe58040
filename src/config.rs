//! Matcher and mutator configuration.
//!
//! Thresholds, noise tokens and aliases live here rather than in code so the
//! correlation can be tuned per deployment without a rebuild.
use crate::model::MatchSignal;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Current schema version for the config file.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;
/// Default file name of a component constructor inside an app directory.
pub const DEFAULT_DOCUMENT_FILE_NAME: &str = "component-constructor.yaml";

fn default_schema_version() -> u32 {
    CONFIG_SCHEMA_VERSION
}

fn default_min_score() -> f64 {
    0.50
}

fn default_noise_tokens() -> Vec<String> {
    ["helm", "chart", "opendesk"]
        .iter()
        .map(|token| token.to_string())
        .collect()
}

fn default_aliases() -> BTreeMap<String, String> {
    [
        ("collabora-online", "collabora"),
        ("clamav-simple", "clamav"),
        (
            "matrix-user-verification-service",
            "matrix-user-verification",
        ),
    ]
    .iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

fn default_document_file_name() -> String {
    DEFAULT_DOCUMENT_FILE_NAME.to_string()
}

/// Root configuration.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Matches scoring below this are reported as unmatched.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_noise_tokens")]
    pub noise_tokens: Vec<String>,
    /// Normalized key → replacement key, applied after noise removal.
    #[serde(default = "default_aliases")]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub fuzzy: FuzzyConfig,
    #[serde(default)]
    pub signal_scores: SignalScores,
    #[serde(default = "default_document_file_name")]
    pub document_file_name: String,
    /// Coerce synthesized versions into semantic versions.
    #[serde(default)]
    pub semver_versions: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            min_score: default_min_score(),
            noise_tokens: default_noise_tokens(),
            aliases: default_aliases(),
            fuzzy: FuzzyConfig::default(),
            signal_scores: SignalScores::default(),
            document_file_name: default_document_file_name(),
            semver_versions: false,
        }
    }
}

/// Tuning for the fuzzy chart signal.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct FuzzyConfig {
    /// A single-token subset only counts when the token is at least this long.
    pub min_token_len: usize,
    /// Levenshtein fallback between joined keys.
    pub max_edit_distance: usize,
    /// Both keys must be at least this long for the edit-distance fallback.
    pub min_key_len: usize,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            min_token_len: 4,
            max_edit_distance: 2,
            min_key_len: 5,
        }
    }
}

/// Score assigned to each signal.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct SignalScores {
    pub exact_chart: f64,
    pub fuzzy_chart: f64,
    pub path_hint: f64,
    pub app_instance: f64,
}

impl Default for SignalScores {
    fn default() -> Self {
        Self {
            exact_chart: 1.00,
            fuzzy_chart: 0.75,
            path_hint: 0.60,
            app_instance: 0.50,
        }
    }
}

impl SignalScores {
    pub fn score(&self, signal: MatchSignal) -> f64 {
        match signal {
            MatchSignal::ExactChart => self.exact_chart,
            MatchSignal::FuzzyChart => self.fuzzy_chart,
            MatchSignal::PathHint => self.path_hint,
            MatchSignal::AppInstance => self.app_instance,
        }
    }
}

/// Load a config file, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    let Some(path) = path else {
        return Ok(SyncConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let config: SyncConfig = if text.trim().is_empty() {
        SyncConfig::default()
    } else {
        serde_yaml::from_str(&text).with_context(|| format!("parse config {}", path.display()))?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Render the default config as YAML for `config` and for new setups.
pub fn config_stub() -> Result<String> {
    serde_yaml::to_string(&SyncConfig::default()).context("serialize config stub")
}

/// Validate schema version, score ranges and the document file name.
pub fn validate_config(config: &SyncConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    check_unit_range("min_score", config.min_score)?;
    for signal in MatchSignal::ALL {
        check_unit_range(
            &format!("signal_scores.{signal}"),
            config.signal_scores.score(signal),
        )?;
    }
    let name = config.document_file_name.trim();
    if name.is_empty() {
        return Err(anyhow!("document_file_name must be non-empty"));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(anyhow!(
            "document_file_name must be a bare file name (got {name:?})"
        ));
    }
    if config
        .noise_tokens
        .iter()
        .any(|token| token.trim().is_empty())
    {
        return Err(anyhow!("noise_tokens entries must be non-empty"));
    }
    Ok(())
}

fn check_unit_range(label: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        return Err(anyhow!("{label} must be within [0, 1] (got {value})"));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
