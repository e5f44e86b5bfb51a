//! Configuration loading and typed config structures for the Warden agent.
//!
//! The canonical configuration lives in `warden-config.yaml`. This module
//! defines strongly-typed structs that mirror the YAML structure and a
//! loader that reads and validates the file. Every field has a default, so
//! an empty document yields a playable configuration.
//!
//! The numeric policy knobs (saturation caps, defense ratio, producer
//! scoring weights, cooldowns) live here rather than inline in the
//! algorithms that use them.

use std::path::Path;

use serde::Deserialize;

use warden_types::InfeasibleReason;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The document parsed but describes an unusable configuration.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentConfig {
    /// Demand groups and their priorities.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Retry cooldowns for infeasible constructions.
    #[serde(default)]
    pub eligibility: EligibilityConfig,

    /// Threat assignment policy.
    #[serde(default)]
    pub army: ArmyConfig,

    /// Producer selection weights.
    #[serde(default)]
    pub production: ProductionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Headless sandbox run parameters.
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

impl AgentConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::BTreeSet::new();
        for group in &self.scheduler.groups {
            if group.name.is_empty() {
                return Err(ConfigError::Invalid {
                    reason: "demand group names must not be empty".to_owned(),
                });
            }
            if !seen.insert(group.name.as_str()) {
                return Err(ConfigError::Invalid {
                    reason: format!("duplicate demand group '{}'", group.name),
                });
            }
        }
        if self.army.heavy_hard_cap < self.army.hard_cap {
            return Err(ConfigError::Invalid {
                reason: "army.heavy_hard_cap must be at least army.hard_cap".to_owned(),
            });
        }
        if !(self.army.defense_ratio.is_finite() && self.army.defense_ratio > 0.0) {
            return Err(ConfigError::Invalid {
                reason: "army.defense_ratio must be a positive number".to_owned(),
            });
        }
        Ok(())
    }
}

/// Demand group layout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Groups created at agent start, in allocation order.
    #[serde(default = "default_groups")]
    pub groups: Vec<GroupConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            groups: default_groups(),
        }
    }
}

/// One demand group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupConfig {
    /// Unique group name.
    pub name: String,
    /// Share weight in the proportional distribution. Zero starves the group.
    pub priority: u32,
}

/// Cooldowns (in simulation seconds) applied when a construction is found
/// infeasible, keyed by reason.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EligibilityConfig {
    /// No valid placement.
    #[serde(default = "default_no_room_cooldown")]
    pub no_room_cooldown_secs: f64,
    /// No capable producer.
    #[serde(default = "default_no_builder_cooldown")]
    pub no_builder_cooldown_secs: f64,
    /// Prerequisite not met.
    #[serde(default = "default_locked_cooldown")]
    pub locked_cooldown_secs: f64,
    /// Build limit reached.
    #[serde(default = "default_limit_cooldown")]
    pub limit_cooldown_secs: f64,
}

impl EligibilityConfig {
    /// Cooldown for `reason`.
    pub const fn cooldown_for(&self, reason: InfeasibleReason) -> f64 {
        match reason {
            InfeasibleReason::NoRoom => self.no_room_cooldown_secs,
            InfeasibleReason::NoBuilder => self.no_builder_cooldown_secs,
            InfeasibleReason::Locked => self.locked_cooldown_secs,
            InfeasibleReason::LimitReached => self.limit_cooldown_secs,
        }
    }
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            no_room_cooldown_secs: default_no_room_cooldown(),
            no_builder_cooldown_secs: default_no_builder_cooldown(),
            locked_cooldown_secs: default_locked_cooldown(),
            limit_cooldown_secs: default_limit_cooldown(),
        }
    }
}

/// Threat assignment policy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArmyConfig {
    /// Maximum defenders against an ordinary target.
    #[serde(default = "default_hard_cap")]
    pub hard_cap: usize,
    /// Maximum defenders against a hero or siege target.
    #[serde(default = "default_heavy_hard_cap")]
    pub heavy_hard_cap: usize,
    /// Targets with at most this many defenders are preferred.
    #[serde(default = "default_soft_cap")]
    pub soft_cap: usize,
    /// Own strength needed per unit of foe strength before no more
    /// defenders are requested.
    #[serde(default = "default_defense_ratio")]
    pub defense_ratio: f64,
    /// Whether defenders may capture capturable targets.
    #[serde(default = "default_true")]
    pub allow_capture: bool,
    /// Armies whose centres are closer than this merge into one.
    #[serde(default = "default_merge_distance")]
    pub merge_distance: f64,
}

impl Default for ArmyConfig {
    fn default() -> Self {
        Self {
            hard_cap: default_hard_cap(),
            heavy_hard_cap: default_heavy_hard_cap(),
            soft_cap: default_soft_cap(),
            defense_ratio: default_defense_ratio(),
            allow_capture: true,
            merge_distance: default_merge_distance(),
        }
    }
}

/// Producer scoring for training plans. Lower scores win; the base score
/// is the producer's queue length.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProductionConfig {
    /// Added for civic centres when training non-support units.
    #[serde(default = "default_civic_penalty")]
    pub civic_penalty: f64,
    /// Added for producers near an invading army when training support units.
    #[serde(default = "default_invasion_penalty")]
    pub invasion_penalty: f64,
    /// Added when the plan asks for a region the producer is not in.
    #[serde(default = "default_wrong_region_penalty")]
    pub wrong_region_penalty: f64,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            civic_penalty: default_civic_penalty(),
            invasion_penalty: default_invasion_penalty(),
            wrong_region_penalty: default_wrong_region_penalty(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Parameters for the headless sandbox run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SandboxConfig {
    /// Number of turns to simulate.
    #[serde(default = "default_turns")]
    pub turns: u64,
    /// Simulated seconds per turn.
    #[serde(default = "default_turn_seconds")]
    pub turn_seconds: f64,
    /// Seed for scripted raids.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Where to write the final agent snapshot, if anywhere.
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            turns: default_turns(),
            turn_seconds: default_turn_seconds(),
            seed: default_seed(),
            snapshot_path: None,
        }
    }
}

fn default_groups() -> Vec<GroupConfig> {
    [
        ("villager", 30),
        ("citizen_soldier", 60),
        ("house", 350),
        ("dropsite", 200),
        ("economic_building", 90),
        ("military_building", 130),
        ("defense_building", 70),
        ("civic_centre", 950),
        ("emergency", 1000),
    ]
    .into_iter()
    .map(|(name, priority)| GroupConfig {
        name: name.to_owned(),
        priority,
    })
    .collect()
}

const fn default_no_room_cooldown() -> f64 {
    90.0
}

const fn default_no_builder_cooldown() -> f64 {
    60.0
}

const fn default_locked_cooldown() -> f64 {
    120.0
}

const fn default_limit_cooldown() -> f64 {
    180.0
}

const fn default_hard_cap() -> usize {
    5
}

const fn default_heavy_hard_cap() -> usize {
    8
}

const fn default_soft_cap() -> usize {
    2
}

const fn default_defense_ratio() -> f64 {
    1.4
}

const fn default_merge_distance() -> f64 {
    60.0
}

const fn default_civic_penalty() -> f64 {
    10.0
}

const fn default_invasion_penalty() -> f64 {
    50.0
}

const fn default_wrong_region_penalty() -> f64 {
    30.0
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_turns() -> u64 {
    240
}

const fn default_turn_seconds() -> f64 {
    1.0
}

const fn default_seed() -> u64 {
    42
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.army.hard_cap, 5);
        assert_eq!(config.army.heavy_hard_cap, 8);
        assert_eq!(config.army.soft_cap, 2);
        assert!(config.scheduler.groups.iter().any(|g| g.name == "house"));
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = AgentConfig::parse("{}").unwrap();
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn partial_override() {
        let yaml = r"
army:
  hard_cap: 4
  defense_ratio: 2.0
scheduler:
  groups:
    - name: workers
      priority: 3
    - name: towers
      priority: 1
";
        let config = AgentConfig::parse(yaml).unwrap();
        assert_eq!(config.army.hard_cap, 4);
        assert_eq!(config.army.heavy_hard_cap, 8);
        assert_eq!(config.scheduler.groups.len(), 2);
        assert!(config.army.allow_capture);
    }

    #[test]
    fn duplicate_groups_rejected() {
        let yaml = r"
scheduler:
  groups:
    - name: houses
      priority: 3
    - name: houses
      priority: 1
";
        assert!(matches!(
            AgentConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn inverted_caps_rejected() {
        let yaml = "army:\n  hard_cap: 9\n";
        assert!(AgentConfig::parse(yaml).is_err());
    }

    #[test]
    fn cooldown_lookup_by_reason() {
        let config = EligibilityConfig::default();
        assert!((config.cooldown_for(InfeasibleReason::NoRoom) - 90.0).abs() < f64::EPSILON);
        assert!((config.cooldown_for(InfeasibleReason::LimitReached) - 180.0).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(matches!(
            AgentConfig::parse("army: [unclosed"),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
