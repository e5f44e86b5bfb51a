//! Headless engine for the Warden agent.
//!
//! Runs one agent against the in-memory sandbox host: a scripted build
//! order feeds the resource scheduler while seeded raids exercise the
//! defense roster.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `$WARDEN_CONFIG` or `warden-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the starting sandbox world
//! 4. Run the skirmish for the configured number of turns
//! 5. Write the agent snapshot, if a path is configured

mod error;
mod skirmish;

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;
use warden_core::AgentConfig;

use crate::error::EngineError;
use crate::skirmish::Skirmish;

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "WARDEN_CONFIG";

/// Configuration file used when `WARDEN_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "warden-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, logging setup or the snapshot write
/// fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (config, source) = load_config()?;
    init_tracing(&config)?;

    info!(
        config = source.as_deref().unwrap_or("defaults"),
        turns = config.sandbox.turns,
        seed = config.sandbox.seed,
        groups = config.scheduler.groups.len(),
        "warden-engine starting"
    );

    let mut skirmish = Skirmish::new(config.clone());
    let summary = skirmish.run();

    info!(
        turns = summary.turns,
        plans_started = summary.plans_started,
        raids = summary.raids,
        raiders_killed = summary.raiders_killed,
        units_lost = summary.units_lost,
        own_entities = summary.own_entities,
        "Skirmish finished"
    );

    if let Some(path) = &config.sandbox.snapshot_path {
        let json = skirmish.snapshot().to_json().map_err(EngineError::from)?;
        std::fs::write(path, json).map_err(EngineError::from)?;
        info!(path = %path, "Snapshot saved");
    }

    info!("warden-engine shutdown complete");
    Ok(())
}

/// Load configuration. A missing default file falls back to defaults; a
/// missing file named by `WARDEN_CONFIG` is an error.
fn load_config() -> Result<(AgentConfig, Option<String>), EngineError> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        let config = AgentConfig::from_file(&PathBuf::from(&path))?;
        return Ok((config, Some(path)));
    }
    let path = PathBuf::from(DEFAULT_CONFIG_PATH);
    if path.exists() {
        let config = AgentConfig::from_file(&path)?;
        Ok((config, Some(DEFAULT_CONFIG_PATH.to_owned())))
    } else {
        Ok((AgentConfig::default(), None))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(config: &AgentConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if config.logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| EngineError::Logging {
        message: e.to_string(),
    })
}
