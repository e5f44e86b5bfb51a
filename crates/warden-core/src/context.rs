//! Per-agent context passed into every component update.
//!
//! Holds what used to be reachable from anywhere: which player the agent
//! controls, its configuration and the simulation clock. Components take
//! `&AgentContext` explicitly, so two agents in one process never share
//! state by accident.

use warden_types::PlayerId;

use crate::config::AgentConfig;

/// Identity, configuration and clock of one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentContext {
    /// The player this agent controls.
    pub player: PlayerId,
    /// Loaded configuration.
    pub config: AgentConfig,
    /// Simulation time in seconds.
    time: f64,
    /// Number of turns processed.
    turn: u64,
}

impl AgentContext {
    /// Create a context at time zero, turn zero.
    pub const fn new(player: PlayerId, config: AgentConfig) -> Self {
        Self {
            player,
            config,
            time: 0.0,
            turn: 0,
        }
    }

    /// Current simulation time in seconds.
    pub const fn time(&self) -> f64 {
        self.time
    }

    /// Current turn number.
    pub const fn turn(&self) -> u64 {
        self.turn
    }

    /// Handle the host's tick signal: advance the clock by `elapsed`
    /// seconds and bump the turn counter. Negative or non-finite elapsed
    /// times are ignored for the clock but still count as a turn.
    pub fn advance(&mut self, elapsed: f64) {
        if elapsed.is_finite() && elapsed > 0.0 {
            self.time += elapsed;
        }
        self.turn = self.turn.saturating_add(1);
    }

    /// Jump the clock to an absolute time reported by the host. Time never
    /// moves backwards.
    pub const fn set_time(&mut self, time: f64) {
        if time > self.time {
            self.time = time;
        }
    }
}
