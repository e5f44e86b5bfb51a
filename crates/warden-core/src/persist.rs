//! Save/load of the agent's decision state.
//!
//! The host stores the snapshot as an opaque text blob. Everything the
//! agent cannot rebuild from the game state on load goes in: queued plans
//! with their escrow, eligibility cooldowns and the defense roster.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::defense::DefenseRoster;
use crate::eligibility::BuildEligibilityCache;
use crate::scheduler::ResourceScheduler;

/// Snapshot format version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors that can occur while saving or restoring a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// JSON encoding or decoding failed.
    #[error("snapshot serialization failed: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The snapshot was written by an incompatible build.
    #[error("unsupported snapshot version {found} (expected {expected})")]
    Version {
        /// Version found in the blob.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },
}

/// Everything the agent needs to resume after a load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Format version.
    pub version: u32,
    /// Turn the snapshot was taken at.
    pub turn: u64,
    /// Simulation time the snapshot was taken at.
    pub time: f64,
    /// Demand groups, queued plans and escrow.
    pub scheduler: ResourceScheduler,
    /// Producer counts and cooldowns.
    pub eligibility: BuildEligibilityCache,
    /// Defense armies.
    pub roster: DefenseRoster,
}

impl AgentSnapshot {
    /// Capture the current state.
    pub fn capture(
        turn: u64,
        time: f64,
        scheduler: &ResourceScheduler,
        eligibility: &BuildEligibilityCache,
        roster: &DefenseRoster,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            turn,
            time,
            scheduler: scheduler.clone(),
            eligibility: eligibility.clone(),
            roster: roster.clone(),
        }
    }

    /// Encode as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, PersistError> {
        let json = serde_json::to_string_pretty(self)?;
        info!(turn = self.turn, bytes = json.len(), "Agent snapshot written");
        Ok(json)
    }

    /// Decode a blob produced by [`AgentSnapshot::to_json`].
    pub fn from_json(blob: &str) -> Result<Self, PersistError> {
        let snapshot: Self = serde_json::from_str(blob)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PersistError::Version {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        info!(turn = snapshot.turn, "Agent snapshot restored");
        Ok(snapshot)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use warden_types::{EntityId, InfeasibleReason, PlayerId, ResourceKind, Resources, TemplateId};

    use super::*;
    use crate::config::SchedulerConfig;
    use crate::plan::{Plan, TrainingMetadata};

    #[test]
    fn snapshot_round_trip() {
        let mut scheduler = ResourceScheduler::new(&SchedulerConfig::default());
        let cost = Resources::from_pairs([(ResourceKind::Food, 50)]);
        scheduler.add_plan(
            "villager",
            0,
            Plan::training("units/worker", cost, 2, TrainingMetadata::default()),
        );
        let mut eligibility = BuildEligibilityCache::new();
        eligibility.mark_infeasible(
            &TemplateId::from("structures/tower"),
            3.0,
            60.0,
            InfeasibleReason::Locked,
        );
        let mut roster = DefenseRoster::new();
        let army = roster.create_army();
        if let Some(defense) = roster.army_mut(army) {
            defense.army_mut().add_foe(&warden_types::EntityInfo::new(
                EntityId(77),
                "units/raider",
                PlayerId(2),
            ));
        }

        let snapshot = AgentSnapshot::capture(12, 6.0, &scheduler, &eligibility, &roster);
        let restored = AgentSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(restored.roster.army_of_foe(EntityId(77)), Some(army));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let snapshot = AgentSnapshot::capture(
            0,
            0.0,
            &ResourceScheduler::default(),
            &BuildEligibilityCache::new(),
            &DefenseRoster::new(),
        );
        let blob = snapshot
            .to_json()
            .unwrap()
            .replacen("\"version\": 1", "\"version\": 99", 1);
        assert!(matches!(
            AgentSnapshot::from_json(&blob),
            Err(PersistError::Version { found: 99, .. })
        ));
    }
}
