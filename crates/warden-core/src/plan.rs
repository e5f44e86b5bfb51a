//! Plans: single queued build or train orders.
//!
//! A plan is created when the strategic layer decides it wants more of a
//! template, waits in a [`DemandGroup`] until its escrow covers the cost,
//! and is then started against a chosen producer.
//!
//! ```text
//! Queued --start()--> Started --host accepts--> Committed
//!    |                   |
//!    +----cancel()-------+--host refuses--> Queued (retried later)
//! ```
//!
//! While queued, a unit plan can absorb more quantity ([`Plan::add_item`])
//! up to its merge cap instead of spawning a duplicate plan.
//!
//! Plans persist as an opaque JSON record ([`Plan::serialize`]) holding
//! category, template, id, metadata, unit cost, quantity and merge cap.
//!
//! [`DemandGroup`]: crate::demand::DemandGroup

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use warden_types::{
    EntityId, EntityInfo, InfeasibleReason, PlanCategory, PlanId, PlanState, Position, Resources,
    TemplateId, UnitClass,
};

use crate::context::AgentContext;
use crate::eligibility::BuildEligibilityCache;
use crate::host::{CommandError, CommandSink, GameQuery};

/// Default merge cap for unit plans.
pub const DEFAULT_MAX_MERGE: u32 = 5;

/// Errors that can occur while starting or restoring a plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// The plan is not in the `Queued` state.
    #[error("plan {id} is {state:?}, not queued")]
    NotQueued {
        /// The plan.
        id: PlanId,
        /// Its current state.
        state: PlanState,
    },

    /// The plan cannot be produced right now.
    #[error("{template} is infeasible: {reason}")]
    Infeasible {
        /// The template that could not be produced.
        template: TemplateId,
        /// Why.
        reason: InfeasibleReason,
    },

    /// The host refused the order.
    #[error("host refused order: {source}")]
    Command {
        /// The underlying command error.
        #[from]
        source: CommandError,
    },

    /// The serialized record is malformed.
    #[error("plan record is invalid: {reason}")]
    InvalidRecord {
        /// What is wrong with it.
        reason: String,
    },

    /// JSON encoding or decoding failed.
    #[error("plan serialization failed: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Hints attached to a unit plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    /// Role the trained units take on (e.g. `worker`, `defender`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Producer the units must come from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trainer: Option<EntityId>,
    /// Accessibility region the producer should be in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<u32>,
    /// Base the units belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<u32>,
}

/// Hints attached to a building plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingMetadata {
    /// Preferred placement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Placement rotation in radians.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    /// Base the structure belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<u32>,
    /// Accessibility region to build in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<u32>,
}

/// Category-specific plan metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanMetadata {
    /// Metadata of a unit plan.
    Training(TrainingMetadata),
    /// Metadata of a building plan.
    Building(BuildingMetadata),
}

impl PlanMetadata {
    /// The category implied by this metadata.
    pub const fn category(&self) -> PlanCategory {
        match self {
            Self::Training(_) => PlanCategory::Unit,
            Self::Building(_) => PlanCategory::Building,
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// A single queued build or train order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    id: PlanId,
    template: TemplateId,
    unit_cost: Resources,
    quantity: u32,
    max_merge: u32,
    metadata: PlanMetadata,
    state: PlanState,
}

impl Plan {
    /// A unit plan for `quantity` units at `unit_cost` each.
    pub fn training(
        template: impl Into<TemplateId>,
        unit_cost: Resources,
        quantity: u32,
        metadata: TrainingMetadata,
    ) -> Self {
        let quantity = quantity.max(1);
        Self {
            id: PlanId::new(),
            template: template.into(),
            unit_cost,
            quantity,
            max_merge: DEFAULT_MAX_MERGE.max(quantity),
            metadata: PlanMetadata::Training(metadata),
            state: PlanState::Queued,
        }
    }

    /// A building plan for one structure.
    pub fn building(
        template: impl Into<TemplateId>,
        cost: Resources,
        metadata: BuildingMetadata,
    ) -> Self {
        Self {
            id: PlanId::new(),
            template: template.into(),
            unit_cost: cost,
            quantity: 1,
            max_merge: 1,
            metadata: PlanMetadata::Building(metadata),
            state: PlanState::Queued,
        }
    }

    /// Override the merge cap. Never below the current quantity.
    #[must_use]
    pub fn with_max_merge(mut self, max_merge: u32) -> Self {
        self.max_merge = max_merge.max(self.quantity);
        self
    }

    /// Unique plan identifier.
    pub const fn id(&self) -> PlanId {
        self.id
    }

    /// Template to produce.
    pub const fn template(&self) -> &TemplateId {
        &self.template
    }

    /// Unit or building.
    pub const fn category(&self) -> PlanCategory {
        self.metadata.category()
    }

    /// Lifecycle state.
    pub const fn state(&self) -> PlanState {
        self.state
    }

    /// Number of items ordered.
    pub const fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Merge cap.
    pub const fn max_merge(&self) -> u32 {
        self.max_merge
    }

    /// Cost of one item.
    pub const fn unit_cost(&self) -> &Resources {
        &self.unit_cost
    }

    /// Cost of the whole order.
    pub fn cost(&self) -> Resources {
        self.unit_cost.scaled(self.quantity)
    }

    /// Category-specific metadata.
    pub const fn metadata(&self) -> &PlanMetadata {
        &self.metadata
    }

    /// Whether the plan is queued and at least one producer is available.
    pub fn can_start(&self, eligibility: &BuildEligibilityCache, now: f64) -> bool {
        self.state == PlanState::Queued && eligibility.is_currently_buildable(&self.template, now)
    }

    /// Whether `other` could be folded into this plan.
    pub fn is_mergeable_with(&self, other: &Self) -> bool {
        self.state == PlanState::Queued
            && self.category() == PlanCategory::Unit
            && self.template == other.template
            && self.metadata == other.metadata
            && self.unit_cost == other.unit_cost
            && self.quantity < self.max_merge
    }

    /// Grow a queued plan by `amount`, up to the merge cap. Returns the
    /// part of `amount` that did not fit.
    pub fn add_item(&mut self, amount: u32) -> u32 {
        if self.state != PlanState::Queued {
            warn!(plan = %self.id, state = ?self.state, "Cannot merge into a plan that is not queued");
            return amount;
        }
        let room = self.max_merge.saturating_sub(self.quantity);
        let merged = room.min(amount);
        self.quantity = self.quantity.saturating_add(merged);
        amount.saturating_sub(merged)
    }

    /// Set the quantity of a plan that is about to be queued.
    pub(crate) fn set_quantity(&mut self, quantity: u32) {
        self.quantity = quantity.max(1);
        self.max_merge = self.max_merge.max(self.quantity);
    }

    /// Discard the plan. Returns `false` if it was already committed or
    /// cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            PlanState::Queued | PlanState::Started => {
                self.state = PlanState::Cancelled;
                true
            }
            PlanState::Committed | PlanState::Cancelled => false,
        }
    }

    /// Choose a producer and issue the order. On success the plan is
    /// `Committed` and the chosen producer is returned; on failure it is
    /// back in `Queued`.
    pub fn start(
        &mut self,
        ctx: &AgentContext,
        game: &dyn GameQuery,
        commands: &mut dyn CommandSink,
    ) -> Result<EntityId, PlanError> {
        if self.state != PlanState::Queued {
            return Err(PlanError::NotQueued {
                id: self.id,
                state: self.state,
            });
        }
        self.state = PlanState::Started;

        let result = match &self.metadata {
            PlanMetadata::Training(meta) => self.start_training(ctx, game, commands, meta),
            PlanMetadata::Building(meta) => self.start_building(ctx, game, commands, meta),
        };

        match result {
            Ok(producer) => {
                self.state = PlanState::Committed;
                info!(
                    plan = %self.id,
                    template = %self.template,
                    quantity = self.quantity,
                    %producer,
                    "Plan committed"
                );
                Ok(producer)
            }
            Err(e) => {
                self.state = PlanState::Queued;
                debug!(plan = %self.id, template = %self.template, error = %e, "Plan start failed");
                Err(e)
            }
        }
    }

    fn start_training(
        &self,
        ctx: &AgentContext,
        game: &dyn GameQuery,
        commands: &mut dyn CommandSink,
        meta: &TrainingMetadata,
    ) -> Result<EntityId, PlanError> {
        let producer = match meta.trainer {
            Some(trainer) => game
                .entity(trainer)
                .filter(|e| e.owner == ctx.player && e.can_produce(&self.template))
                .map(|e| e.id),
            None => self.select_trainer(ctx, game, meta),
        };
        let Some(producer) = producer else {
            return Err(PlanError::Infeasible {
                template: self.template.clone(),
                reason: InfeasibleReason::NoBuilder,
            });
        };
        commands.train(producer, &self.template, self.quantity, meta)?;
        Ok(producer)
    }

    /// Lowest-scoring producer: queue length plus soft penalties. Ties keep
    /// the first producer the host listed.
    fn select_trainer(
        &self,
        ctx: &AgentContext,
        game: &dyn GameQuery,
        meta: &TrainingMetadata,
    ) -> Option<EntityId> {
        let weights = &ctx.config.production;
        let support = game
            .template_classes(&self.template)
            .contains(&UnitClass::Support);

        game.producers_of(ctx.player, &self.template)
            .into_iter()
            .map(|producer| {
                let mut score = f64::from(producer.queue_length);
                if !support && producer.has_class(UnitClass::CivicCentre) {
                    score += weights.civic_penalty;
                }
                if support
                    && producer
                        .position
                        .is_some_and(|p| game.is_near_invading_army(p))
                {
                    score += weights.invasion_penalty;
                }
                if meta
                    .region
                    .is_some_and(|region| producer.access_region != Some(region))
                {
                    score += weights.wrong_region_penalty;
                }
                (producer.id, score)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    fn start_building(
        &self,
        ctx: &AgentContext,
        game: &dyn GameQuery,
        commands: &mut dyn CommandSink,
        meta: &BuildingMetadata,
    ) -> Result<EntityId, PlanError> {
        let builders: Vec<&EntityInfo> = game
            .producers_of(ctx.player, &self.template)
            .into_iter()
            .filter(|b| {
                b.position.is_some()
                    && meta
                        .region
                        .is_none_or(|region| b.access_region == Some(region))
            })
            .collect();
        if builders.is_empty() {
            return Err(PlanError::Infeasible {
                template: self.template.clone(),
                reason: InfeasibleReason::NoBuilder,
            });
        }

        let Some(position) = game.find_placement(&self.template, meta.position) else {
            return Err(PlanError::Infeasible {
                template: self.template.clone(),
                reason: InfeasibleReason::NoRoom,
            });
        };

        let nearest = builders
            .iter()
            .filter_map(|b| b.position.map(|p| (b.id, p.distance_sq(position))))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id);
        let Some(builder) = nearest else {
            return Err(PlanError::Infeasible {
                template: self.template.clone(),
                reason: InfeasibleReason::NoBuilder,
            });
        };

        commands.build(builder, &self.template, position, meta.angle.unwrap_or(0.0))?;
        Ok(builder)
    }

    /// Encode as an opaque JSON record.
    pub fn serialize(&self) -> Result<String, PlanError> {
        Ok(serde_json::to_string(&PlanRecord::from(self))?)
    }

    /// Restore a plan from [`Plan::serialize`] output. The restored plan is
    /// queued.
    pub fn deserialize(blob: &str) -> Result<Self, PlanError> {
        let record: PlanRecord = serde_json::from_str(blob)?;
        Self::try_from(record)
    }
}

/// Wire form of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PlanRecord {
    category: PlanCategory,
    template: TemplateId,
    id: PlanId,
    metadata: PlanMetadata,
    cost: Resources,
    quantity: u32,
    max_merge: u32,
}

impl From<&Plan> for PlanRecord {
    fn from(plan: &Plan) -> Self {
        Self {
            category: plan.category(),
            template: plan.template.clone(),
            id: plan.id,
            metadata: plan.metadata.clone(),
            cost: plan.unit_cost.clone(),
            quantity: plan.quantity,
            max_merge: plan.max_merge,
        }
    }
}

impl TryFrom<PlanRecord> for Plan {
    type Error = PlanError;

    fn try_from(record: PlanRecord) -> Result<Self, Self::Error> {
        if record.category != record.metadata.category() {
            return Err(PlanError::InvalidRecord {
                reason: format!(
                    "category {:?} does not match {:?} metadata",
                    record.category,
                    record.metadata.category()
                ),
            });
        }
        if record.quantity == 0 {
            return Err(PlanError::InvalidRecord {
                reason: "quantity must be at least 1".to_owned(),
            });
        }
        if record.max_merge < record.quantity {
            return Err(PlanError::InvalidRecord {
                reason: format!(
                    "max_merge {} is below quantity {}",
                    record.max_merge, record.quantity
                ),
            });
        }
        Ok(Self {
            id: record.id,
            template: record.template,
            unit_cost: record.cost,
            quantity: record.quantity,
            max_merge: record.max_merge,
            metadata: record.metadata,
            state: PlanState::Queued,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use warden_types::{EntityInfo, PlayerId, ResourceKind};

    use super::*;
    use crate::config::AgentConfig;
    use crate::host::{Command, CommandBuffer};
    use crate::sandbox::SandboxWorld;

    const ME: PlayerId = PlayerId(1);

    fn food(n: u32) -> Resources {
        Resources::from_pairs([(ResourceKind::Food, n)])
    }

    fn ctx() -> AgentContext {
        AgentContext::new(ME, AgentConfig::default())
    }

    fn worker_plan(quantity: u32) -> Plan {
        Plan::training("units/worker", food(50), quantity, TrainingMetadata::default())
    }

    #[test]
    fn cost_scales_with_quantity() {
        let plan = worker_plan(3);
        assert_eq!(plan.cost(), food(150));
        assert_eq!(plan.category(), PlanCategory::Unit);
    }

    #[test]
    fn add_item_respects_max_merge() {
        let mut plan = worker_plan(2).with_max_merge(4);
        assert_eq!(plan.add_item(3), 1);
        assert_eq!(plan.quantity(), 4);
        assert_eq!(plan.add_item(1), 1);
    }

    #[test]
    fn add_item_refused_after_commit() {
        let mut world = SandboxWorld::new(ME);
        world.spawn(
            EntityInfo::new(EntityId(1), "structures/cc", ME)
                .at(0.0, 0.0)
                .producing([TemplateId::from("units/worker")]),
        );
        let mut plan = worker_plan(1);
        let mut buffer = CommandBuffer::new();
        assert!(plan.start(&ctx(), &world, &mut buffer).is_ok());
        assert_eq!(plan.add_item(2), 2);
        assert_eq!(plan.quantity(), 1);
    }

    #[test]
    fn cancel_is_terminal() {
        let mut plan = worker_plan(1);
        assert!(plan.cancel());
        assert_eq!(plan.state(), PlanState::Cancelled);
        assert!(!plan.cancel());
    }

    #[test]
    fn trainer_with_shortest_queue_wins() {
        let mut world = SandboxWorld::new(ME);
        let mut busy = EntityInfo::new(EntityId(1), "structures/barracks", ME)
            .at(0.0, 0.0)
            .producing([TemplateId::from("units/spearman")]);
        busy.queue_length = 3;
        let idle = EntityInfo::new(EntityId(2), "structures/barracks", ME)
            .at(50.0, 0.0)
            .producing([TemplateId::from("units/spearman")]);
        world.spawn(busy);
        world.spawn(idle);

        let mut plan = Plan::training("units/spearman", food(50), 2, TrainingMetadata::default());
        let mut buffer = CommandBuffer::new();
        let producer = plan.start(&ctx(), &world, &mut buffer).unwrap();
        assert_eq!(producer, EntityId(2));
        assert_eq!(plan.state(), PlanState::Committed);
        assert!(matches!(
            buffer.commands().first(),
            Some(Command::Train { quantity: 2, .. })
        ));
    }

    #[test]
    fn civic_centre_penalized_for_soldiers() {
        let mut world = SandboxWorld::new(ME);
        world.spawn(
            EntityInfo::new(EntityId(1), "structures/cc", ME)
                .at(0.0, 0.0)
                .with_classes([UnitClass::Structure, UnitClass::CivicCentre])
                .producing([TemplateId::from("units/spearman")]),
        );
        let mut barracks = EntityInfo::new(EntityId(2), "structures/barracks", ME)
            .at(10.0, 0.0)
            .producing([TemplateId::from("units/spearman")]);
        barracks.queue_length = 4;
        world.spawn(barracks);

        let mut plan = Plan::training("units/spearman", food(50), 1, TrainingMetadata::default());
        let producer = plan.start(&ctx(), &world, &mut CommandBuffer::new()).unwrap();
        assert_eq!(producer, EntityId(2));
    }

    #[test]
    fn support_units_avoid_invaded_producers() {
        let mut world = SandboxWorld::new(ME);
        world.define_template("units/worker", [UnitClass::Support]);
        world.spawn(
            EntityInfo::new(EntityId(1), "structures/cc", ME)
                .at(0.0, 0.0)
                .producing([TemplateId::from("units/worker")]),
        );
        let mut far = EntityInfo::new(EntityId(2), "structures/cc", ME)
            .at(400.0, 0.0)
            .producing([TemplateId::from("units/worker")]);
        far.queue_length = 2;
        world.spawn(far);
        world.add_invasion(Position::new(5.0, 5.0));

        let mut plan = worker_plan(1);
        let producer = plan.start(&ctx(), &world, &mut CommandBuffer::new()).unwrap();
        assert_eq!(producer, EntityId(2));
    }

    #[test]
    fn no_trainer_is_infeasible_and_stays_queued() {
        let world = SandboxWorld::new(ME);
        let mut plan = worker_plan(1);
        let err = plan.start(&ctx(), &world, &mut CommandBuffer::new());
        assert!(matches!(
            err,
            Err(PlanError::Infeasible {
                reason: InfeasibleReason::NoBuilder,
                ..
            })
        ));
        assert_eq!(plan.state(), PlanState::Queued);
    }

    #[test]
    fn building_without_room_reports_no_room() {
        let mut world = SandboxWorld::new(ME);
        world.spawn(
            EntityInfo::new(EntityId(1), "units/worker", ME)
                .at(0.0, 0.0)
                .producing([TemplateId::from("structures/house")]),
        );
        world.block_placement("structures/house");
        let mut plan = Plan::building("structures/house", food(0), BuildingMetadata::default());
        let err = plan.start(&ctx(), &world, &mut CommandBuffer::new());
        assert!(matches!(
            err,
            Err(PlanError::Infeasible {
                reason: InfeasibleReason::NoRoom,
                ..
            })
        ));
    }

    #[test]
    fn building_uses_nearest_builder() {
        let mut world = SandboxWorld::new(ME);
        for (id, x) in [(1, 100.0), (2, 12.0), (3, -60.0)] {
            world.spawn(
                EntityInfo::new(EntityId(id), "units/worker", ME)
                    .at(x, 0.0)
                    .producing([TemplateId::from("structures/house")]),
            );
        }
        let meta = BuildingMetadata {
            position: Some(Position::new(10.0, 0.0)),
            ..BuildingMetadata::default()
        };
        let mut plan = Plan::building("structures/house", food(0), meta);
        let builder = plan.start(&ctx(), &world, &mut CommandBuffer::new()).unwrap();
        assert_eq!(builder, EntityId(2));
    }

    #[test]
    fn serialize_round_trip() {
        let meta = TrainingMetadata {
            role: Some("worker".to_owned()),
            trainer: None,
            region: Some(3),
            base: Some(1),
        };
        let plan = Plan::training("units/worker", food(50), 3, meta).with_max_merge(6);
        let blob = plan.serialize().unwrap();
        let restored = Plan::deserialize(&blob).unwrap();
        assert_eq!(restored, plan);
        assert_eq!(restored.id(), plan.id());
        assert_eq!(restored.cost(), food(150));
    }

    #[test]
    fn mismatched_category_is_rejected() {
        let plan = Plan::building("structures/house", food(10), BuildingMetadata::default());
        let blob = plan.serialize().unwrap().replace("\"building\",", "\"unit\",");
        assert!(matches!(
            Plan::deserialize(&blob),
            Err(PlanError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn garbage_blob_is_a_json_error() {
        assert!(matches!(
            Plan::deserialize("not json"),
            Err(PlanError::Json { .. })
        ));
    }
}
