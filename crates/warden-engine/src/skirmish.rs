//! A scripted skirmish: one agent, one sandbox, seeded raids.
//!
//! Each turn the sandbox pays income, the build script queues plans, raid
//! parties advance on the base, the defense roster tracks and answers them,
//! and the scheduler commits whatever the escrow now covers. Combat is a
//! coin flip per engaged pair; nothing here models damage.

use std::f64::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use warden_core::{
    AgentConfig, AgentContext, AgentSnapshot, BuildEligibilityCache, BuildingMetadata,
    CommandBuffer, DefenseRoster, GameQuery, Plan, ResourceScheduler, SandboxWorld, TemplateSpec,
    TrainingMetadata, UnitDelta,
};
use warden_types::{EntityId, EntityInfo, PlayerId, Position, ResourceKind, Resources, TemplateId, UnitClass};

/// The agent's player slot.
const AGENT: PlayerId = PlayerId(1);

/// The raiders' player slot.
const RAIDERS: PlayerId = PlayerId(2);

/// Radius of the agent's territory around the civic centre.
const TERRITORY_RADIUS: f64 = 160.0;

/// Distance from the base at which raids appear.
const RAID_SPAWN_DISTANCE: f64 = 260.0;

/// Distance within which the agent notices hostiles.
const VISION_RADIUS: f64 = 220.0;

/// How far raiders move toward the base per turn.
const RAID_SPEED: f64 = 14.0;

/// Chance per turn that a new raid spawns.
const RAID_CHANCE: f64 = 0.05;

/// Chance per turn that an engaged attacker kills its target.
const KILL_CHANCE: f64 = 0.25;

/// Chance per turn that a raider near the base kills an own unit.
const RAIDER_KILL_CHANCE: f64 = 0.08;

/// Distance within which combat resolves.
const MELEE_RANGE: f64 = 40.0;

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Turns simulated.
    pub turns: u64,
    /// Plans the scheduler started.
    pub plans_started: usize,
    /// Raid parties spawned.
    pub raids: usize,
    /// Raiders killed by defenders.
    pub raiders_killed: usize,
    /// Own units killed by raiders.
    pub units_lost: usize,
    /// Own entities alive at the end.
    pub own_entities: usize,
}

/// The agent, its host and the script driving both.
pub struct Skirmish {
    ctx: AgentContext,
    world: SandboxWorld,
    scheduler: ResourceScheduler,
    eligibility: BuildEligibilityCache,
    roster: DefenseRoster,
    rng: StdRng,
    summary: Summary,
}

impl Skirmish {
    /// Build the starting world and a fresh agent.
    pub fn new(config: AgentConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.sandbox.seed);
        let world = starting_world();
        let eligibility = BuildEligibilityCache::rebuild_from(&world, AGENT);
        let scheduler = ResourceScheduler::new(&config.scheduler);
        Self {
            ctx: AgentContext::new(AGENT, config),
            world,
            scheduler,
            eligibility,
            roster: DefenseRoster::new(),
            rng,
            summary: Summary::default(),
        }
    }

    /// Run every configured turn.
    pub fn run(&mut self) -> Summary {
        for _ in 0..self.ctx.config.sandbox.turns {
            self.turn();
        }
        self.summary.own_entities = self.world.entities_of(AGENT).len();
        self.summary
    }

    /// Capture the agent's decision state.
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot::capture(
            self.ctx.turn(),
            self.ctx.time(),
            &self.scheduler,
            &self.eligibility,
            &self.roster,
        )
    }

    fn turn(&mut self) {
        self.ctx.advance(self.ctx.config.sandbox.turn_seconds);
        let turn = self.ctx.turn();

        self.pay_income();
        self.queue_build_order(turn);
        self.advance_raids();
        self.resolve_combat();

        // ---- defense ----
        let mut commands = CommandBuffer::new();
        self.track_hostiles();
        self.roster.merge_nearby(&self.ctx, &self.world);
        let released = self.roster.update_all(&self.ctx, &self.world, &mut commands);
        if !released.is_empty() {
            debug!(turn, released = released.len(), "Defenders back to work");
        }
        let mut idle = self.idle_soldiers();
        self.roster
            .recruit(&self.ctx, &self.world, &mut commands, &mut idle);

        // ---- economy ----
        let stock = self.world.resources();
        let report = self.scheduler.tick(
            &self.ctx,
            &stock,
            &mut self.eligibility,
            &self.world,
            &mut commands,
        );
        self.summary.plans_started = self.summary.plans_started.saturating_add(report.started.len());

        for id in self.world.apply(commands.drain()) {
            if let Some(entity) = self.world.entity(id) {
                self.eligibility.record_unit_change(entity, UnitDelta::Added);
            }
        }
        self.eligibility.prune_expired(self.ctx.time());
        self.summary.turns = turn;

        if turn.is_multiple_of(20) {
            info!(
                turn,
                stock = %self.world.resources(),
                escrow = %self.scheduler.total_escrow(),
                pending = report.pending.len(),
                unclaimed = report.unclaimed.total(),
                armies = self.roster.armies().len(),
                "Turn summary"
            );
        }
    }

    // ---- economy script ----

    fn pay_income(&mut self) {
        let workers = self
            .world
            .entities_of(AGENT)
            .iter()
            .filter(|e| e.has_class(UnitClass::Support))
            .count();
        let workers = u32::try_from(workers).unwrap_or(u32::MAX);
        self.world.gather(&Resources::from_pairs([
            (ResourceKind::Food, workers.saturating_mul(3)),
            (ResourceKind::Wood, workers.saturating_mul(2)),
            (ResourceKind::Stone, workers),
            (ResourceKind::Metal, workers / 2),
        ]));
    }

    fn queue_build_order(&mut self, turn: u64) {
        if turn % 8 == 1 {
            self.queue_unit("villager", "units/worker", 2, "worker");
        }
        if turn % 12 == 4 {
            self.queue_unit("citizen_soldier", "units/spearman", 3, "defender");
        }
        if turn % 30 == 10 {
            self.queue_building("house", "structures/house");
        }
        if turn == 15 {
            self.queue_building("military_building", "structures/barracks");
        }
        if turn % 60 == 40 {
            self.queue_building("defense_building", "structures/tower");
        }
        if turn % 24 == 20 {
            self.queue_unit("citizen_soldier", "units/cavalry", 2, "defender");
        }
    }

    fn queue_unit(&mut self, group: &str, template: &str, quantity: u32, role: &str) {
        let cost = self.unit_cost(template);
        let metadata = TrainingMetadata {
            role: Some(role.to_owned()),
            ..TrainingMetadata::default()
        };
        self.scheduler
            .add_plan(group, 0, Plan::training(template, cost, quantity, metadata));
    }

    fn queue_building(&mut self, group: &str, template: &str) {
        let cost = self.unit_cost(template);
        self.scheduler
            .add_plan(group, 0, Plan::building(template, cost, BuildingMetadata::default()));
    }

    fn unit_cost(&self, template: &str) -> Resources {
        self.world
            .template(&TemplateId::from(template))
            .map(|spec| spec.cost.clone())
            .unwrap_or_default()
    }

    // ---- raid script ----

    fn advance_raids(&mut self) {
        if self.rng.random_bool(RAID_CHANCE) {
            self.spawn_raid();
        }

        let raiders: Vec<EntityId> = self
            .world
            .entities_of(RAIDERS)
            .iter()
            .map(|e| e.id)
            .collect();
        self.world.clear_invasions();
        for id in raiders {
            let Some(entity) = self.world.entity_mut(id) else {
                continue;
            };
            let Some(position) = entity.position else {
                continue;
            };
            let distance = position.distance_sq(Position::default()).sqrt();
            let next = if distance > RAID_SPEED {
                let scale = (distance - RAID_SPEED) / distance;
                Position::new(position.x * scale, position.z * scale)
            } else {
                Position::default()
            };
            entity.position = Some(next);
            if distance < TERRITORY_RADIUS {
                self.world.add_invasion(next);
            }
        }
    }

    fn spawn_raid(&mut self) {
        let size = self.rng.random_range(2..=5_u32);
        let angle = self.rng.random_range(0.0..TAU);
        let centre = Position::new(
            RAID_SPAWN_DISTANCE * angle.cos(),
            RAID_SPAWN_DISTANCE * angle.sin(),
        );
        for i in 0..size {
            let offset = f64::from(i) * 6.0;
            self.world.spawn_template(
                &TemplateId::from("units/raider"),
                RAIDERS,
                Position::new(centre.x + offset, centre.z - offset),
                None,
            );
        }
        self.summary.raids = self.summary.raids.saturating_add(1);
        info!(size, x = centre.x, z = centre.z, "Raid spotted");
    }

    fn track_hostiles(&mut self) {
        let limit = VISION_RADIUS * VISION_RADIUS;
        let visible: Vec<EntityInfo> = self
            .world
            .entities_of(RAIDERS)
            .into_iter()
            .filter(|e| {
                e.position
                    .is_some_and(|p| p.distance_sq(Position::default()) <= limit)
            })
            .cloned()
            .collect();
        for foe in &visible {
            self.roster.track_foe(&self.ctx, foe, &self.world);
        }
    }

    fn idle_soldiers(&self) -> Vec<EntityId> {
        self.world
            .entities_of(AGENT)
            .into_iter()
            .filter(|e| e.has_class(UnitClass::Infantry) || e.has_class(UnitClass::Cavalry))
            .filter(|e| self.roster.army_of_unit(e.id).is_none())
            .map(|e| e.id)
            .collect()
    }

    fn resolve_combat(&mut self) {
        let melee = MELEE_RANGE * MELEE_RANGE;
        let engaged: Vec<(EntityId, EntityId)> = self
            .world
            .entities_of(AGENT)
            .iter()
            .filter_map(|unit| {
                let target = self.world.entity(unit.order_target?)?;
                let (a, b) = (unit.position?, target.position?);
                (target.owner == RAIDERS && a.distance_sq(b) <= melee)
                    .then_some((unit.id, target.id))
            })
            .collect();
        for (unit, target) in engaged {
            if self.world.entity(target).is_none() {
                continue;
            }
            if self.rng.random_bool(KILL_CHANCE) {
                self.world.despawn(target);
                self.summary.raiders_killed = self.summary.raiders_killed.saturating_add(1);
                debug!(%unit, %target, "Raider killed");
            }
        }

        let raiders: Vec<Position> = self
            .world
            .entities_of(RAIDERS)
            .iter()
            .filter_map(|e| e.position)
            .collect();
        for raider in raiders {
            let victim = self
                .world
                .entities_of(AGENT)
                .into_iter()
                .filter(|e| !e.has_class(UnitClass::Structure))
                .filter_map(|e| e.position.map(|p| (e.id, p.distance_sq(raider))))
                .filter(|(_, d)| *d <= melee)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(id, _)| id);
            let Some(victim) = victim else {
                continue;
            };
            if self.rng.random_bool(RAIDER_KILL_CHANCE) {
                self.lose_unit(victim);
            }
        }
    }

    fn lose_unit(&mut self, id: EntityId) {
        let Some(lost) = self.world.despawn(id) else {
            warn!(%id, "Lost unit was already gone");
            return;
        };
        self.eligibility.record_unit_change(&lost, UnitDelta::Removed);
        self.summary.units_lost = self.summary.units_lost.saturating_add(1);
        debug!(%id, template = %lost.template, "Unit lost");
    }
}

/// Templates, territory and starting entities.
fn starting_world() -> SandboxWorld {
    let mut world = SandboxWorld::new(AGENT);
    let spec = |classes: &[UnitClass], cost: &[(ResourceKind, u32)], strength: f64, producible: &[&str]| {
        TemplateSpec {
            classes: classes.iter().copied().collect(),
            cost: Resources::from_pairs(cost.iter().copied()),
            strength,
            producible: producible.iter().map(|t| TemplateId::from(*t)).collect(),
        }
    };

    world.define(
        "units/worker",
        spec(
            &[UnitClass::Support],
            &[(ResourceKind::Food, 50)],
            0.3,
            &["structures/house", "structures/barracks", "structures/tower"],
        ),
    );
    world.define(
        "units/spearman",
        spec(
            &[UnitClass::Infantry],
            &[(ResourceKind::Food, 50), (ResourceKind::Wood, 50)],
            1.0,
            &[],
        ),
    );
    world.define(
        "units/cavalry",
        spec(
            &[UnitClass::Cavalry],
            &[(ResourceKind::Food, 100), (ResourceKind::Metal, 40)],
            1.6,
            &[],
        ),
    );
    world.define(
        "units/raider",
        spec(&[UnitClass::Cavalry], &[], 1.4, &[]),
    );
    world.define(
        "structures/cc",
        spec(
            &[UnitClass::Structure, UnitClass::CivicCentre],
            &[],
            0.0,
            &["units/worker", "units/spearman"],
        ),
    );
    world.define(
        "structures/house",
        spec(
            &[UnitClass::Structure, UnitClass::House],
            &[(ResourceKind::Wood, 75)],
            0.0,
            &[],
        ),
    );
    world.define(
        "structures/barracks",
        spec(
            &[UnitClass::Structure, UnitClass::Barracks],
            &[(ResourceKind::Wood, 200), (ResourceKind::Stone, 100)],
            0.0,
            &["units/spearman", "units/cavalry"],
        ),
    );
    world.define(
        "structures/tower",
        spec(
            &[UnitClass::Structure, UnitClass::Defensive],
            &[(ResourceKind::Wood, 100), (ResourceKind::Stone, 100)],
            2.0,
            &[],
        ),
    );

    world.add_territory(AGENT, Position::default(), TERRITORY_RADIUS);
    world.set_resources(Resources::from_pairs([
        (ResourceKind::Food, 300),
        (ResourceKind::Wood, 300),
        (ResourceKind::Stone, 100),
    ]));
    let cc = TemplateId::from("structures/cc");
    world.spawn_template(&cc, AGENT, Position::default(), Some(0));
    let worker = TemplateId::from("units/worker");
    for i in 0..4_u32 {
        world.spawn_template(&worker, AGENT, Position::new(8.0, f64::from(i) * 4.0), Some(0));
    }
    world
}
