//! Defense armies and the roster that owns them.
//!
//! A [`DefenseArmy`] is an [`Army`] with a danger state:
//!
//! ```text
//!              foes, centroid in own territory
//!   Calm ─────────────────────────────────────> HomeThreatened
//!    │                                              │
//!    │ foes, centroid outside                       │ territory reads safe
//!    v                                              v
//!  Engaged <────────────────────────────────────────┘
//!
//!  any state, no foes left ──> Calm
//! ```
//!
//! The [`DefenseRoster`] allocates army ids, routes newly seen foes to the
//! nearest army, merges armies that drift together and drops the ones whose
//! threat is gone.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use warden_types::{ArmyId, DangerState, EntityId, EntityInfo, Position};

use crate::army::Army;
use crate::context::AgentContext;
use crate::host::{CommandSink, GameQuery};

/// An army with a danger state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefenseArmy {
    army: Army,
    state: DangerState,
}

impl DefenseArmy {
    /// An empty, calm army.
    pub const fn new(id: ArmyId) -> Self {
        Self {
            army: Army::new(id),
            state: DangerState::Calm,
        }
    }

    /// Army identifier.
    pub const fn id(&self) -> ArmyId {
        self.army.id()
    }

    /// The underlying army.
    pub const fn army(&self) -> &Army {
        &self.army
    }

    /// The underlying army, mutably.
    pub const fn army_mut(&mut self) -> &mut Army {
        &mut self.army
    }

    /// Current danger state.
    pub const fn state(&self) -> DangerState {
        self.state
    }

    /// Re-evaluate the army for this turn.
    ///
    /// Foes that vanished or changed hands and own units that died or were
    /// lost are pruned, strengths are re-measured, the danger state steps,
    /// and idle own units are reassigned. When no foes remain every own
    /// unit is released and returned.
    pub fn update(
        &mut self,
        ctx: &AgentContext,
        game: &dyn GameQuery,
        commands: &mut dyn CommandSink,
    ) -> Vec<EntityId> {
        let gone_foes: Vec<EntityId> = self
            .army
            .foes()
            .iter()
            .filter(|id| game.entity(**id).is_none_or(|e| e.owner == ctx.player))
            .copied()
            .collect();
        for foe in gone_foes {
            self.army.remove_foe(foe);
        }
        let gone_own: Vec<EntityId> = self
            .army
            .own()
            .iter()
            .filter(|id| game.entity(**id).is_none_or(|e| e.owner != ctx.player))
            .copied()
            .collect();
        for unit in gone_own {
            self.army.remove_own(unit);
        }

        self.army.recalculate_strengths(game);

        if self.army.foes().is_empty() {
            self.transition(DangerState::Calm);
            let released = self.army.release_all_own();
            if !released.is_empty() {
                debug!(army = %self.id(), released = released.len(), "Threat gone, defenders released");
            }
            return released;
        }

        let next = match self.army.centroid(game) {
            Some(centroid) if game.is_own_territory(ctx.player, centroid) => {
                DangerState::HomeThreatened
            }
            Some(_) => DangerState::Engaged,
            None if self.state == DangerState::Calm => DangerState::Engaged,
            None => self.state,
        };
        self.transition(next);

        for unit in self.army.unassigned_own() {
            self.army.assign_unit(ctx, unit, game, commands);
        }
        Vec::new()
    }

    fn transition(&mut self, next: DangerState) {
        if next != self.state {
            info!(army = %self.id(), from = ?self.state, to = ?next, "Danger state changed");
            self.state = next;
        }
    }

    /// Strength the army still lacks, or `None` when the own units already
    /// outweigh the foes by the configured ratio.
    pub fn needs_defenders(&mut self, ctx: &AgentContext, game: &dyn GameQuery) -> Option<f64> {
        if self.army.foe_strength() <= 0.0 || self.army.own_strength() <= 0.0 {
            self.army.recalculate_strengths(game);
        }
        let wanted = self.army.foe_strength() * ctx.config.army.defense_ratio;
        let deficit = wanted - self.army.own_strength();
        (deficit > 0.0).then_some(deficit)
    }
}

/// Owns every defense army of one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefenseRoster {
    next_id: u32,
    armies: Vec<DefenseArmy>,
}

impl DefenseRoster {
    /// An empty roster.
    pub const fn new() -> Self {
        Self {
            next_id: 1,
            armies: Vec::new(),
        }
    }

    /// All armies, oldest first.
    pub fn armies(&self) -> &[DefenseArmy] {
        &self.armies
    }

    /// Look up an army.
    pub fn army(&self, id: ArmyId) -> Option<&DefenseArmy> {
        self.armies.iter().find(|a| a.id() == id)
    }

    /// Look up an army, mutably.
    pub fn army_mut(&mut self, id: ArmyId) -> Option<&mut DefenseArmy> {
        self.armies.iter_mut().find(|a| a.id() == id)
    }

    /// Allocate an empty army.
    pub fn create_army(&mut self) -> ArmyId {
        let id = ArmyId(self.next_id.max(1));
        self.next_id = id.get().saturating_add(1);
        self.armies.push(DefenseArmy::new(id));
        id
    }

    /// The army tracking `foe`.
    pub fn army_of_foe(&self, foe: EntityId) -> Option<ArmyId> {
        self.armies
            .iter()
            .find(|a| a.army().foes().contains(&foe))
            .map(DefenseArmy::id)
    }

    /// The army `unit` defends with.
    pub fn army_of_unit(&self, unit: EntityId) -> Option<ArmyId> {
        self.armies
            .iter()
            .find(|a| a.army().own().contains(&unit))
            .map(DefenseArmy::id)
    }

    /// Route a hostile entity to an army: the one already tracking it, the
    /// nearest one within merge distance, or a new one.
    pub fn track_foe(
        &mut self,
        ctx: &AgentContext,
        foe: &EntityInfo,
        game: &dyn GameQuery,
    ) -> ArmyId {
        if let Some(id) = self.army_of_foe(foe.id) {
            return id;
        }
        let limit = ctx.config.army.merge_distance * ctx.config.army.merge_distance;
        let nearest = foe.position.and_then(|position| {
            self.armies
                .iter()
                .filter_map(|a| {
                    a.army()
                        .centroid(game)
                        .map(|c| (a.id(), c.distance_sq(position)))
                })
                .filter(|(_, dist)| *dist <= limit)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(id, _)| id)
        });
        let id = nearest.unwrap_or_else(|| self.create_army());
        if let Some(army) = self.army_mut(id) {
            army.army_mut().add_foe(foe);
        }
        debug!(army = %id, foe = %foe.id, "Foe tracked");
        id
    }

    /// Merge armies whose foe centroids lie within merge distance of each
    /// other. Returns the number of merges.
    pub fn merge_nearby(&mut self, ctx: &AgentContext, game: &dyn GameQuery) -> usize {
        let limit = ctx.config.army.merge_distance * ctx.config.army.merge_distance;
        let mut merges = 0_usize;
        loop {
            let centroids: Vec<(ArmyId, Option<Position>)> = self
                .armies
                .iter()
                .map(|a| (a.id(), a.army().centroid(game)))
                .collect();
            let pair = centroids.iter().enumerate().find_map(|(i, (keep, a))| {
                let a = (*a)?;
                centroids.iter().skip(i.saturating_add(1)).find_map(|(gone, b)| {
                    let b = (*b)?;
                    (a.distance_sq(b) <= limit).then_some((*keep, *gone))
                })
            });
            let Some((keep, gone)) = pair else {
                break;
            };
            let Some(index) = self.armies.iter().position(|a| a.id() == gone) else {
                break;
            };
            let absorbed = self.armies.remove(index);
            if let Some(target) = self.army_mut(keep) {
                target.army_mut().absorb(absorbed.army);
                merges = merges.saturating_add(1);
            }
        }
        merges
    }

    /// Update every army and drop the ones left without foes. Returns the
    /// own units released back to the caller.
    pub fn update_all(
        &mut self,
        ctx: &AgentContext,
        game: &dyn GameQuery,
        commands: &mut dyn CommandSink,
    ) -> Vec<EntityId> {
        let mut released = Vec::new();
        for army in &mut self.armies {
            released.extend(army.update(ctx, game, commands));
        }
        let before = self.armies.len();
        self.armies.retain(|a| !a.army().foes().is_empty());
        let dropped = before.saturating_sub(self.armies.len());
        if dropped > 0 {
            info!(dropped, remaining = self.armies.len(), "Defense armies disbanded");
        }
        released
    }

    /// Hand idle units to armies that need defenders, nearest units first
    /// for each army. Units taken are removed from `idle`, as are units
    /// some army already tracks. Units without strength stay idle.
    pub fn recruit(
        &mut self,
        ctx: &AgentContext,
        game: &dyn GameQuery,
        commands: &mut dyn CommandSink,
        idle: &mut Vec<EntityId>,
    ) -> usize {
        let mut recruited = 0_usize;
        let mut taken: BTreeSet<EntityId> = self
            .armies
            .iter()
            .flat_map(|a| a.army().own().iter().copied())
            .collect();
        for army in &mut self.armies {
            let Some(mut deficit) = army.needs_defenders(ctx, game) else {
                continue;
            };
            let Some(centroid) = army.army().centroid(game) else {
                continue;
            };
            idle.sort_by(|a, b| {
                let da = game
                    .entity(*a)
                    .and_then(|e| e.position)
                    .map_or(f64::INFINITY, |p| p.distance_sq(centroid));
                let db = game
                    .entity(*b)
                    .and_then(|e| e.position)
                    .map_or(f64::INFINITY, |p| p.distance_sq(centroid));
                da.total_cmp(&db)
            });
            for unit in std::mem::take(idle) {
                if deficit <= 0.0 {
                    idle.push(unit);
                    continue;
                }
                if taken.contains(&unit) {
                    warn!(%unit, army = %army.id(), "Idle unit already defends an army");
                    continue;
                }
                let Some(info) = game.entity(unit) else {
                    continue;
                };
                // Strengthless units cannot close a deficit.
                if info.strength <= 0.0 {
                    idle.push(unit);
                    continue;
                }
                if !army.army_mut().add_own(info) {
                    continue;
                }
                taken.insert(unit);
                deficit -= info.strength;
                army.army_mut().assign_unit(ctx, unit, game, commands);
                recruited = recruited.saturating_add(1);
            }
        }
        recruited
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use warden_types::PlayerId;

    use super::*;
    use crate::config::AgentConfig;
    use crate::host::CommandBuffer;
    use crate::sandbox::SandboxWorld;

    const ME: PlayerId = PlayerId(1);
    const ENEMY: PlayerId = PlayerId(2);

    fn ctx() -> AgentContext {
        AgentContext::new(ME, AgentConfig::default())
    }

    fn raider(id: u32, x: f64) -> EntityInfo {
        EntityInfo::new(EntityId(id), "units/raider", ENEMY)
            .at(x, 0.0)
            .with_strength(2.0)
    }

    fn spearman(id: u32, x: f64) -> EntityInfo {
        EntityInfo::new(EntityId(id), "units/spearman", ME)
            .at(x, 0.0)
            .with_strength(1.0)
    }

    fn world() -> SandboxWorld {
        let mut world = SandboxWorld::new(ME);
        world.add_territory(ME, Position::new(0.0, 0.0), 100.0);
        world
    }

    #[test]
    fn foe_inside_territory_threatens_home() {
        let mut world = world();
        world.spawn(raider(10, 20.0));
        let mut army = DefenseArmy::new(ArmyId(1));
        army.army_mut().add_foe(&raider(10, 20.0));
        army.update(&ctx(), &world, &mut CommandBuffer::new());
        assert_eq!(army.state(), DangerState::HomeThreatened);
    }

    #[test]
    fn threatened_moves_to_engaged_when_territory_is_safe() {
        let mut world = world();
        world.spawn(raider(10, 20.0));
        let mut army = DefenseArmy::new(ArmyId(1));
        army.army_mut().add_foe(&raider(10, 20.0));
        army.update(&ctx(), &world, &mut CommandBuffer::new());

        world.entity_mut(EntityId(10)).unwrap().position = Some(Position::new(500.0, 0.0));
        army.update(&ctx(), &world, &mut CommandBuffer::new());
        assert_eq!(army.state(), DangerState::Engaged);
    }

    #[test]
    fn no_foes_returns_to_calm_and_releases() {
        let mut world = world();
        world.spawn(raider(10, 20.0));
        world.spawn(spearman(1, 0.0));
        let mut army = DefenseArmy::new(ArmyId(1));
        army.army_mut().add_foe(&raider(10, 20.0));
        army.army_mut().add_own(&spearman(1, 0.0));
        army.update(&ctx(), &world, &mut CommandBuffer::new());
        assert_eq!(army.army().target_of(EntityId(1)), Some(EntityId(10)));

        world.despawn(EntityId(10));
        let released = army.update(&ctx(), &world, &mut CommandBuffer::new());
        assert_eq!(released, vec![EntityId(1)]);
        assert_eq!(army.state(), DangerState::Calm);
        assert!(army.army().own().is_empty());
    }

    #[test]
    fn needs_defenders_reports_deficit() {
        let mut world = world();
        world.spawn(raider(10, 20.0));
        world.spawn(spearman(1, 0.0));
        let mut army = DefenseArmy::new(ArmyId(1));
        army.army_mut().add_foe(&raider(10, 20.0));
        army.army_mut().add_own(&spearman(1, 0.0));
        // 2.0 * 1.4 - 1.0
        let deficit = army.needs_defenders(&ctx(), &world).unwrap();
        assert!((deficit - 1.8).abs() < 1e-9);
    }

    #[test]
    fn needs_defenders_recomputes_stale_strength() {
        let mut world = world();
        world.spawn(raider(10, 20.0));
        let mut army = DefenseArmy::new(ArmyId(1));
        // Recorded before the host reported any strength.
        army.army_mut()
            .add_foe(&EntityInfo::new(EntityId(10), "units/raider", ENEMY));
        assert!(army.army().foe_strength().abs() < f64::EPSILON);
        assert!(army.needs_defenders(&ctx(), &world).is_some());
        assert!((army.army().foe_strength() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn strong_enough_needs_nobody() {
        let mut world = world();
        world.spawn(raider(10, 20.0));
        let mut army = DefenseArmy::new(ArmyId(1));
        army.army_mut().add_foe(&raider(10, 20.0));
        for id in 1..=3 {
            world.spawn(spearman(id, 0.0));
            army.army_mut().add_own(&spearman(id, 0.0));
        }
        assert!(army.needs_defenders(&ctx(), &world).is_none());
    }

    #[test]
    fn roster_groups_close_foes() {
        let mut world = world();
        world.spawn(raider(10, 20.0));
        world.spawn(raider(11, 40.0));
        world.spawn(raider(12, 900.0));
        let mut roster = DefenseRoster::new();
        let a = roster.track_foe(&ctx(), &raider(10, 20.0), &world);
        let b = roster.track_foe(&ctx(), &raider(11, 40.0), &world);
        let c = roster.track_foe(&ctx(), &raider(12, 900.0), &world);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(roster.army_of_foe(EntityId(12)), Some(c));
        assert_eq!(roster.armies().len(), 2);
    }

    #[test]
    fn roster_merges_armies_that_drift_together() {
        let mut world = world();
        world.spawn(raider(10, 0.0));
        world.spawn(raider(11, 500.0));
        let mut roster = DefenseRoster::new();
        roster.track_foe(&ctx(), &raider(10, 0.0), &world);
        roster.track_foe(&ctx(), &raider(11, 500.0), &world);
        assert_eq!(roster.armies().len(), 2);

        world.entity_mut(EntityId(11)).unwrap().position = Some(Position::new(30.0, 0.0));
        assert_eq!(roster.merge_nearby(&ctx(), &world), 1);
        assert_eq!(roster.armies().len(), 1);
        assert_eq!(roster.armies().first().map(|a| a.army().foes().len()), Some(2));
    }

    #[test]
    fn update_all_drops_empty_armies() {
        let mut world = world();
        world.spawn(raider(10, 0.0));
        let mut roster = DefenseRoster::new();
        roster.track_foe(&ctx(), &raider(10, 0.0), &world);
        world.despawn(EntityId(10));
        roster.update_all(&ctx(), &world, &mut CommandBuffer::new());
        assert!(roster.armies().is_empty());
    }

    #[test]
    fn recruit_fills_deficit_nearest_first() {
        let mut world = world();
        world.spawn(raider(10, 20.0));
        world.spawn(spearman(1, 300.0));
        world.spawn(spearman(2, 10.0));
        world.spawn(spearman(3, 15.0));
        world.spawn(spearman(4, 250.0));
        let mut roster = DefenseRoster::new();
        let id = roster.track_foe(&ctx(), &raider(10, 20.0), &world);

        let mut idle = vec![EntityId(1), EntityId(2), EntityId(3), EntityId(4)];
        let recruited = roster.recruit(&ctx(), &world, &mut CommandBuffer::new(), &mut idle);
        // A deficit of 2.8 takes three spearmen, nearest first.
        assert_eq!(recruited, 3);
        assert_eq!(idle, vec![EntityId(1)]);
        assert_eq!(roster.army_of_unit(EntityId(2)), Some(id));
    }

    #[test]
    fn recruit_skips_units_another_army_holds() {
        let mut world = world();
        world.spawn(raider(10, 20.0));
        world.spawn(raider(11, 900.0));
        world.spawn(spearman(1, 10.0));
        world.spawn(spearman(2, 15.0));
        let mut roster = DefenseRoster::new();
        let near = roster.track_foe(&ctx(), &raider(10, 20.0), &world);
        let far = roster.track_foe(&ctx(), &raider(11, 900.0), &world);
        roster
            .army_mut(far)
            .unwrap()
            .army_mut()
            .add_own(&spearman(1, 10.0));

        // A stale idle list still names the unit the far army holds.
        let mut idle = vec![EntityId(1), EntityId(2)];
        let recruited = roster.recruit(&ctx(), &world, &mut CommandBuffer::new(), &mut idle);
        assert_eq!(recruited, 1);
        assert_eq!(roster.army_of_unit(EntityId(2)), Some(near));
        let holders = roster
            .armies()
            .iter()
            .filter(|a| a.army().own().contains(&EntityId(1)))
            .count();
        assert_eq!(holders, 1);
        assert!(idle.is_empty());
    }

    #[test]
    fn strengthless_units_stay_idle() {
        let mut world = world();
        world.spawn(raider(10, 20.0));
        let mut roster = DefenseRoster::new();
        roster.track_foe(&ctx(), &raider(10, 20.0), &world);
        let mut idle: Vec<EntityId> = (1..=4)
            .map(|id| world.spawn(spearman(id, 5.0).with_strength(0.0)))
            .collect();
        world.spawn(spearman(5, 50.0));
        idle.push(EntityId(5));

        let recruited = roster.recruit(&ctx(), &world, &mut CommandBuffer::new(), &mut idle);
        assert_eq!(recruited, 1);
        assert_eq!(idle, vec![EntityId(1), EntityId(2), EntityId(3), EntityId(4)]);
    }
}
