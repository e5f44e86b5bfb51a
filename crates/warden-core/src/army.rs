//! Armies: a cluster of hostile units and the own units sent against it.
//!
//! An army keeps both directions of the assignment so either side can be
//! dropped cheaply:
//!
//! ```text
//! assigned_against: foe -> [own, own, ...]
//! assigned_to:      own -> foe              (one target per own unit)
//! ```
//!
//! Assignment is greedy and nearest-first with saturation caps, so a big
//! blob of defenders spreads over several targets instead of piling onto
//! the closest one.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use warden_types::{ArmyId, EntityId, EntityInfo, Position, UnitClass};

use crate::config::ArmyConfig;
use crate::context::AgentContext;
use crate::host::{CommandError, CommandSink, GameQuery};

/// A threat cluster and its defenders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Army {
    id: ArmyId,
    foe_entities: BTreeSet<EntityId>,
    own_entities: BTreeSet<EntityId>,
    assigned_against: BTreeMap<EntityId, Vec<EntityId>>,
    assigned_to: BTreeMap<EntityId, EntityId>,
    /// Strength recorded for each tracked entity when it was last measured.
    strengths: BTreeMap<EntityId, f64>,
    foe_strength: f64,
    own_strength: f64,
}

impl Army {
    /// An empty army.
    pub const fn new(id: ArmyId) -> Self {
        Self {
            id,
            foe_entities: BTreeSet::new(),
            own_entities: BTreeSet::new(),
            assigned_against: BTreeMap::new(),
            assigned_to: BTreeMap::new(),
            strengths: BTreeMap::new(),
            foe_strength: 0.0,
            own_strength: 0.0,
        }
    }

    /// Army identifier.
    pub const fn id(&self) -> ArmyId {
        self.id
    }

    /// Tracked hostile entities.
    pub const fn foes(&self) -> &BTreeSet<EntityId> {
        &self.foe_entities
    }

    /// Tracked own entities.
    pub const fn own(&self) -> &BTreeSet<EntityId> {
        &self.own_entities
    }

    /// Cached total strength of the foes.
    pub const fn foe_strength(&self) -> f64 {
        self.foe_strength
    }

    /// Cached total strength of the own units.
    pub const fn own_strength(&self) -> f64 {
        self.own_strength
    }

    /// Foe the own `unit` is assigned to.
    pub fn target_of(&self, unit: EntityId) -> Option<EntityId> {
        self.assigned_to.get(&unit).copied()
    }

    /// Own units assigned against `foe`.
    pub fn attackers_of(&self, foe: EntityId) -> &[EntityId] {
        self.assigned_against.get(&foe).map_or(&[], Vec::as_slice)
    }

    /// Own units without a target.
    pub fn unassigned_own(&self) -> Vec<EntityId> {
        self.own_entities
            .iter()
            .filter(|id| !self.assigned_to.contains_key(id))
            .copied()
            .collect()
    }

    /// Start tracking a hostile entity. Returns `false` if already tracked.
    pub fn add_foe(&mut self, foe: &EntityInfo) -> bool {
        if !self.foe_entities.insert(foe.id) {
            return false;
        }
        self.assigned_against.entry(foe.id).or_default();
        self.strengths.insert(foe.id, foe.strength);
        self.foe_strength += foe.strength;
        true
    }

    /// Stop tracking a hostile entity. Returns the own units that were
    /// attacking it; they are now unassigned.
    pub fn remove_foe(&mut self, foe: EntityId) -> Vec<EntityId> {
        if !self.foe_entities.remove(&foe) {
            return Vec::new();
        }
        self.foe_strength -= self.strengths.remove(&foe).unwrap_or(0.0);
        let released = self.assigned_against.remove(&foe).unwrap_or_default();
        for unit in &released {
            self.assigned_to.remove(unit);
        }
        released
    }

    /// Start tracking an own unit. Returns `false` if already tracked.
    pub fn add_own(&mut self, unit: &EntityInfo) -> bool {
        if !self.own_entities.insert(unit.id) {
            return false;
        }
        self.strengths.insert(unit.id, unit.strength);
        self.own_strength += unit.strength;
        true
    }

    /// Stop tracking an own unit, dropping its assignment. Returns `false`
    /// if it was not tracked.
    pub fn remove_own(&mut self, unit: EntityId) -> bool {
        if !self.own_entities.remove(&unit) {
            return false;
        }
        self.own_strength -= self.strengths.remove(&unit).unwrap_or(0.0);
        self.unassign(unit);
        true
    }

    /// Drop every own unit. Returns them.
    pub fn release_all_own(&mut self) -> Vec<EntityId> {
        let released: Vec<EntityId> = core::mem::take(&mut self.own_entities)
            .into_iter()
            .collect();
        for unit in &released {
            self.strengths.remove(unit);
        }
        self.assigned_to.clear();
        for attackers in self.assigned_against.values_mut() {
            attackers.clear();
        }
        self.own_strength = 0.0;
        released
    }

    /// Clear `unit`'s assignment. Returns the foe it was assigned to.
    pub fn unassign(&mut self, unit: EntityId) -> Option<EntityId> {
        let foe = self.assigned_to.remove(&unit)?;
        if let Some(attackers) = self.assigned_against.get_mut(&foe) {
            attackers.retain(|a| *a != unit);
        }
        Some(foe)
    }

    /// Re-measure every tracked entity. Entities the host no longer reports
    /// count as zero.
    pub fn recalculate_strengths(&mut self, game: &dyn GameQuery) {
        let measure = |ids: &BTreeSet<EntityId>, strengths: &mut BTreeMap<EntityId, f64>| {
            ids.iter()
                .map(|id| {
                    let strength = game.entity(*id).map_or(0.0, |e| e.strength);
                    strengths.insert(*id, strength);
                    strength
                })
                .sum::<f64>()
        };
        self.foe_strength = measure(&self.foe_entities, &mut self.strengths);
        self.own_strength = measure(&self.own_entities, &mut self.strengths);
    }

    /// Mean position of the foes the host can still see.
    pub fn centroid(&self, game: &dyn GameQuery) -> Option<Position> {
        let (x, z, n) = self
            .foe_entities
            .iter()
            .filter_map(|id| game.entity(*id).and_then(|e| e.position))
            .fold((0.0, 0.0, 0.0), |(x, z, n), p| (x + p.x, z + p.z, n + 1.0));
        (n > 0.0).then(|| Position::new(x / n, z / n))
    }

    /// Merge `other` into this army, keeping both sides' assignments.
    pub fn absorb(&mut self, other: Self) {
        debug!(army = %self.id, absorbed = %other.id, "Armies merged");
        self.foe_entities.extend(other.foe_entities);
        self.own_entities.extend(other.own_entities);
        for (foe, attackers) in other.assigned_against {
            self.assigned_against.entry(foe).or_default().extend(attackers);
        }
        self.assigned_to.extend(other.assigned_to);
        self.strengths.extend(other.strengths);
        self.foe_strength += other.foe_strength;
        self.own_strength += other.own_strength;
    }

    /// Assign an idle own unit to a foe and order the attack.
    ///
    /// A foe already targeting the unit is answered first. Otherwise foes
    /// at their hard cap are skipped and the nearest foe with at most the
    /// soft cap of attackers wins, falling back to the nearest foe overall.
    /// Returns `false` when nothing was assigned.
    pub fn assign_unit(
        &mut self,
        ctx: &AgentContext,
        unit: EntityId,
        game: &dyn GameQuery,
        commands: &mut dyn CommandSink,
    ) -> bool {
        if !self.own_entities.contains(&unit) {
            warn!(army = %self.id, %unit, "Cannot assign a unit the army does not track");
            return false;
        }
        if let Some(target) = self.assigned_to.get(&unit) {
            warn!(army = %self.id, %unit, %target, "Unit is already assigned");
            return false;
        }
        let Some(info) = game.entity(unit) else {
            return false;
        };
        let Some(position) = info.position else {
            return false;
        };

        let caps = &ctx.config.army;
        let Some(target) = self
            .retaliation_target(caps, unit, game)
            .or_else(|| self.nearest_target(caps, position, game))
        else {
            return false;
        };

        self.assigned_to.insert(unit, target);
        self.assigned_against.entry(target).or_default().push(unit);

        if let Err(e) = self.order_attack(ctx, info, target, game, commands) {
            warn!(army = %self.id, %unit, %target, error = %e, "Attack order refused");
            self.unassign(unit);
            return false;
        }
        debug!(army = %self.id, %unit, %target, "Unit assigned");
        true
    }

    fn hard_cap(caps: &ArmyConfig, foe: &EntityInfo) -> usize {
        if foe.has_class(UnitClass::Hero) || foe.has_class(UnitClass::Siege) {
            caps.heavy_hard_cap
        } else {
            caps.hard_cap
        }
    }

    fn retaliation_target(
        &self,
        caps: &ArmyConfig,
        unit: EntityId,
        game: &dyn GameQuery,
    ) -> Option<EntityId> {
        self.foe_entities.iter().copied().find(|foe| {
            game.entity(*foe).is_some_and(|info| {
                info.order_target == Some(unit)
                    && self.attackers_of(*foe).len() < Self::hard_cap(caps, info)
            })
        })
    }

    fn nearest_target(
        &self,
        caps: &ArmyConfig,
        from: Position,
        game: &dyn GameQuery,
    ) -> Option<EntityId> {
        let mut best_soft: Option<(EntityId, f64)> = None;
        let mut best_any: Option<(EntityId, f64)> = None;

        for foe in &self.foe_entities {
            let Some(info) = game.entity(*foe) else {
                continue;
            };
            let Some(position) = info.position else {
                continue;
            };
            let assigned = self.attackers_of(*foe).len();
            if assigned >= Self::hard_cap(caps, info) {
                continue;
            }
            let dist = from.distance_sq(position);
            if assigned <= caps.soft_cap && best_soft.is_none_or(|(_, d)| dist < d) {
                best_soft = Some((*foe, dist));
            }
            if best_any.is_none_or(|(_, d)| dist < d) {
                best_any = Some((*foe, dist));
            }
        }
        best_soft.or(best_any).map(|(id, _)| id)
    }

    fn order_attack(
        &self,
        ctx: &AgentContext,
        unit: &EntityInfo,
        target: EntityId,
        game: &dyn GameQuery,
        commands: &mut dyn CommandSink,
    ) -> Result<(), CommandError> {
        let foe = game.entity(target).ok_or(CommandError::UnknownEntity(target))?;
        let crossing = unit
            .access_region
            .zip(foe.access_region)
            .filter(|(from, to)| from != to && !unit.has_class(UnitClass::Ship));
        if let Some((from, to)) = crossing {
            debug!(army = %self.id, unit = %unit.id, from, to, "Requesting transport");
            return commands.request_transport(unit.id, from, to);
        }
        let capture = ctx.config.army.allow_capture && foe.capturable;
        commands.attack(unit.id, target, capture)
    }
}
