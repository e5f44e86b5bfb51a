//! An in-memory host for tests and the headless engine.
//!
//! The sandbox answers [`GameQuery`] from plain maps and applies recorded
//! [`Command`]s instantly: trained units and placed structures appear at
//! once and their cost leaves the stockpile. There is no movement, combat
//! or pathing; callers move and remove entities themselves.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use warden_types::{EntityId, EntityInfo, PlayerId, Position, Resources, TemplateId, UnitClass};

use crate::host::{Command, GameQuery};

/// Distance within which a position counts as near an invading army.
pub const INVASION_RADIUS: f64 = 80.0;

/// Spacing between automatically placed structures.
const PLACEMENT_SPACING: f64 = 12.0;

/// What the sandbox knows about a template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateSpec {
    /// Class tags of every instance.
    pub classes: BTreeSet<UnitClass>,
    /// Cost of one instance.
    pub cost: Resources,
    /// Strength of one instance.
    pub strength: f64,
    /// Templates an instance can produce.
    pub producible: Vec<TemplateId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Territory {
    owner: PlayerId,
    centre: Position,
    radius: f64,
}

/// A scripted, instant-resolution game world.
#[derive(Debug, Clone)]
pub struct SandboxWorld {
    player: PlayerId,
    resources: Resources,
    entities: BTreeMap<EntityId, EntityInfo>,
    templates: BTreeMap<TemplateId, TemplateSpec>,
    territories: Vec<Territory>,
    invasions: Vec<Position>,
    blocked: BTreeSet<TemplateId>,
    next_id: u32,
}

impl SandboxWorld {
    /// An empty world seen from `player`.
    pub const fn new(player: PlayerId) -> Self {
        Self {
            player,
            resources: Resources::new(),
            entities: BTreeMap::new(),
            templates: BTreeMap::new(),
            territories: Vec::new(),
            invasions: Vec::new(),
            blocked: BTreeSet::new(),
            next_id: 1,
        }
    }

    /// The player the agent controls.
    pub const fn player(&self) -> PlayerId {
        self.player
    }

    // ---- setup ----

    /// Register or replace a template.
    pub fn define(&mut self, name: impl Into<TemplateId>, spec: TemplateSpec) {
        self.templates.insert(name.into(), spec);
    }

    /// Register a template with class tags only.
    pub fn define_template(
        &mut self,
        name: impl Into<TemplateId>,
        classes: impl IntoIterator<Item = UnitClass>,
    ) {
        self.define(
            name,
            TemplateSpec {
                classes: classes.into_iter().collect(),
                ..TemplateSpec::default()
            },
        );
    }

    /// Look up a template.
    pub fn template(&self, name: &TemplateId) -> Option<&TemplateSpec> {
        self.templates.get(name)
    }

    /// Replace the stockpile.
    pub fn set_resources(&mut self, resources: Resources) {
        self.resources = resources;
    }

    /// Add to the stockpile.
    pub fn gather(&mut self, income: &Resources) {
        self.resources.add_all(income);
    }

    /// Claim a circle of territory for `owner`.
    pub fn add_territory(&mut self, owner: PlayerId, centre: Position, radius: f64) {
        self.territories.push(Territory {
            owner,
            centre,
            radius,
        });
    }

    /// Mark an invading army at `position`.
    pub fn add_invasion(&mut self, position: Position) {
        self.invasions.push(position);
    }

    /// Forget every invasion marker.
    pub fn clear_invasions(&mut self) {
        self.invasions.clear();
    }

    /// Make every placement of `template` fail.
    pub fn block_placement(&mut self, template: impl Into<TemplateId>) {
        self.blocked.insert(template.into());
    }

    /// Let `template` be placed again.
    pub fn unblock_placement(&mut self, template: &TemplateId) {
        self.blocked.remove(template);
    }

    // ---- entities ----

    /// Insert an entity under its own id.
    pub fn spawn(&mut self, entity: EntityInfo) -> EntityId {
        let id = entity.id;
        self.next_id = self.next_id.max(id.get().saturating_add(1));
        self.entities.insert(id, entity);
        id
    }

    /// Insert a fresh instance of `template` owned by `owner` at `position`.
    pub fn spawn_template(
        &mut self,
        template: &TemplateId,
        owner: PlayerId,
        position: Position,
        region: Option<u32>,
    ) -> EntityId {
        let id = EntityId(self.next_id);
        let mut entity = EntityInfo::new(id, template.clone(), owner).at(position.x, position.z);
        entity.access_region = region;
        if let Some(spec) = self.templates.get(template) {
            entity.classes.clone_from(&spec.classes);
            entity.strength = spec.strength;
            entity.producible.clone_from(&spec.producible);
        }
        self.spawn(entity)
    }

    /// Remove an entity.
    pub fn despawn(&mut self, id: EntityId) -> Option<EntityInfo> {
        self.entities.remove(&id)
    }

    /// Mutable access to an entity.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut EntityInfo> {
        self.entities.get_mut(&id)
    }

    /// Every entity, any owner.
    pub fn entities(&self) -> impl Iterator<Item = &EntityInfo> {
        self.entities.values()
    }

    // ---- commands ----

    /// Apply recorded orders. Returns the ids of entities that appeared.
    pub fn apply(&mut self, commands: Vec<Command>) -> Vec<EntityId> {
        let mut spawned = Vec::new();
        for command in commands {
            match command {
                Command::Train {
                    producer,
                    template,
                    quantity,
                    ..
                } => {
                    let Some(origin) = self.entities.get(&producer) else {
                        warn!(%producer, "Train order for a missing producer");
                        continue;
                    };
                    let position = origin.position.unwrap_or_default();
                    let region = origin.access_region;
                    self.charge(&template, quantity);
                    for _ in 0..quantity {
                        spawned.push(self.spawn_template(&template, self.player, position, region));
                    }
                    debug!(%producer, %template, quantity, "Units trained");
                }
                Command::Build {
                    builder,
                    template,
                    position,
                    ..
                } => {
                    let region = self.entities.get(&builder).and_then(|b| b.access_region);
                    self.charge(&template, 1);
                    spawned.push(self.spawn_template(&template, self.player, position, region));
                    debug!(%builder, %template, "Structure placed");
                }
                Command::Attack { unit, target, .. } => {
                    if let Some(entity) = self.entities.get_mut(&unit) {
                        entity.order_target = Some(target);
                    }
                }
                Command::Transport {
                    unit, to_region, ..
                } => {
                    if let Some(entity) = self.entities.get_mut(&unit) {
                        entity.access_region = Some(to_region);
                    }
                }
            }
        }
        spawned
    }

    fn charge(&mut self, template: &TemplateId, quantity: u32) {
        if let Some(spec) = self.templates.get(template) {
            let cost = spec.cost.scaled(quantity);
            if !self.resources.covers(&cost) {
                warn!(%template, cost = %cost, stock = %self.resources, "Order exceeds stockpile");
            }
            self.resources.sub_all(&cost);
        }
    }
}

impl GameQuery for SandboxWorld {
    fn resources(&self) -> Resources {
        self.resources.clone()
    }

    fn entity(&self, id: EntityId) -> Option<&EntityInfo> {
        self.entities.get(&id)
    }

    fn entities_of(&self, player: PlayerId) -> Vec<&EntityInfo> {
        self.entities
            .values()
            .filter(|e| e.owner == player)
            .collect()
    }

    fn template_classes(&self, template: &TemplateId) -> BTreeSet<UnitClass> {
        self.templates
            .get(template)
            .map(|spec| spec.classes.clone())
            .unwrap_or_default()
    }

    fn is_own_territory(&self, player: PlayerId, position: Position) -> bool {
        self.territories.iter().any(|t| {
            t.owner == player && t.centre.distance_sq(position) <= t.radius * t.radius
        })
    }

    fn is_near_invading_army(&self, position: Position) -> bool {
        let limit = INVASION_RADIUS * INVASION_RADIUS;
        self.invasions
            .iter()
            .any(|p| p.distance_sq(position) <= limit)
    }

    fn find_placement(&self, template: &TemplateId, hint: Option<Position>) -> Option<Position> {
        if self.blocked.contains(template) {
            return None;
        }
        if hint.is_some() {
            return hint;
        }
        let centre = self
            .territories
            .iter()
            .find(|t| t.owner == self.player)
            .map_or_else(Position::default, |t| t.centre);
        let placed = self
            .entities
            .values()
            .filter(|e| e.owner == self.player && e.has_class(UnitClass::Structure))
            .fold(0.0, |n, _| n + 1.0);
        Some(Position::new(
            PLACEMENT_SPACING.mul_add(placed, centre.x),
            centre.z,
        ))
    }
}
