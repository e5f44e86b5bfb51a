//! Integration tests for threat tracking and defender assignment.
//!
//! A raid is staged in the sandbox, the roster routes the raiders into
//! armies, idle units are recruited, and the recorded attack orders are
//! checked against the saturation caps and the danger state machine.

#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

use std::collections::BTreeMap;

use warden_core::{
    AgentConfig, AgentContext, AgentSnapshot, BuildEligibilityCache, Command, CommandBuffer,
    DefenseRoster, GameQuery, ResourceScheduler, SandboxWorld,
};
use warden_types::{DangerState, EntityId, EntityInfo, PlayerId, Position, UnitClass};

const ME: PlayerId = PlayerId(1);
const RAIDER: PlayerId = PlayerId(2);

fn raider(id: u32, x: f64, z: f64) -> EntityInfo {
    EntityInfo::new(EntityId(id), "units/raider", RAIDER)
        .at(x, z)
        .with_classes([UnitClass::Cavalry])
        .with_strength(1.5)
}

fn defender(id: u32, x: f64, z: f64) -> EntityInfo {
    EntityInfo::new(EntityId(id), "units/spearman", ME)
        .at(x, z)
        .with_classes([UnitClass::Infantry])
        .with_strength(1.0)
}

fn home() -> SandboxWorld {
    let mut world = SandboxWorld::new(ME);
    world.add_territory(ME, Position::new(0.0, 0.0), 150.0);
    world
}

fn attack_targets(commands: &[Command]) -> BTreeMap<EntityId, usize> {
    let mut counts = BTreeMap::new();
    for command in commands {
        if let Command::Attack { target, .. } = command {
            *counts.entry(*target).or_insert(0_usize) += 1;
        }
    }
    counts
}

#[test]
fn raid_on_home_is_met_within_caps() {
    let mut world = home();
    let ctx = AgentContext::new(ME, AgentConfig::default());
    let raiders = [raider(100, 40.0, 0.0), raider(101, 45.0, 5.0)];
    for r in &raiders {
        world.spawn(r.clone());
    }
    let mut idle: Vec<EntityId> = (1..=20)
        .map(|id| world.spawn(defender(id, 0.0, f64::from(id))))
        .collect();

    let mut roster = DefenseRoster::new();
    for r in &raiders {
        roster.track_foe(&ctx, r, &world);
    }
    assert_eq!(roster.armies().len(), 1);

    let mut buffer = CommandBuffer::new();
    let recruited = roster.recruit(&ctx, &world, &mut buffer, &mut idle);
    // 3.0 foe strength * 1.4 needs 4.2 worth of 1.0 defenders.
    assert_eq!(recruited, 5);
    roster.update_all(&ctx, &world, &mut buffer);

    let army = roster.armies().first().unwrap();
    assert_eq!(army.state(), DangerState::HomeThreatened);
    for (target, count) in attack_targets(buffer.commands()) {
        assert!(count <= ctx.config.army.hard_cap, "{target} has {count} attackers");
    }
    let wanted = army.army().foe_strength() * ctx.config.army.defense_ratio;
    assert!(army.army().own_strength() >= wanted);
}

#[test]
fn retaliation_beats_distance() {
    let mut world = home();
    let ctx = AgentContext::new(ME, AgentConfig::default());
    world.spawn(raider(100, 5.0, 0.0));
    let mut hunter = raider(101, 140.0, 0.0);
    hunter.order_target = Some(EntityId(1));
    world.spawn(hunter.clone());
    world.spawn(defender(1, 0.0, 0.0));

    let mut roster = DefenseRoster::new();
    let army = roster.track_foe(&ctx, &raider(100, 5.0, 0.0), &world);
    let defense = roster.army_mut(army).unwrap();
    defense.army_mut().add_foe(&hunter);
    defense.army_mut().add_own(world.entity(EntityId(1)).unwrap());

    let mut buffer = CommandBuffer::new();
    assert!(defense
        .army_mut()
        .assign_unit(&ctx, EntityId(1), &world, &mut buffer));
    assert_eq!(defense.army().target_of(EntityId(1)), Some(EntityId(101)));
}

#[test]
fn raid_beaten_back_returns_defenders() {
    let mut world = home();
    let ctx = AgentContext::new(ME, AgentConfig::default());
    world.spawn(raider(100, 30.0, 0.0));
    let mut idle: Vec<EntityId> = (1..=3)
        .map(|id| world.spawn(defender(id, 0.0, 0.0)))
        .collect();

    let mut roster = DefenseRoster::new();
    roster.track_foe(&ctx, &raider(100, 30.0, 0.0), &world);
    let mut buffer = CommandBuffer::new();
    roster.recruit(&ctx, &world, &mut buffer, &mut idle);
    roster.update_all(&ctx, &world, &mut buffer);

    world.despawn(EntityId(100));
    let released = roster.update_all(&ctx, &world, &mut buffer);
    assert_eq!(released.len(), 3);
    assert!(roster.armies().is_empty());
}

#[test]
fn snapshot_restores_armies_and_queues() {
    let mut world = home();
    let ctx = AgentContext::new(ME, AgentConfig::default());
    world.spawn(raider(100, 30.0, 0.0));
    let mut roster = DefenseRoster::new();
    let army = roster.track_foe(&ctx, &raider(100, 30.0, 0.0), &world);
    let scheduler = ResourceScheduler::new(&ctx.config.scheduler);
    let eligibility = BuildEligibilityCache::rebuild_from(&world, ME);

    let blob = AgentSnapshot::capture(ctx.turn(), ctx.time(), &scheduler, &eligibility, &roster)
        .to_json()
        .unwrap();
    let restored = AgentSnapshot::from_json(&blob).unwrap();
    assert_eq!(restored.roster.army_of_foe(EntityId(100)), Some(army));
    assert_eq!(restored.scheduler, scheduler);
}
