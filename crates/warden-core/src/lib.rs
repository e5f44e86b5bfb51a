//! Decision-time core of the Warden RTS agent.
//!
//! Each turn the agent turns its stockpile into build and train orders
//! through an escrow-based priority scheduler, skips templates that recently
//! failed to start, and assigns its units against every hostile cluster
//! threatening it.
//!
//! # Modules
//!
//! - [`army`] -- Threat clusters and greedy, capped unit-to-target
//!   assignment.
//! - [`config`] -- Configuration loading from `warden-config.yaml` into
//!   strongly-typed structs.
//! - [`context`] -- [`AgentContext`]: player, configuration and clock.
//! - [`defense`] -- [`DefenseArmy`] danger state machine and the
//!   [`DefenseRoster`] that owns the armies.
//! - [`demand`] -- [`DemandGroup`]: named plan queues with escrow.
//! - [`eligibility`] -- [`BuildEligibilityCache`] producer counts and
//!   cooldowns.
//! - [`host`] -- [`GameQuery`] and [`CommandSink`], the seam to the host
//!   simulation.
//! - [`persist`] -- [`AgentSnapshot`] save/load.
//! - [`plan`] -- [`Plan`] lifecycle and serialization.
//! - [`sandbox`] -- [`SandboxWorld`], an in-memory host.
//! - [`scheduler`] -- [`ResourceScheduler`], the per-turn allocation pass.
//!
//! [`AgentContext`]: context::AgentContext
//! [`DefenseArmy`]: defense::DefenseArmy
//! [`DefenseRoster`]: defense::DefenseRoster
//! [`DemandGroup`]: demand::DemandGroup
//! [`BuildEligibilityCache`]: eligibility::BuildEligibilityCache
//! [`GameQuery`]: host::GameQuery
//! [`CommandSink`]: host::CommandSink
//! [`AgentSnapshot`]: persist::AgentSnapshot
//! [`Plan`]: plan::Plan
//! [`SandboxWorld`]: sandbox::SandboxWorld
//! [`ResourceScheduler`]: scheduler::ResourceScheduler

pub mod army;
pub mod config;
pub mod context;
pub mod defense;
pub mod demand;
pub mod eligibility;
pub mod host;
pub mod persist;
pub mod plan;
pub mod sandbox;
pub mod scheduler;

pub use army::Army;
pub use config::{AgentConfig, ConfigError};
pub use context::AgentContext;
pub use defense::{DefenseArmy, DefenseRoster};
pub use demand::{DemandGroup, QueuedPlan};
pub use eligibility::{BuildEligibilityCache, Infeasibility, UnitDelta};
pub use host::{Command, CommandBuffer, CommandError, CommandSink, GameQuery};
pub use persist::{AgentSnapshot, PersistError};
pub use plan::{BuildingMetadata, Plan, PlanError, PlanMetadata, TrainingMetadata};
pub use sandbox::{SandboxWorld, TemplateSpec};
pub use scheduler::{PendingDemand, ResourceScheduler, StartedPlan, TickReport};
