//! Shared type definitions for the Warden scheduling and defense core.
//!
//! Every crate in the workspace speaks in these types: the ledger counts
//! [`Resources`], plans and eligibility caches are keyed by [`TemplateId`],
//! and armies track [`EntityId`]s reported by the host as [`EntityInfo`].
//!
//! # Modules
//!
//! - [`ids`] -- Identifier newtypes (entities, armies, players, plans, templates)
//! - [`enums`] -- Resource kinds, unit classes, plan and danger states
//! - [`structs`] -- Resource vectors, positions and entity snapshots

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{DangerState, InfeasibleReason, PlanCategory, PlanState, ResourceKind, UnitClass};
pub use ids::{ArmyId, EntityId, PlanId, PlayerId, TemplateId};
pub use structs::{EntityInfo, Position, Resources};
