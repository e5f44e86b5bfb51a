//! Enumeration types shared across the Warden crates.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// A gatherable resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Food from fields, corrals, berries and fishing.
    Food,
    /// Lumber.
    Wood,
    /// Quarried stone.
    Stone,
    /// Mined metal.
    Metal,
}

impl ResourceKind {
    /// Every resource kind, in stable order.
    pub const ALL: [Self; 4] = [Self::Food, Self::Wood, Self::Stone, Self::Metal];
}

// ---------------------------------------------------------------------------
// Entity classes
// ---------------------------------------------------------------------------

/// A class tag carried by an entity template.
///
/// Classes drive policy decisions: saturation caps, transport needs,
/// producer selection and capability lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UnitClass {
    /// A unique, strong unit.
    Hero,
    /// Siege engines (rams, catapults).
    Siege,
    /// Naval units. Ships never need transport.
    Ship,
    /// Non-combat support units (workers, healers, traders).
    Support,
    /// Foot soldiers.
    Infantry,
    /// Mounted soldiers.
    Cavalry,
    /// Any building.
    Structure,
    /// Civic centres (the main production and drop-off building).
    CivicCentre,
    /// Buildings that train military units.
    Barracks,
    /// Resource drop-off buildings.
    Dropsite,
    /// Population-providing buildings.
    House,
    /// Defensive buildings (towers, walls).
    Defensive,
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// What a plan produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanCategory {
    /// A batch of units trained at a producer.
    Unit,
    /// A structure placed by a builder.
    Building,
}

/// Lifecycle state of a plan.
///
/// ```text
/// Queued -> Started -> Committed
///    \          \
///     +----------+--> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    /// Waiting in a demand group for resources and a producer.
    Queued,
    /// A producer has been chosen and the order is being issued.
    Started,
    /// The host accepted the order.
    Committed,
    /// Discarded before commitment.
    Cancelled,
}

/// Why a template could not be produced right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfeasibleReason {
    /// No valid placement was found for the structure.
    NoRoom,
    /// No owned entity can currently produce the template.
    NoBuilder,
    /// A prerequisite (phase, technology) is not yet met.
    Locked,
    /// A per-player build limit has been reached.
    LimitReached,
}

impl core::fmt::Display for InfeasibleReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Self::NoRoom => "no room",
            Self::NoBuilder => "no builder",
            Self::Locked => "locked",
            Self::LimitReached => "limit reached",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Defense
// ---------------------------------------------------------------------------

/// Danger level of a defense army.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DangerState {
    /// No tracked threat.
    #[default]
    Calm,
    /// Threat present and home territory is itself threatened.
    HomeThreatened,
    /// Threat present, home territory currently safe.
    Engaged,
}

impl DangerState {
    /// Numeric encoding (0, 1, 2) used by host-side reporting.
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Calm => 0,
            Self::HomeThreatened => 1,
            Self::Engaged => 2,
        }
    }
}
