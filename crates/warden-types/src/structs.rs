//! Core value types: resource vectors, positions and entity snapshots.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::enums::{ResourceKind, UnitClass};
use crate::ids::{EntityId, PlayerId, TemplateId};

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// A sparse vector of resource quantities.
///
/// Used for costs, owned stockpiles and escrow balances alike. Missing
/// kinds read as zero and zero entries are never stored, so two vectors
/// with the same non-zero amounts compare equal. All arithmetic saturates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resources(BTreeMap<ResourceKind, u32>);

impl Resources {
    /// An empty vector (zero of everything).
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build a vector from `(kind, quantity)` pairs. Later pairs for the
    /// same kind replace earlier ones.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (ResourceKind, u32)>) -> Self {
        let mut out = Self::new();
        for (kind, qty) in pairs {
            out.set(kind, qty);
        }
        out
    }

    /// Quantity of `kind`.
    pub fn get(&self, kind: ResourceKind) -> u32 {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    /// Overwrite the quantity of `kind`.
    pub fn set(&mut self, kind: ResourceKind, qty: u32) {
        if qty == 0 {
            self.0.remove(&kind);
        } else {
            self.0.insert(kind, qty);
        }
    }

    /// Add `qty` of `kind`, saturating at `u32::MAX`.
    pub fn add(&mut self, kind: ResourceKind, qty: u32) {
        let next = self.get(kind).saturating_add(qty);
        self.set(kind, next);
    }

    /// Remove `qty` of `kind`, saturating at zero.
    pub fn sub(&mut self, kind: ResourceKind, qty: u32) {
        let next = self.get(kind).saturating_sub(qty);
        self.set(kind, next);
    }

    /// Add every quantity in `other`.
    pub fn add_all(&mut self, other: &Self) {
        for (kind, qty) in other.iter() {
            self.add(kind, qty);
        }
    }

    /// Subtract every quantity in `other`, saturating at zero.
    pub fn sub_all(&mut self, other: &Self) {
        for (kind, qty) in other.iter() {
            self.sub(kind, qty);
        }
    }

    /// Whether `self` holds at least `cost` of every kind.
    pub fn covers(&self, cost: &Self) -> bool {
        cost.iter().all(|(kind, qty)| self.get(kind) >= qty)
    }

    /// What is still missing from `self` to cover `cost`.
    pub fn shortfall(&self, cost: &Self) -> Self {
        Self::from_pairs(
            cost.iter()
                .map(|(kind, qty)| (kind, qty.saturating_sub(self.get(kind)))),
        )
    }

    /// Multiply every quantity by `factor`, saturating.
    pub fn scaled(&self, factor: u32) -> Self {
        Self::from_pairs(self.iter().map(|(kind, qty)| (kind, qty.saturating_mul(factor))))
    }

    /// Per-kind minimum of `self` and `cap`. Kinds absent from `cap` drop to zero.
    pub fn clamped_to(&self, cap: &Self) -> Self {
        Self::from_pairs(self.iter().map(|(kind, qty)| (kind, qty.min(cap.get(kind)))))
    }

    /// Iterate over non-zero `(kind, quantity)` pairs in kind order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, u32)> + '_ {
        self.0.iter().map(|(kind, qty)| (*kind, *qty))
    }

    /// Whether every quantity is zero.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all quantities.
    pub fn total(&self) -> u64 {
        self.0.values().map(|q| u64::from(*q)).sum()
    }
}

impl core::fmt::Display for Resources {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_empty() {
            return f.write_str("{}");
        }
        let parts: Vec<String> = self.iter().map(|(k, q)| format!("{k:?}: {q}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A planar map position. The host's vertical axis is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// East-west coordinate.
    pub x: f64,
    /// North-south coordinate.
    pub z: f64,
}

impl Position {
    /// Create a position.
    pub const fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    /// Squared planar distance. Used for all nearest-first comparisons.
    pub fn distance_sq(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        dx.mul_add(dx, dz * dz)
    }
}

// ---------------------------------------------------------------------------
// Entity snapshot
// ---------------------------------------------------------------------------

/// What the core needs to know about one entity, as reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    /// Entity identifier.
    pub id: EntityId,
    /// Template the entity was created from.
    pub template: TemplateId,
    /// Owning player.
    pub owner: PlayerId,
    /// Current position, `None` when garrisoned or otherwise inaccessible.
    pub position: Option<Position>,
    /// Class tags of the template.
    pub classes: BTreeSet<UnitClass>,
    /// Terrain accessibility region (land mass or sea index).
    pub access_region: Option<u32>,
    /// Combat strength estimate used for army balancing.
    pub strength: f64,
    /// Target of the entity's current order, if it is attacking something.
    pub order_target: Option<EntityId>,
    /// Number of batches waiting in the entity's production queue.
    pub queue_length: u32,
    /// Templates this entity can currently train or build.
    pub producible: Vec<TemplateId>,
    /// Whether the entity can be captured instead of destroyed.
    pub capturable: bool,
}

impl EntityInfo {
    /// A bare entity with no position, classes or capabilities.
    pub fn new(id: EntityId, template: impl Into<TemplateId>, owner: PlayerId) -> Self {
        Self {
            id,
            template: template.into(),
            owner,
            position: None,
            classes: BTreeSet::new(),
            access_region: None,
            strength: 0.0,
            order_target: None,
            queue_length: 0,
            producible: Vec::new(),
            capturable: false,
        }
    }

    /// Set the position.
    #[must_use]
    pub const fn at(mut self, x: f64, z: f64) -> Self {
        self.position = Some(Position::new(x, z));
        self
    }

    /// Add class tags.
    #[must_use]
    pub fn with_classes(mut self, classes: impl IntoIterator<Item = UnitClass>) -> Self {
        self.classes.extend(classes);
        self
    }

    /// Set the accessibility region.
    #[must_use]
    pub const fn in_region(mut self, region: u32) -> Self {
        self.access_region = Some(region);
        self
    }

    /// Set the strength estimate.
    #[must_use]
    pub const fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    /// Set the templates this entity can produce.
    #[must_use]
    pub fn producing(mut self, templates: impl IntoIterator<Item = TemplateId>) -> Self {
        self.producible = templates.into_iter().collect();
        self
    }

    /// Whether the entity carries `class`.
    pub fn has_class(&self, class: UnitClass) -> bool {
        self.classes.contains(&class)
    }

    /// Whether the entity can produce `template`.
    pub fn can_produce(&self, template: &TemplateId) -> bool {
        self.producible.iter().any(|t| t == template)
    }
}
