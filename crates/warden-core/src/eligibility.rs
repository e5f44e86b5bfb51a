//! Build eligibility: which templates can be produced right now.
//!
//! The cache counts, per template, how many owned entities could produce it,
//! and remembers templates that recently failed to start together with a
//! cooldown. A template is currently buildable iff
//!
//! ```text
//! builders[t] > 0  &&  (no infeasibility[t]  ||  now >= retry_after[t])
//! ```
//!
//! Cooldowns only ever move forward: marking a template infeasible twice
//! keeps the later retry time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use warden_types::{EntityInfo, InfeasibleReason, PlayerId, TemplateId};

use crate::config::EligibilityConfig;
use crate::host::GameQuery;

/// Whether a producer appeared or disappeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitDelta {
    /// The unit was created or captured.
    Added,
    /// The unit died, was destroyed or was lost.
    Removed,
}

/// Why and until when a template is on cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Infeasibility {
    /// Reason reported by the last failed start.
    pub reason: InfeasibleReason,
    /// Simulation time (seconds) after which a retry is allowed.
    pub retry_after: f64,
}

/// Producer counts and infeasibility cooldowns per template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildEligibilityCache {
    builders: BTreeMap<TemplateId, u32>,
    infeasible: BTreeMap<TemplateId, Infeasibility>,
}

impl BuildEligibilityCache {
    /// An empty cache.
    pub const fn new() -> Self {
        Self {
            builders: BTreeMap::new(),
            infeasible: BTreeMap::new(),
        }
    }

    /// Recount producers from scratch for `player`.
    pub fn rebuild_from(game: &dyn GameQuery, player: PlayerId) -> Self {
        let mut cache = Self::new();
        for entity in game.entities_of(player) {
            cache.record_unit_change(entity, UnitDelta::Added);
        }
        debug!(%player, templates = cache.builders.len(), "Eligibility cache rebuilt");
        cache
    }

    /// Update producer counts for every template `unit` can produce.
    pub fn record_unit_change(&mut self, unit: &EntityInfo, delta: UnitDelta) {
        for template in &unit.producible {
            match delta {
                UnitDelta::Added => {
                    let count = self.builders.entry(template.clone()).or_insert(0);
                    *count = count.saturating_add(1);
                }
                UnitDelta::Removed => match self.builders.get_mut(template) {
                    Some(count) if *count > 1 => *count = count.saturating_sub(1),
                    Some(_) => {
                        self.builders.remove(template);
                    }
                    None => {
                        warn!(
                            unit = %unit.id,
                            %template,
                            "Producer removed for a template with no recorded builders"
                        );
                    }
                },
            }
        }
    }

    /// Whether `template` has a producer and is not cooling down.
    pub fn is_currently_buildable(&self, template: &TemplateId, now: f64) -> bool {
        self.builder_count(template) > 0
            && self
                .infeasible
                .get(template)
                .is_none_or(|entry| now >= entry.retry_after)
    }

    /// Put `template` on cooldown for `duration` seconds. An existing later
    /// retry time is kept; the reason is always overwritten.
    pub fn mark_infeasible(
        &mut self,
        template: &TemplateId,
        now: f64,
        duration: f64,
        reason: InfeasibleReason,
    ) {
        let requested = now + duration.max(0.0);
        let retry_after = self
            .infeasible
            .get(template)
            .map_or(requested, |entry| entry.retry_after.max(requested));
        debug!(%template, %reason, retry_after, "Template marked infeasible");
        self.infeasible.insert(
            template.clone(),
            Infeasibility {
                reason,
                retry_after,
            },
        );
    }

    /// [`mark_infeasible`](Self::mark_infeasible) with the configured
    /// cooldown for `reason`.
    pub fn mark_infeasible_default(
        &mut self,
        template: &TemplateId,
        now: f64,
        reason: InfeasibleReason,
        config: &EligibilityConfig,
    ) {
        self.mark_infeasible(template, now, config.cooldown_for(reason), reason);
    }

    /// Lift any cooldown on `template`.
    pub fn mark_feasible_again(&mut self, template: &TemplateId) {
        if self.infeasible.remove(template).is_some() {
            debug!(%template, "Template feasible again");
        }
    }

    /// The first currently buildable template, in name order, accepted by
    /// `predicate`.
    pub fn find_first_matching(
        &self,
        now: f64,
        mut predicate: impl FnMut(&TemplateId) -> bool,
    ) -> Option<&TemplateId> {
        self.builders
            .keys()
            .find(|template| self.is_currently_buildable(template, now) && predicate(template))
    }

    /// Number of owned producers for `template`.
    pub fn builder_count(&self, template: &TemplateId) -> u32 {
        self.builders.get(template).copied().unwrap_or(0)
    }

    /// The active or expired cooldown entry for `template`, if any.
    pub fn infeasibility(&self, template: &TemplateId) -> Option<&Infeasibility> {
        self.infeasible.get(template)
    }

    /// Drop cooldown entries whose retry time has passed. Returns how many
    /// were removed.
    pub fn prune_expired(&mut self, now: f64) -> usize {
        let before = self.infeasible.len();
        self.infeasible.retain(|_, entry| now < entry.retry_after);
        before.saturating_sub(self.infeasible.len())
    }
}

#[cfg(test)]
mod tests {
    use warden_types::{EntityId, PlayerId};

    use super::*;

    fn producer(id: u32, templates: &[&str]) -> EntityInfo {
        EntityInfo::new(EntityId(id), "structures/barracks", PlayerId(1))
            .producing(templates.iter().map(|t| TemplateId::from(*t)))
    }

    #[test]
    fn counts_follow_adds_and_removes() {
        let mut cache = BuildEligibilityCache::new();
        let spear = TemplateId::from("units/spearman");
        cache.record_unit_change(&producer(1, &["units/spearman"]), UnitDelta::Added);
        cache.record_unit_change(&producer(2, &["units/spearman"]), UnitDelta::Added);
        assert_eq!(cache.builder_count(&spear), 2);

        cache.record_unit_change(&producer(1, &["units/spearman"]), UnitDelta::Removed);
        cache.record_unit_change(&producer(2, &["units/spearman"]), UnitDelta::Removed);
        assert_eq!(cache.builder_count(&spear), 0);
        assert!(!cache.is_currently_buildable(&spear, 0.0));
    }

    #[test]
    fn removal_below_zero_is_ignored() {
        let mut cache = BuildEligibilityCache::new();
        cache.record_unit_change(&producer(1, &["units/archer"]), UnitDelta::Removed);
        assert_eq!(cache.builder_count(&TemplateId::from("units/archer")), 0);
        cache.record_unit_change(&producer(1, &["units/archer"]), UnitDelta::Added);
        assert_eq!(cache.builder_count(&TemplateId::from("units/archer")), 1);
    }

    #[test]
    fn cooldown_blocks_until_retry_time() {
        let mut cache = BuildEligibilityCache::new();
        let house = TemplateId::from("structures/house");
        cache.record_unit_change(&producer(1, &["structures/house"]), UnitDelta::Added);
        cache.mark_infeasible(&house, 10.0, 30.0, InfeasibleReason::NoRoom);
        assert!(!cache.is_currently_buildable(&house, 39.9));
        assert!(cache.is_currently_buildable(&house, 40.0));
    }

    #[test]
    fn shorter_cooldown_never_shortens_retry() {
        let mut cache = BuildEligibilityCache::new();
        let house = TemplateId::from("structures/house");
        cache.mark_infeasible(&house, 0.0, 100.0, InfeasibleReason::NoRoom);
        cache.mark_infeasible(&house, 5.0, 10.0, InfeasibleReason::NoBuilder);
        let entry = cache.infeasibility(&house).copied();
        assert_eq!(
            entry,
            Some(Infeasibility {
                reason: InfeasibleReason::NoBuilder,
                retry_after: 100.0,
            })
        );
    }

    #[test]
    fn default_cooldown_uses_config() {
        let mut cache = BuildEligibilityCache::new();
        let tower = TemplateId::from("structures/tower");
        let config = EligibilityConfig::default();
        cache.mark_infeasible_default(&tower, 20.0, InfeasibleReason::Locked, &config);
        let retry = cache.infeasibility(&tower).map(|e| e.retry_after);
        assert_eq!(retry, Some(20.0 + config.locked_cooldown_secs));
    }

    #[test]
    fn feasible_again_clears_cooldown() {
        let mut cache = BuildEligibilityCache::new();
        let house = TemplateId::from("structures/house");
        cache.record_unit_change(&producer(1, &["structures/house"]), UnitDelta::Added);
        cache.mark_infeasible(&house, 0.0, 1_000.0, InfeasibleReason::NoRoom);
        cache.mark_feasible_again(&house);
        assert!(cache.is_currently_buildable(&house, 1.0));
    }

    #[test]
    fn find_first_matching_skips_cooling_and_unmatched() {
        let mut cache = BuildEligibilityCache::new();
        cache.record_unit_change(
            &producer(1, &["units/archer", "units/cavalry", "units/spearman"]),
            UnitDelta::Added,
        );
        cache.mark_infeasible(
            &TemplateId::from("units/archer"),
            0.0,
            60.0,
            InfeasibleReason::LimitReached,
        );
        let found = cache.find_first_matching(1.0, |t| t.as_str() != "units/cavalry");
        assert_eq!(found.map(TemplateId::as_str), Some("units/spearman"));
        assert!(cache.find_first_matching(1.0, |_| false).is_none());
    }

    #[test]
    fn prune_drops_only_expired() {
        let mut cache = BuildEligibilityCache::new();
        cache.mark_infeasible(&TemplateId::from("a"), 0.0, 10.0, InfeasibleReason::NoRoom);
        cache.mark_infeasible(&TemplateId::from("b"), 0.0, 50.0, InfeasibleReason::NoRoom);
        assert_eq!(cache.prune_expired(20.0), 1);
        assert!(cache.infeasibility(&TemplateId::from("b")).is_some());
    }
}
