//! Demand groups: named buckets of plans saving up for their top plan.
//!
//! Each group keeps its candidate plans ordered by plan priority (higher
//! first, FIFO among equals) and an escrow account that never holds more
//! than the top plan costs.

use serde::{Deserialize, Serialize};
use tracing::debug;

use warden_ledger::EscrowAccount;
use warden_types::{PlanId, PlanState, Resources};

use crate::plan::Plan;

/// A plan waiting in a group, with its group-local priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedPlan {
    /// Order within the group; higher goes first.
    pub priority: i32,
    /// The plan itself.
    pub plan: Plan,
}

/// A named bucket of candidate plans with its own escrow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandGroup {
    name: String,
    priority: u32,
    paused: bool,
    plans: Vec<QueuedPlan>,
    escrow: EscrowAccount,
}

impl DemandGroup {
    /// An empty, unpaused group.
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            paused: false,
            plans: Vec::new(),
            escrow: EscrowAccount::new(),
        }
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Share weight in the proportional distribution.
    pub const fn priority(&self) -> u32 {
        self.priority
    }

    /// Change the share weight.
    pub const fn set_priority(&mut self, priority: u32) {
        self.priority = priority;
    }

    /// Whether the group is excluded from execution and distribution.
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Pause or resume the group. A paused group keeps its escrow.
    pub const fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Queued plans, best first.
    pub fn plans(&self) -> &[QueuedPlan] {
        &self.plans
    }

    /// Number of queued plans.
    pub const fn len(&self) -> usize {
        self.plans.len()
    }

    /// Whether no plans are queued.
    pub const fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// The group's reservation.
    pub const fn escrow(&self) -> &EscrowAccount {
        &self.escrow
    }

    pub(crate) const fn escrow_mut(&mut self) -> &mut EscrowAccount {
        &mut self.escrow
    }

    /// The plan the group is currently saving for.
    pub fn top(&self) -> Option<&QueuedPlan> {
        self.plans.first()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut QueuedPlan> {
        self.plans.first_mut()
    }

    /// Cost of the top plan, if any.
    pub fn top_cost(&self) -> Option<Resources> {
        self.top().map(|queued| queued.plan.cost())
    }

    /// What the escrow still lacks to pay for the top plan.
    pub fn needs(&self) -> Resources {
        self.top_cost()
            .map(|cost| self.escrow.held().shortfall(&cost))
            .unwrap_or_default()
    }

    /// Queue `plan` at `priority`.
    ///
    /// A queued unit plan with the same template, metadata, cost and
    /// priority absorbs as much of the new quantity as its merge cap
    /// allows; any overflow is queued as its own plan. The escrow is then
    /// re-clamped to whatever plan is now on top. Returns the id of the
    /// plan that took the last of the quantity.
    pub fn add_plan(&mut self, priority: i32, mut plan: Plan) -> PlanId {
        let mut remaining = plan.quantity();
        let mut last = None;
        for queued in &mut self.plans {
            if remaining == 0 {
                break;
            }
            if queued.priority == priority && queued.plan.is_mergeable_with(&plan) {
                let overflow = queued.plan.add_item(remaining);
                if overflow < remaining {
                    last = Some(queued.plan.id());
                }
                remaining = overflow;
            }
        }

        if remaining == 0 {
            debug!(group = %self.name, template = %plan.template(), "Plan merged");
            self.reclamp_after_insert();
            return last.unwrap_or_else(|| plan.id());
        }

        plan.set_quantity(remaining);
        let id = plan.id();
        let index = self
            .plans
            .iter()
            .position(|queued| queued.priority < priority)
            .unwrap_or(self.plans.len());
        debug!(
            group = %self.name,
            plan = %id,
            template = %plan.template(),
            priority,
            position = index,
            "Plan queued"
        );
        self.plans.insert(index, QueuedPlan { priority, plan });
        self.reclamp_after_insert();
        id
    }

    fn reclamp_after_insert(&mut self) {
        let released = self.clamp_escrow();
        if !released.is_empty() {
            debug!(group = %self.name, released = %released, "Escrow trimmed to new top plan");
        }
    }

    /// Cancel and remove a plan, then re-clamp the escrow to whatever plan
    /// is now on top.
    pub fn remove_plan(&mut self, id: PlanId) -> Option<Plan> {
        let index = self.plans.iter().position(|queued| queued.plan.id() == id)?;
        let mut removed = self.plans.remove(index).plan;
        removed.cancel();
        let released = self.clamp_escrow();
        debug!(group = %self.name, plan = %id, released = %released, "Plan removed");
        Some(removed)
    }

    /// Take the top plan off the queue without cancelling it.
    pub(crate) fn pop_top(&mut self) -> Option<Plan> {
        if self.plans.is_empty() {
            return None;
        }
        Some(self.plans.remove(0).plan)
    }

    /// Drop plans that are no longer queued.
    pub(crate) fn drop_finished(&mut self) {
        self.plans.retain(|queued| queued.plan.state() == PlanState::Queued);
    }

    /// Trim the escrow to the top plan's cost, or release it all when the
    /// group is empty. Returns what was released.
    pub fn clamp_escrow(&mut self) -> Resources {
        match self.top_cost() {
            Some(cost) => self.escrow.clamp_to(&cost),
            None => self.escrow.release_all(),
        }
    }
}
