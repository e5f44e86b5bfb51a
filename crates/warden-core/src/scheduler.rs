//! The escrow-based priority resource scheduler.
//!
//! Every turn the scheduler turns the agent's stockpile into committed
//! orders without letting cheap, frequent demands starve expensive ones.
//!
//! # Turn pass
//!
//! ```text
//! sync ledger ─> clamp escrows ─> rebalance overdraft ─> execute ─> distribute ─> verify
//! ```
//!
//! 1. The ledger mirrors the host stockpile. Every group's escrow is trimmed
//!    to its top plan's cost (all of it released when the group is empty).
//!    If the host spent stock that was reserved, the shortfall is taken back
//!    from the lowest-priority groups first.
//! 2. Unpaused groups, highest priority first, start their top plan once
//!    escrow covers its full cost and the template is buildable. A started
//!    plan's cost leaves both ledger and escrow; the rest of the escrow is
//!    released.
//! 3. For each resource kind, unclaimed stock is split across the unpaused
//!    groups whose top plan still lacks that kind, in proportion to group
//!    priority and capped at each group's need. Integer floor shares, one
//!    pass, leftovers stay unclaimed. Zero-priority groups receive nothing.
//! 4. Both conservation laws are checked; a violation is logged and the
//!    turn carries on.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use warden_ledger::{ConservationResult, ResourceLedger, verify_escrow, verify_escrow_caps};
use warden_types::{EntityId, PlanId, ResourceKind, Resources, TemplateId};

use crate::config::SchedulerConfig;
use crate::context::AgentContext;
use crate::demand::DemandGroup;
use crate::eligibility::BuildEligibilityCache;
use crate::host::{CommandSink, GameQuery};
use crate::plan::{Plan, PlanError};

/// A plan that was started this turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedPlan {
    /// Group the plan came from.
    pub group: String,
    /// The plan.
    pub plan_id: PlanId,
    /// Template ordered.
    pub template: TemplateId,
    /// Items ordered.
    pub quantity: u32,
    /// Entity that received the order.
    pub producer: EntityId,
    /// What the order cost.
    pub cost: Resources,
}

/// A group still saving for its top plan at the end of the turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDemand {
    /// Group name.
    pub group: String,
    /// Top plan of the group.
    pub plan_id: PlanId,
    /// Template of that plan.
    pub template: TemplateId,
    /// Group priority.
    pub priority: u32,
    /// What the escrow still lacks.
    pub shortfall: Resources,
}

/// Outcome of one scheduler turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Turn number the report belongs to.
    pub turn: u64,
    /// Plans started this turn, in start order.
    pub started: Vec<StartedPlan>,
    /// Groups that could not yet afford their top plan.
    pub pending: Vec<PendingDemand>,
    /// Stock left unreserved after distribution.
    pub unclaimed: Resources,
}

/// Owns the ledger and the demand groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceScheduler {
    ledger: ResourceLedger,
    /// Sorted by group priority, highest first; stable among equals.
    groups: Vec<DemandGroup>,
}

impl ResourceScheduler {
    /// A scheduler with the configured groups and an empty ledger.
    pub fn new(config: &SchedulerConfig) -> Self {
        let mut scheduler = Self::default();
        for group in &config.groups {
            scheduler.add_group(&group.name, group.priority);
        }
        scheduler
    }

    /// The ledger mirror.
    pub const fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// All groups, highest priority first.
    pub fn groups(&self) -> &[DemandGroup] {
        &self.groups
    }

    /// Add an empty group. Returns `false` if the name is taken.
    pub fn add_group(&mut self, name: &str, priority: u32) -> bool {
        if self.group(name).is_some() {
            warn!(group = name, "Demand group already exists");
            return false;
        }
        self.groups.push(DemandGroup::new(name, priority));
        self.sort_groups();
        true
    }

    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&DemandGroup> {
        self.groups.iter().find(|g| g.name() == name)
    }

    /// Look up a group by name, mutably.
    pub fn group_mut(&mut self, name: &str) -> Option<&mut DemandGroup> {
        self.groups.iter_mut().find(|g| g.name() == name)
    }

    /// Queue `plan` in `group`. Returns `None` if the group does not exist.
    pub fn add_plan(&mut self, group: &str, priority: i32, plan: Plan) -> Option<PlanId> {
        let Some(target) = self.group_mut(group) else {
            warn!(group, template = %plan.template(), "Plan queued for unknown demand group");
            return None;
        };
        Some(target.add_plan(priority, plan))
    }

    /// Cancel a plan. Returns the cancelled plan, or `None` if it is not
    /// queued in `group`.
    pub fn remove_plan(&mut self, group: &str, plan_id: PlanId) -> Option<Plan> {
        self.group_mut(group)?.remove_plan(plan_id)
    }

    /// Change a group's priority. Returns `false` if the group does not exist.
    pub fn set_priority(&mut self, group: &str, priority: u32) -> bool {
        let Some(target) = self.group_mut(group) else {
            return false;
        };
        target.set_priority(priority);
        self.sort_groups();
        true
    }

    /// Pause or resume a group. Returns `false` if the group does not exist.
    pub fn set_paused(&mut self, group: &str, paused: bool) -> bool {
        let Some(target) = self.group_mut(group) else {
            return false;
        };
        target.set_paused(paused);
        true
    }

    /// Sum of every group's escrow.
    pub fn total_escrow(&self) -> Resources {
        let mut total = Resources::new();
        for group in &self.groups {
            total.add_all(group.escrow().held());
        }
        total
    }

    fn sort_groups(&mut self) {
        self.groups.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// Run one turn against the host's current stockpile.
    pub fn tick(
        &mut self,
        ctx: &AgentContext,
        current: &Resources,
        eligibility: &mut BuildEligibilityCache,
        game: &dyn GameQuery,
        commands: &mut dyn CommandSink,
    ) -> TickReport {
        let mut report = TickReport {
            turn: ctx.turn(),
            ..TickReport::default()
        };

        // ---- sync and clamp ----
        self.ledger.sync(current);
        for group in &mut self.groups {
            group.drop_finished();
            let released = group.clamp_escrow();
            if !released.is_empty() {
                debug!(group = group.name(), released = %released, "Escrow clamped");
            }
        }
        self.rebalance_overdraft();

        // ---- execute ----
        self.execute(ctx, eligibility, game, commands, &mut report);

        // ---- distribute ----
        let unclaimed = self.distribute();

        // ---- verify ----
        self.verify(ctx.turn());

        for group in &self.groups {
            let Some(queued) = group.top() else {
                continue;
            };
            let shortfall = group.needs();
            if shortfall.is_empty() {
                continue;
            }
            report.pending.push(PendingDemand {
                group: group.name().to_owned(),
                plan_id: queued.plan.id(),
                template: queued.plan.template().clone(),
                priority: group.priority(),
                shortfall,
            });
        }
        report.unclaimed = unclaimed;

        debug!(
            turn = report.turn,
            started = report.started.len(),
            pending = report.pending.len(),
            unclaimed = %report.unclaimed,
            "Scheduler turn complete"
        );
        report
    }

    /// Take back reservations the stockpile no longer backs, lowest
    /// priority groups first.
    fn rebalance_overdraft(&mut self) {
        let reserved = self.total_escrow();
        for kind in ResourceKind::ALL {
            let mut excess = reserved.get(kind).saturating_sub(self.ledger.owned_of(kind));
            if excess == 0 {
                continue;
            }
            warn!(resource = ?kind, excess, "Stockpile fell below reservations, reclaiming escrow");
            for group in self.groups.iter_mut().rev() {
                if excess == 0 {
                    break;
                }
                let taken = group.escrow_mut().take(kind, excess);
                excess = excess.saturating_sub(taken);
            }
        }
    }

    fn execute(
        &mut self,
        ctx: &AgentContext,
        eligibility: &mut BuildEligibilityCache,
        game: &dyn GameQuery,
        commands: &mut dyn CommandSink,
        report: &mut TickReport,
    ) {
        let now = ctx.time();
        for group in &mut self.groups {
            if group.is_paused() {
                continue;
            }
            loop {
                let Some(queued) = group.top() else {
                    break;
                };
                let cost = queued.plan.cost();
                if !group.escrow().covers(&cost) || !queued.plan.can_start(eligibility, now) {
                    break;
                }
                let Some(queued) = group.top_mut() else {
                    break;
                };
                let plan_id = queued.plan.id();
                let quantity = queued.plan.quantity();
                let template = queued.plan.template().clone();

                match queued.plan.start(ctx, game, commands) {
                    Ok(producer) => {
                        if let Err(e) = self.ledger.spend(&cost) {
                            warn!(group = group.name(), plan = %plan_id, error = %e, "Ledger could not cover a started plan");
                        }
                        if let Err(e) = group.escrow_mut().withdraw(&cost) {
                            warn!(group = group.name(), plan = %plan_id, error = %e, "Escrow could not cover a started plan");
                        }
                        group.pop_top();
                        let released = group.escrow_mut().release_all();
                        info!(
                            group = group.name(),
                            plan = %plan_id,
                            %template,
                            quantity,
                            cost = %cost,
                            released = %released,
                            "Plan executed"
                        );
                        report.started.push(StartedPlan {
                            group: group.name().to_owned(),
                            plan_id,
                            template,
                            quantity,
                            producer,
                            cost,
                        });
                    }
                    Err(PlanError::Infeasible { template, reason }) => {
                        eligibility.mark_infeasible_default(
                            &template,
                            now,
                            reason,
                            &ctx.config.eligibility,
                        );
                        break;
                    }
                    Err(e) => {
                        warn!(group = group.name(), plan = %plan_id, error = %e, "Plan start failed");
                        break;
                    }
                }
            }
        }
    }

    /// Split unclaimed stock across groups that still need it. Returns what
    /// is left unclaimed afterwards.
    fn distribute(&mut self) -> Resources {
        let mut unclaimed = self
            .ledger
            .unclaimed(self.groups.iter().map(DemandGroup::escrow));

        for kind in ResourceKind::ALL {
            let available = u64::from(unclaimed.get(kind));
            if available == 0 {
                continue;
            }
            let needs: Vec<(usize, u64, u32)> = self
                .groups
                .iter()
                .enumerate()
                .filter(|(_, g)| !g.is_paused())
                .filter_map(|(i, g)| {
                    let need = g.needs().get(kind);
                    (need > 0).then_some((i, u64::from(g.priority()), need))
                })
                .collect();

            let sum_priority: u64 = needs.iter().map(|(_, p, _)| *p).sum();
            if sum_priority == 0 {
                continue;
            }

            let mut granted_total: u32 = 0;
            for (index, priority, need) in needs {
                let share = available
                    .saturating_mul(priority)
                    .checked_div(sum_priority)
                    .unwrap_or(0);
                let grant = u32::try_from(share).unwrap_or(u32::MAX).min(need);
                if grant == 0 {
                    continue;
                }
                if let Some(group) = self.groups.get_mut(index) {
                    group.escrow_mut().deposit(kind, grant);
                    granted_total = granted_total.saturating_add(grant);
                    debug!(group = group.name(), resource = ?kind, grant, "Escrow funded");
                }
            }
            unclaimed.sub(kind, granted_total);
        }
        unclaimed
    }

    fn verify(&self, turn: u64) {
        let totals = verify_escrow(
            turn,
            self.ledger.owned(),
            self.groups.iter().map(|g| (g.name(), g.escrow())),
        );
        if let ConservationResult::Anomaly(anomaly) = totals {
            warn!(turn, imbalances = ?anomaly.imbalances, "{}", anomaly.message);
        }

        let caps: Vec<Option<Resources>> = self.groups.iter().map(DemandGroup::top_cost).collect();
        let per_group = verify_escrow_caps(
            turn,
            self.groups
                .iter()
                .zip(caps.iter())
                .map(|(g, cap)| (g.name(), g.escrow(), cap.as_ref())),
        );
        if let ConservationResult::Anomaly(anomaly) = per_group {
            warn!(turn, imbalances = ?anomaly.imbalances, "{}", anomaly.message);
        }
    }
}
