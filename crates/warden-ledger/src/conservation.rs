//! Escrow conservation checks.
//!
//! Two laws hold at every turn boundary:
//!
//! ```text
//! sum(escrow[R] over all accounts) <= owned[R]     (no over-reservation)
//! escrow[R] <= top_plan_cost[R]                    (no hoarding per group)
//! ```
//!
//! The scheduler's allocation pass maintains both by construction. These
//! checks run after every pass and turn a silent bookkeeping bug into an
//! [`EscrowAnomaly`] the caller can log.

use std::collections::BTreeMap;

use warden_types::{ResourceKind, Resources};

use crate::EscrowAnomaly;
use crate::escrow::EscrowAccount;

/// The result of a conservation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConservationResult {
    /// All reservations are backed by owned resources.
    Balanced,
    /// One or more resources are over-reserved.
    Anomaly(EscrowAnomaly),
}

impl ConservationResult {
    /// Whether the check passed.
    pub const fn is_balanced(&self) -> bool {
        matches!(self, Self::Balanced)
    }
}

/// Verify that the accounts together reserve no more than is owned.
///
/// Sums are taken in `u64` so that many large accounts cannot overflow.
pub fn verify_escrow<'a>(
    turn: u64,
    owned: &Resources,
    accounts: impl IntoIterator<Item = (&'a str, &'a EscrowAccount)>,
) -> ConservationResult {
    let mut reserved: BTreeMap<ResourceKind, u64> = BTreeMap::new();

    for (_, account) in accounts {
        for (kind, qty) in account.held().iter() {
            let total = reserved.entry(kind).or_insert(0);
            *total = total.saturating_add(u64::from(qty));
        }
    }

    let imbalances: BTreeMap<ResourceKind, (u64, u64)> = reserved
        .into_iter()
        .filter_map(|(kind, total)| {
            let have = u64::from(owned.get(kind));
            (total > have).then_some((kind, (have, total)))
        })
        .collect();

    if imbalances.is_empty() {
        ConservationResult::Balanced
    } else {
        let count = imbalances.len();
        ConservationResult::Anomaly(EscrowAnomaly {
            turn,
            imbalances,
            message: format!(
                "ESCROW_ANOMALY at turn {turn}: reservations exceed stockpile for {count} resource(s)",
            ),
        })
    }
}

/// Verify that no account holds more than its cap (the cost of the plan it
/// is saving for). An account without a cap must be empty.
pub fn verify_escrow_caps<'a>(
    turn: u64,
    accounts: impl IntoIterator<Item = (&'a str, &'a EscrowAccount, Option<&'a Resources>)>,
) -> ConservationResult {
    let empty = Resources::new();
    let mut imbalances: BTreeMap<ResourceKind, (u64, u64)> = BTreeMap::new();
    let mut offenders: Vec<&str> = Vec::new();

    for (name, account, cap) in accounts {
        let cap = cap.unwrap_or(&empty);
        let mut offended = false;
        for (kind, qty) in account.held().iter() {
            let limit = cap.get(kind);
            if qty > limit {
                offended = true;
                imbalances.insert(kind, (u64::from(limit), u64::from(qty)));
            }
        }
        if offended {
            offenders.push(name);
        }
    }

    if offenders.is_empty() {
        ConservationResult::Balanced
    } else {
        ConservationResult::Anomaly(EscrowAnomaly {
            turn,
            imbalances,
            message: format!(
                "ESCROW_ANOMALY at turn {turn}: accounts hold more than their plan needs: {}",
                offenders.join(", "),
            ),
        })
    }
}
