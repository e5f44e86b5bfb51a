//! The resource ledger: what the agent owns right now.
//!
//! The host simulation is the source of truth for stockpiles, so the
//! ledger is re-synced at the start of every turn. Between syncs the
//! scheduler spends from it as plans start, keeping the mirror consistent
//! with the orders it has just issued.

use serde::{Deserialize, Serialize};
use tracing::trace;

use warden_types::{ResourceKind, Resources};

use crate::LedgerError;
use crate::escrow::EscrowAccount;

/// Owned resource quantities for one agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLedger {
    /// Quantities owned, per resource kind.
    owned: Resources,
}

impl ResourceLedger {
    /// Create an empty ledger.
    pub const fn new() -> Self {
        Self {
            owned: Resources::new(),
        }
    }

    /// Create a ledger holding `owned`.
    pub const fn with_owned(owned: Resources) -> Self {
        Self { owned }
    }

    /// All owned quantities.
    pub const fn owned(&self) -> &Resources {
        &self.owned
    }

    /// Owned quantity of one kind.
    pub fn owned_of(&self, kind: ResourceKind) -> u32 {
        self.owned.get(kind)
    }

    /// Replace the owned quantities with the host's current stockpile.
    pub fn sync(&mut self, current: &Resources) {
        if &self.owned != current {
            trace!(from = %self.owned, to = %current, "Ledger synced with host stockpile");
        }
        self.owned = current.clone();
    }

    /// Credit `qty` of `kind`.
    pub fn add(&mut self, kind: ResourceKind, qty: u32) {
        self.owned.add(kind, qty);
    }

    /// Debit `qty` of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Insufficient`] if less than `qty` is owned;
    /// the ledger is left unchanged.
    pub fn subtract(&mut self, kind: ResourceKind, qty: u32) -> Result<(), LedgerError> {
        let available = self.owned.get(kind);
        if available < qty {
            return Err(LedgerError::Insufficient {
                kind,
                requested: qty,
                available,
            });
        }
        self.owned.sub(kind, qty);
        Ok(())
    }

    /// Debit a whole cost vector, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Insufficient`] for the first kind that is
    /// short; nothing is debited in that case.
    pub fn spend(&mut self, cost: &Resources) -> Result<(), LedgerError> {
        for (kind, qty) in cost.iter() {
            let available = self.owned.get(kind);
            if available < qty {
                return Err(LedgerError::Insufficient {
                    kind,
                    requested: qty,
                    available,
                });
            }
        }
        self.owned.sub_all(cost);
        Ok(())
    }

    /// Owned resources not reserved by any of `accounts`.
    ///
    /// Saturates at zero per kind, so a stockpile that dropped below its
    /// reservations (the host spent resources behind our back) reads as
    /// nothing unclaimed rather than underflowing.
    pub fn unclaimed<'a>(&self, accounts: impl IntoIterator<Item = &'a EscrowAccount>) -> Resources {
        let mut reserved = Resources::new();
        for account in accounts {
            reserved.add_all(account.held());
        }
        let mut free = self.owned.clone();
        free.sub_all(&reserved);
        free
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wood(n: u32) -> Resources {
        Resources::from_pairs([(ResourceKind::Wood, n)])
    }

    #[test]
    fn new_ledger_is_empty() {
        let ledger = ResourceLedger::new();
        assert!(ledger.owned().is_empty());
        assert_eq!(ledger.owned_of(ResourceKind::Food), 0);
    }

    #[test]
    fn subtract_rejects_overdraft_and_leaves_balance() {
        let mut ledger = ResourceLedger::with_owned(wood(10));
        let result = ledger.subtract(ResourceKind::Wood, 11);
        assert_eq!(
            result,
            Err(LedgerError::Insufficient {
                kind: ResourceKind::Wood,
                requested: 11,
                available: 10,
            })
        );
        assert_eq!(ledger.owned_of(ResourceKind::Wood), 10);
    }

    #[test]
    fn spend_is_all_or_nothing() {
        let mut ledger = ResourceLedger::with_owned(Resources::from_pairs([
            (ResourceKind::Wood, 100),
            (ResourceKind::Stone, 5),
        ]));
        let cost = Resources::from_pairs([(ResourceKind::Wood, 50), (ResourceKind::Stone, 10)]);
        assert!(ledger.spend(&cost).is_err());
        assert_eq!(ledger.owned_of(ResourceKind::Wood), 100);

        assert!(ledger.spend(&wood(50)).is_ok());
        assert_eq!(ledger.owned_of(ResourceKind::Wood), 50);
    }

    #[test]
    fn unclaimed_excludes_every_account() {
        let ledger = ResourceLedger::with_owned(wood(100));
        let mut a = EscrowAccount::new();
        let mut b = EscrowAccount::new();
        a.deposit(ResourceKind::Wood, 30);
        b.deposit(ResourceKind::Wood, 25);
        assert_eq!(ledger.unclaimed([&a, &b]), wood(45));
    }

    #[test]
    fn unclaimed_saturates_when_host_spent_reserved_stock() {
        let ledger = ResourceLedger::with_owned(wood(20));
        let mut a = EscrowAccount::new();
        a.deposit(ResourceKind::Wood, 30);
        assert!(ledger.unclaimed([&a]).is_empty());
    }

    #[test]
    fn sync_replaces_owned() {
        let mut ledger = ResourceLedger::with_owned(wood(5));
        ledger.sync(&Resources::from_pairs([(ResourceKind::Food, 300)]));
        assert_eq!(ledger.owned_of(ResourceKind::Wood), 0);
        assert_eq!(ledger.owned_of(ResourceKind::Food), 300);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn ledger_survives_json_round_trip() {
        let ledger = ResourceLedger::with_owned(Resources::from_pairs([
            (ResourceKind::Food, 300),
            (ResourceKind::Stone, 45),
        ]));
        let json = serde_json::to_string(&ledger).unwrap();
        let restored: ResourceLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, ledger);
        assert_eq!(restored.owned_of(ResourceKind::Stone), 45);
    }
}
