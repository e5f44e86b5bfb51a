//! Escrow accounts: resources provisionally reserved for one demand group.

use serde::{Deserialize, Serialize};

use warden_types::{ResourceKind, Resources};

use crate::LedgerError;

/// One demand group's reservation against the shared stockpile.
///
/// The account never holds real resources; it only records how much of
/// the ledger's owned amounts is spoken for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowAccount {
    /// Reserved quantities.
    held: Resources,
}

impl EscrowAccount {
    /// An empty account.
    pub const fn new() -> Self {
        Self {
            held: Resources::new(),
        }
    }

    /// Everything currently reserved.
    pub const fn held(&self) -> &Resources {
        &self.held
    }

    /// Reserved quantity of one kind.
    pub fn balance(&self, kind: ResourceKind) -> u32 {
        self.held.get(kind)
    }

    /// Whether nothing is reserved.
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Reserve `qty` more of `kind`.
    pub fn deposit(&mut self, kind: ResourceKind, qty: u32) {
        self.held.add(kind, qty);
    }

    /// Whether the reservation covers `cost` in every kind.
    pub fn covers(&self, cost: &Resources) -> bool {
        self.held.covers(cost)
    }

    /// Consume `cost` from the reservation, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Insufficient`] if any kind is short.
    pub fn withdraw(&mut self, cost: &Resources) -> Result<(), LedgerError> {
        for (kind, qty) in cost.iter() {
            let available = self.held.get(kind);
            if available < qty {
                return Err(LedgerError::Insufficient {
                    kind,
                    requested: qty,
                    available,
                });
            }
        }
        self.held.sub_all(cost);
        Ok(())
    }

    /// Give back up to `qty` of `kind`. Returns the amount actually released.
    pub fn take(&mut self, kind: ResourceKind, qty: u32) -> u32 {
        let released = self.held.get(kind).min(qty);
        self.held.sub(kind, released);
        released
    }

    /// Trim the reservation so no kind exceeds `cap`. Returns what was released.
    pub fn clamp_to(&mut self, cap: &Resources) -> Resources {
        let kept = self.held.clamped_to(cap);
        let mut released = self.held.clone();
        released.sub_all(&kept);
        self.held = kept;
        released
    }

    /// Drop the whole reservation. Returns what was released.
    pub fn release_all(&mut self) -> Resources {
        core::mem::take(&mut self.held)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wood(n: u32) -> Resources {
        Resources::from_pairs([(ResourceKind::Wood, n)])
    }

    #[test]
    fn deposit_and_cover() {
        let mut account = EscrowAccount::new();
        account.deposit(ResourceKind::Wood, 40);
        assert!(!account.covers(&wood(50)));
        account.deposit(ResourceKind::Wood, 10);
        assert!(account.covers(&wood(50)));
    }

    #[test]
    fn withdraw_rejects_partial() {
        let mut account = EscrowAccount::new();
        account.deposit(ResourceKind::Wood, 40);
        assert!(account.withdraw(&wood(50)).is_err());
        assert_eq!(account.balance(ResourceKind::Wood), 40);
        assert!(account.withdraw(&wood(40)).is_ok());
        assert!(account.is_empty());
    }

    #[test]
    fn clamp_releases_excess_and_foreign_kinds() {
        let mut account = EscrowAccount::new();
        account.deposit(ResourceKind::Wood, 80);
        account.deposit(ResourceKind::Metal, 15);
        let released = account.clamp_to(&wood(50));
        assert_eq!(account.held(), &wood(50));
        assert_eq!(
            released,
            Resources::from_pairs([(ResourceKind::Wood, 30), (ResourceKind::Metal, 15)])
        );
    }

    #[test]
    fn take_is_bounded_by_balance() {
        let mut account = EscrowAccount::new();
        account.deposit(ResourceKind::Stone, 7);
        assert_eq!(account.take(ResourceKind::Stone, 3), 3);
        assert_eq!(account.take(ResourceKind::Stone, 10), 4);
        assert!(account.is_empty());
    }

    #[test]
    fn release_all_empties_account() {
        let mut account = EscrowAccount::new();
        account.deposit(ResourceKind::Food, 12);
        assert_eq!(account.release_all().get(ResourceKind::Food), 12);
        assert!(account.is_empty());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn account_survives_json_round_trip() {
        let mut account = EscrowAccount::new();
        account.deposit(ResourceKind::Wood, 40);
        account.deposit(ResourceKind::Metal, 15);
        let json = serde_json::to_string(&account).unwrap();
        assert!(json.contains("\"wood\":40"), "{json}");
        let restored: EscrowAccount = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, account);
        assert_eq!(restored.balance(ResourceKind::Metal), 15);
    }
}
