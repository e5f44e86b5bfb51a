//! Resource ledger and escrow bookkeeping for the Warden agent.
//!
//! The agent's stockpile is owned by the host simulation; each turn the
//! scheduler mirrors it into a [`ResourceLedger`] and carves reservations
//! out of it into per-group [`EscrowAccount`]s. Reserved resources stay
//! reserved across turns until the owning plan starts or is cancelled.
//!
//! # Modules
//!
//! - [`ledger`] -- The [`ResourceLedger`]: owned quantities and spending.
//! - [`escrow`] -- The [`EscrowAccount`]: one demand group's reservation.
//! - [`conservation`] -- Escrow conservation check and anomaly reporting.
//!
//! # Conservation Law
//!
//! At every turn boundary and for every resource R:
//!
//! ```text
//! sum(escrow[R] over all accounts) <= owned[R]
//! ```
//!
//! A violation produces an [`EscrowAnomaly`]. The ledger never panics; it
//! returns errors and lets the caller decide how loudly to complain.
//!
//! # Usage
//!
//! ```
//! use warden_ledger::{EscrowAccount, ResourceLedger};
//! use warden_ledger::conservation::{verify_escrow, ConservationResult};
//! use warden_types::{ResourceKind, Resources};
//!
//! let mut ledger = ResourceLedger::with_owned(Resources::from_pairs([(ResourceKind::Wood, 100)]));
//! let mut houses = EscrowAccount::new();
//! houses.deposit(ResourceKind::Wood, 60);
//!
//! let unclaimed = ledger.unclaimed([&houses]);
//! assert_eq!(unclaimed.get(ResourceKind::Wood), 40);
//! assert_eq!(
//!     verify_escrow(0, ledger.owned(), [("houses", &houses)]),
//!     ConservationResult::Balanced,
//! );
//! ```

pub mod conservation;
pub mod escrow;
pub mod ledger;

// Re-export primary types at crate root.
pub use conservation::{ConservationResult, verify_escrow, verify_escrow_caps};
pub use escrow::EscrowAccount;
pub use ledger::ResourceLedger;

use std::collections::BTreeMap;

use warden_types::ResourceKind;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when moving resources through the ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The ledger or account holds less than requested.
    #[error("insufficient {kind:?}: requested {requested}, available {available}")]
    Insufficient {
        /// The resource that ran short.
        kind: ResourceKind,
        /// The quantity requested.
        requested: u32,
        /// The quantity actually held.
        available: u32,
    },
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// An escrow conservation violation detected at a turn boundary.
///
/// Captures, for every resource that was over-reserved, the owned amount
/// and the total reserved across all accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowAnomaly {
    /// The turn at which the anomaly was detected.
    pub turn: u64,
    /// Per-resource imbalance: (`owned`, `reserved`).
    pub imbalances: BTreeMap<ResourceKind, (u64, u64)>,
    /// Human-readable description of the anomaly.
    pub message: String,
}

impl core::fmt::Display for EscrowAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}
