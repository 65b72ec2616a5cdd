//! Earned-credit lots and the links that draw them down.
//!
//! Maintains the invariant: `0 <= remaining_amount <= original_amount`.

use crate::decimal::Money;
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use std::cmp;

/// Remaining-balance-tracked unit of one earned transaction.
///
/// # Invariants
///
/// - `remaining_amount` only ever decreases, and never drops below zero
/// - An exhausted lot (`remaining_amount == 0`) is kept for audit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lot {
    pub source_transaction_id: u64,

    pub customer_id: u64,

    pub earned_at: DateTime<Utc>,

    pub expires_at: Option<DateTime<Utc>>,

    pub original_amount: Money,

    pub remaining_amount: Money,
}

impl Lot {
    /// Opens a lot for an earned transaction.
    ///
    /// Callers are expected to have rejected negative earn amounts already.
    pub fn open(tx: &Transaction) -> Self {
        Lot {
            source_transaction_id: tx.id,
            customer_id: tx.customer_id,
            earned_at: tx.timestamp,
            expires_at: tx.expires_at,
            original_amount: tx.amount,
            remaining_amount: tx.amount,
        }
    }

    /// Returns `true` once nothing is left to draw.
    pub fn is_exhausted(&self) -> bool {
        !self.remaining_amount.is_positive()
    }

    /// Whether a consumer at `at` may draw on this lot. Same-instant earns
    /// are not eligible.
    pub fn is_eligible_for(&self, at: DateTime<Utc>) -> bool {
        self.earned_at < at
    }

    /// Total drawn so far.
    pub fn consumed(&self) -> Money {
        self.original_amount - self.remaining_amount
    }

    /// Draws up to `demand` from the lot and returns the amount applied.
    pub fn draw(&mut self, demand: Money) -> Money {
        if !demand.is_positive() || self.is_exhausted() {
            return Money::ZERO;
        }

        let applied = cmp::min(self.remaining_amount, demand);
        self.remaining_amount -= applied;
        applied
    }

    #[cfg(debug_assertions)]
    pub fn check_invariant(&self) -> bool {
        !self.remaining_amount.is_negative() && self.remaining_amount <= self.original_amount
    }
}

/// One draw of a consumer transaction against one lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumptionLink {
    /// Earned transaction that funded the draw.
    pub lot_transaction_id: u64,

    /// Spent or expired transaction that drew.
    pub consumer_transaction_id: u64,

    pub customer_id: u64,

    pub amount_applied: Money,

    /// Creation order within the customer's sweep, starting at zero.
    pub sequence: u64,
}
