//! Running balances per customer.
//!
//! Maintains the identity: `balance == cumulative_earned - cumulative_spent - cumulative_expired`.

use crate::decimal::Money;
use crate::transaction::{Transaction, TxKind};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Cumulative totals for one customer at one point in time.
///
/// # Negative Balance
///
/// `balance` is never clamped. A negative value means consumption outran
/// earned credit and is reported as a data-quality warning elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerBalance {
    pub customer_id: u64,

    pub cumulative_earned: Money,

    pub cumulative_spent: Money,

    pub cumulative_expired: Money,

    pub balance: Money,
}

impl CustomerBalance {
    /// Creates an empty balance for a customer.
    pub fn new(customer_id: u64) -> Self {
        CustomerBalance {
            customer_id,
            cumulative_earned: Money::ZERO,
            cumulative_spent: Money::ZERO,
            cumulative_expired: Money::ZERO,
            balance: Money::ZERO,
        }
    }

    /// Folds one transaction into the totals. Spent and expired amounts are
    /// counted by magnitude.
    pub fn apply(&mut self, tx: &Transaction) {
        match tx.kind {
            TxKind::Earned => {
                self.cumulative_earned += tx.amount;
                self.balance += tx.amount;
            }
            TxKind::Spent => {
                self.cumulative_spent += tx.demand();
                self.balance -= tx.demand();
            }
            TxKind::Expired => {
                self.cumulative_expired += tx.demand();
                self.balance -= tx.demand();
            }
        }
    }

    pub fn is_negative(&self) -> bool {
        self.balance.is_negative()
    }

    /// Verifies the identity between totals and balance.
    #[cfg(debug_assertions)]
    pub fn check_invariant(&self) -> bool {
        self.balance == self.cumulative_earned - self.cumulative_spent - self.cumulative_expired
    }
}

/// Balance after a specific transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceEntry {
    pub transaction_id: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: TxKind,
    pub amount: Money,
    pub totals: CustomerBalance,
}

/// Ordered running balances for every customer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceHistory {
    entries: BTreeMap<u64, Vec<BalanceEntry>>,
}

impl BalanceHistory {
    /// Builds running totals in `(timestamp, id)` order per customer, the same
    /// order the matching sweep uses.
    pub fn build(transactions: &[Transaction]) -> Self {
        let mut by_customer: BTreeMap<u64, Vec<&Transaction>> = BTreeMap::new();
        for tx in transactions {
            by_customer.entry(tx.customer_id).or_default().push(tx);
        }

        let entries = by_customer
            .into_iter()
            .map(|(customer_id, mut txs)| {
                txs.sort_by_key(|tx| tx.sort_key());

                let mut running = CustomerBalance::new(customer_id);
                let history = txs
                    .into_iter()
                    .map(|tx| {
                        running.apply(tx);
                        BalanceEntry {
                            transaction_id: tx.id,
                            timestamp: tx.timestamp,
                            kind: tx.kind,
                            amount: tx.amount,
                            totals: running.clone(),
                        }
                    })
                    .collect();
                (customer_id, history)
            })
            .collect();

        BalanceHistory { entries }
    }

    /// Customers with at least one transaction, ascending.
    pub fn customers(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.keys().copied()
    }

    /// Full history for a customer.
    pub fn history(&self, customer_id: u64) -> &[BalanceEntry] {
        self.entries
            .get(&customer_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All entries, customer by customer.
    pub fn entries(&self) -> impl Iterator<Item = &BalanceEntry> {
        self.entries.values().flatten()
    }

    /// Balance after the customer's last transaction.
    pub fn current(&self, customer_id: u64) -> Option<&CustomerBalance> {
        self.history(customer_id).last().map(|entry| &entry.totals)
    }

    /// Current snapshot for every customer, ascending by id.
    pub fn current_all(&self) -> Vec<&CustomerBalance> {
        self.entries
            .values()
            .filter_map(|history| history.last().map(|entry| &entry.totals))
            .collect()
    }

    /// Balance as of `at`, inclusive. A customer with no activity by then
    /// reads as all zeros.
    pub fn balance_on(&self, customer_id: u64, at: DateTime<Utc>) -> CustomerBalance {
        let history = self.history(customer_id);
        let idx = history.partition_point(|entry| entry.timestamp <= at);
        match idx {
            0 => CustomerBalance::new(customer_id),
            n => history[n - 1].totals.clone(),
        }
    }
}
