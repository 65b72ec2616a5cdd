//! Results of a matching run and the audit lookups over them.

use crate::balance::BalanceHistory;
use crate::decimal::Money;
use crate::finding::{Finding, Severity};
use crate::lot::{ConsumptionLink, Lot};
use crate::matching::{ConsumerOutcome, CustomerMatch};
use crate::transaction::Transaction;
use std::collections::HashMap;
use std::fmt;

/// One consumer's draw against a given lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotDraw {
    pub consumer_transaction_id: u64,
    pub amount: Money,
}

/// One lot's contribution to a given consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingSource {
    pub lot_transaction_id: u64,
    pub amount: Money,
}

/// How a consumer was funded, including what was left uncovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerFunding {
    pub consumer_transaction_id: u64,
    pub sources: Vec<FundingSource>,
    pub unmet: Money,
}

/// Counts over a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchStats {
    pub customers: usize,
    pub rejected_customers: usize,
    pub lots: usize,
    pub lots_untouched: usize,
    pub lots_partial: usize,
    pub lots_exhausted: usize,
    pub links: usize,
    pub consumers: usize,
    pub underfunded_consumers: usize,
    pub unmet_total: Money,
}

impl MatchStats {
    /// Share of lots drawn at least partly, as a percentage.
    pub fn match_rate(&self) -> Option<f64> {
        if self.lots == 0 {
            return None;
        }
        Some((self.lots - self.lots_untouched) as f64 * 100.0 / self.lots as f64)
    }
}

impl fmt::Display for MatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} customers ({} rejected), {} lots ({} untouched, {} partial, {} exhausted), {} links, {} consumers ({} under-funded, {} unmet)",
            self.customers,
            self.rejected_customers,
            self.lots,
            self.lots_untouched,
            self.lots_partial,
            self.lots_exhausted,
            self.links,
            self.consumers,
            self.underfunded_consumers,
            self.unmet_total
        )
    }
}

/// Output of [`LedgerEngine::run`](crate::LedgerEngine::run).
///
/// Customers appear in ascending id order and links keep their per-customer
/// creation order, so two runs over the same input compare equal.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchReport {
    customers: Vec<CustomerMatch>,
    transactions: Vec<Transaction>,
    balances: BalanceHistory,
    findings: Vec<Finding>,
    rejected: Vec<u64>,
    by_transaction: HashMap<u64, usize>,
}

impl MatchReport {
    /// Assembles a report. `customers` must be sorted by customer id and
    /// `transactions` must hold only the accepted partitions.
    pub fn new(
        customers: Vec<CustomerMatch>,
        transactions: Vec<Transaction>,
        findings: Vec<Finding>,
        rejected: Vec<u64>,
    ) -> Self {
        let mut by_transaction = HashMap::new();
        for (idx, customer) in customers.iter().enumerate() {
            for lot in &customer.lots {
                by_transaction.insert(lot.source_transaction_id, idx);
            }
            for consumer in &customer.consumers {
                by_transaction.insert(consumer.transaction_id, idx);
            }
        }

        let balances = BalanceHistory::build(&transactions);

        MatchReport {
            customers,
            transactions,
            balances,
            findings,
            rejected,
            by_transaction,
        }
    }

    /// Attaches a warning to each customer whose current balance is
    /// negative, or whose lots minus unmet demand differ from the running
    /// balance by more than `tolerance`.
    pub fn flag_balances(&mut self, tolerance: Money) {
        for customer in &mut self.customers {
            let Some(current) = self.balances.current(customer.customer_id) else {
                continue;
            };
            if current.is_negative() {
                customer
                    .findings
                    .push(Finding::negative_balance(customer.customer_id, current.balance));
            }
            let expected = customer.remaining_total() - customer.unmet_total();
            if (expected - current.balance).abs() > tolerance {
                customer.findings.push(Finding::balance_mismatch(
                    customer.customer_id,
                    expected,
                    current.balance,
                ));
            }
        }
    }

    pub fn customers(&self) -> &[CustomerMatch] {
        &self.customers
    }

    pub fn customer(&self, customer_id: u64) -> Option<&CustomerMatch> {
        self.customers
            .binary_search_by_key(&customer_id, |c| c.customer_id)
            .ok()
            .map(|idx| &self.customers[idx])
    }

    /// Accepted transactions, ordered by customer then `(timestamp, id)`.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn balances(&self) -> &BalanceHistory {
        &self.balances
    }

    /// Customers whose partition was rejected, ascending.
    pub fn rejected_customers(&self) -> &[u64] {
        &self.rejected
    }

    pub fn links(&self) -> impl Iterator<Item = &ConsumptionLink> {
        self.customers.iter().flat_map(|c| c.links.iter())
    }

    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.customers.iter().flat_map(|c| c.lots.iter())
    }

    pub fn consumers(&self) -> impl Iterator<Item = &ConsumerOutcome> {
        self.customers.iter().flat_map(|c| c.consumers.iter())
    }

    /// Run-level findings first, then each customer's in sweep order.
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .chain(self.customers.iter().flat_map(|c| c.findings.iter()))
    }

    pub fn findings_at(&self, severity: Severity) -> impl Iterator<Item = &Finding> {
        self.findings().filter(move |f| f.severity == severity)
    }

    /// Every `(consumer, amount)` that drew on the lot opened by `earn_id`.
    pub fn draws_on_lot(&self, earn_id: u64) -> Vec<LotDraw> {
        self.owning_customer(earn_id)
            .map(|c| {
                c.links
                    .iter()
                    .filter(|link| link.lot_transaction_id == earn_id)
                    .map(|link| LotDraw {
                        consumer_transaction_id: link.consumer_transaction_id,
                        amount: link.amount_applied,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Lots that funded `consumer_id` and its unmet residual. `None` if the
    /// id is not a matched spent/expired transaction.
    pub fn funding_of(&self, consumer_id: u64) -> Option<ConsumerFunding> {
        let customer = self.owning_customer(consumer_id)?;
        let outcome = customer
            .consumers
            .iter()
            .find(|c| c.transaction_id == consumer_id)?;

        let sources = customer
            .links
            .iter()
            .filter(|link| link.consumer_transaction_id == consumer_id)
            .map(|link| FundingSource {
                lot_transaction_id: link.lot_transaction_id,
                amount: link.amount_applied,
            })
            .collect();

        Some(ConsumerFunding {
            consumer_transaction_id: consumer_id,
            sources,
            unmet: outcome.unmet(),
        })
    }

    pub fn stats(&self) -> MatchStats {
        let mut stats = MatchStats {
            customers: self.customers.len() + self.rejected.len(),
            rejected_customers: self.rejected.len(),
            ..MatchStats::default()
        };

        for lot in self.lots() {
            stats.lots += 1;
            if lot.remaining_amount == lot.original_amount {
                stats.lots_untouched += 1;
            } else if lot.is_exhausted() {
                stats.lots_exhausted += 1;
            } else {
                stats.lots_partial += 1;
            }
        }

        for consumer in self.consumers() {
            stats.consumers += 1;
            if consumer.is_underfunded() {
                stats.underfunded_consumers += 1;
                stats.unmet_total += consumer.unmet();
            }
        }

        stats.links = self.links().count();
        stats
    }

    fn owning_customer(&self, transaction_id: u64) -> Option<&CustomerMatch> {
        self.by_transaction
            .get(&transaction_id)
            .map(|&idx| &self.customers[idx])
    }
}
