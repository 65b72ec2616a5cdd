//! Single-customer FIFO sweep.
//!
//! Earned transactions become lots in `(timestamp, id)` order; spent and
//! expired transactions are replayed in the same order and draw from the
//! oldest lot that still has credit and was earned strictly before them.
//! Lots live in a per-customer arena and a single cursor walks it forward,
//! so exhausted lots are never rescanned.

use crate::config::UnderfundedPolicy;
use crate::decimal::Money;
use crate::error::{EngineError, Result};
use crate::finding::Finding;
use crate::lot::{ConsumptionLink, Lot};
use crate::transaction::{Transaction, TxKind};
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashSet;

/// How much of one spent/expired transaction was covered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOutcome {
    pub transaction_id: u64,
    pub customer_id: u64,
    pub kind: TxKind,
    pub timestamp: DateTime<Utc>,
    pub demand: Money,
    pub funded: Money,
}

impl ConsumerOutcome {
    /// Demand left without a funding lot.
    pub fn unmet(&self) -> Money {
        self.demand - self.funded
    }

    pub fn is_underfunded(&self) -> bool {
        self.unmet().is_positive()
    }
}

/// Everything one customer's sweep produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerMatch {
    pub customer_id: u64,

    /// Final lot states, in FIFO order.
    pub lots: Vec<Lot>,

    /// Links in creation order.
    pub links: Vec<ConsumptionLink>,

    /// One entry per consumer, in sweep order.
    pub consumers: Vec<ConsumerOutcome>,

    pub findings: Vec<Finding>,
}

impl CustomerMatch {
    pub fn unmet_total(&self) -> Money {
        self.consumers.iter().map(ConsumerOutcome::unmet).sum()
    }

    pub fn remaining_total(&self) -> Money {
        self.lots.iter().map(|lot| lot.remaining_amount).sum()
    }
}

/// Checks a partition before it is swept. Any failure rejects the whole
/// partition.
fn check_partition(customer_id: u64, transactions: &[Transaction]) -> Result<()> {
    let mut seen = HashSet::with_capacity(transactions.len());

    for tx in transactions {
        if tx.customer_id != customer_id {
            return Err(EngineError::CustomerMismatch {
                tx_id: tx.id,
                expected: customer_id,
                actual: tx.customer_id,
            });
        }
        if !seen.insert(tx.id) {
            return Err(EngineError::DuplicateTxId {
                tx_id: tx.id,
                customer_id,
            });
        }
        if !tx.amount.is_within_limit() {
            return Err(EngineError::AmountOutOfRange {
                tx_id: tx.id,
                amount: tx.amount,
            });
        }
        if tx.kind == TxKind::Earned && tx.amount.is_negative() {
            return Err(EngineError::NegativeEarn {
                tx_id: tx.id,
                amount: tx.amount,
            });
        }
    }

    Ok(())
}

/// Runs the FIFO sweep for one customer.
///
/// `transactions` may arrive in any order. The input is not modified.
pub fn match_customer(
    customer_id: u64,
    transactions: &[Transaction],
    policy: UnderfundedPolicy,
) -> Result<CustomerMatch> {
    check_partition(customer_id, transactions)?;

    let mut earned: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| tx.kind == TxKind::Earned)
        .collect();
    earned.sort_by_key(|tx| tx.sort_key());

    let mut consumers: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| tx.kind.is_consumer())
        .collect();
    consumers.sort_by_key(|tx| tx.sort_key());

    let mut lots: Vec<Lot> = earned.into_iter().map(Lot::open).collect();
    let mut links = Vec::new();
    let mut outcomes = Vec::with_capacity(consumers.len());
    let mut findings = Vec::new();

    // Every lot before `cursor` is exhausted.
    let mut cursor = 0usize;

    for consumer in consumers {
        let demand = consumer.demand();
        let mut outstanding = demand;

        while outstanding.is_positive() {
            let Some(lot) = lots.get_mut(cursor) else {
                break;
            };
            if lot.is_exhausted() {
                cursor += 1;
                continue;
            }
            if !lot.is_eligible_for(consumer.timestamp) {
                break;
            }

            let applied = lot.draw(outstanding);
            if applied.is_positive() {
                outstanding -= applied;
                debug!(
                    "Customer {}: {} {} drew {} from lot {}",
                    customer_id, consumer.kind, consumer.id, applied, lot.source_transaction_id
                );
                links.push(ConsumptionLink {
                    lot_transaction_id: lot.source_transaction_id,
                    consumer_transaction_id: consumer.id,
                    customer_id,
                    amount_applied: applied,
                    sequence: links.len() as u64,
                });
            }

            if lot.is_exhausted() {
                findings.push(Finding::lot_exhausted(
                    customer_id,
                    lot.source_transaction_id,
                    lot.original_amount,
                ));
                cursor += 1;
            }
        }

        let outcome = ConsumerOutcome {
            transaction_id: consumer.id,
            customer_id,
            kind: consumer.kind,
            timestamp: consumer.timestamp,
            demand,
            funded: demand - outstanding,
        };

        if outcome.is_underfunded() {
            if policy == UnderfundedPolicy::Reject {
                return Err(EngineError::Underfunded {
                    tx_id: consumer.id,
                    unmet: outcome.unmet(),
                });
            }
            findings.push(Finding::underfunded(
                customer_id,
                consumer.id,
                demand,
                outcome.unmet(),
            ));
        } else {
            findings.push(Finding::fully_funded(customer_id, consumer.id, demand));
        }

        outcomes.push(outcome);
    }

    Ok(CustomerMatch {
        customer_id,
        lots,
        links,
        consumers: outcomes,
        findings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{FindingKind, Severity};
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, d, 10, 0, 0).unwrap()
    }

    fn tx(id: u64, kind: TxKind, d: u32, amount: &str) -> Transaction {
        Transaction::new(id, 100, kind, day(d), dec(amount))
    }

    fn run(txs: &[Transaction]) -> CustomerMatch {
        match_customer(100, txs, UnderfundedPolicy::Flag).unwrap()
    }

    fn link_tuples(m: &CustomerMatch) -> Vec<(u64, u64, String)> {
        m.links
            .iter()
            .map(|l| {
                (
                    l.lot_transaction_id,
                    l.consumer_transaction_id,
                    l.amount_applied.to_string(),
                )
            })
            .collect()
    }

    fn lot(m: &CustomerMatch, id: u64) -> &Lot {
        m.lots
            .iter()
            .find(|l| l.source_transaction_id == id)
            .unwrap()
    }

    #[test]
    fn test_spend_spans_two_lots() {
        let m = run(&[
            tx(1, TxKind::Earned, 1, "20.00"),
            tx(2, TxKind::Earned, 15, "30.00"),
            tx(3, TxKind::Spent, 31, "-25.00"),
        ]);

        assert_eq!(
            link_tuples(&m),
            vec![(1, 3, "20.00".into()), (2, 3, "5.00".into())]
        );
        assert_eq!(lot(&m, 1).remaining_amount, Money::ZERO);
        assert_eq!(lot(&m, 2).remaining_amount.to_string(), "25.00");
        assert!(!m.consumers[0].is_underfunded());
    }

    #[test]
    fn test_underfunded_spend_is_flagged_not_failed() {
        let m = run(&[
            tx(1, TxKind::Earned, 1, "20.00"),
            tx(2, TxKind::Spent, 2, "-25.00"),
        ]);

        assert_eq!(link_tuples(&m), vec![(1, 2, "20.00".into())]);
        assert_eq!(m.consumers[0].unmet().to_string(), "5.00");
        assert!(m.findings.iter().any(|f| f.severity == Severity::Warning
            && f.transaction_id == Some(2)
            && matches!(f.kind, FindingKind::Underfunded { unmet, .. } if unmet == dec("5.00"))));
    }

    #[test]
    fn test_same_timestamp_earns_ordered_by_id() {
        let m = run(&[
            tx(5, TxKind::Earned, 1, "10.00"),
            tx(3, TxKind::Earned, 1, "10.00"),
            tx(9, TxKind::Spent, 2, "-10.00"),
        ]);

        assert_eq!(link_tuples(&m), vec![(3, 9, "10.00".into())]);
        assert_eq!(m.lots[0].source_transaction_id, 3);
        assert_eq!(lot(&m, 5).remaining_amount.to_string(), "10.00");
    }

    #[test]
    fn test_one_lot_funds_two_spends() {
        let m = run(&[
            tx(1, TxKind::Earned, 1, "50.00"),
            tx(2, TxKind::Spent, 2, "-20.00"),
            tx(3, TxKind::Spent, 3, "-20.00"),
        ]);

        assert_eq!(
            link_tuples(&m),
            vec![(1, 2, "20.00".into()), (1, 3, "20.00".into())]
        );
        assert_eq!(lot(&m, 1).remaining_amount.to_string(), "10.00");
        assert_eq!(m.links[0].sequence, 0);
        assert_eq!(m.links[1].sequence, 1);
    }

    #[test]
    fn test_no_earns_leaves_whole_demand_unmet() {
        let m = run(&[tx(1, TxKind::Spent, 1, "-15.00")]);

        assert!(m.links.is_empty());
        assert_eq!(m.consumers[0].unmet().to_string(), "15.00");
        assert_eq!(m.unmet_total().to_string(), "15.00");
        assert!(m
            .findings
            .iter()
            .any(|f| matches!(f.kind, FindingKind::Underfunded { .. })));
    }

    #[test]
    fn test_lot_earned_at_same_instant_is_not_eligible() {
        let m = run(&[
            tx(1, TxKind::Earned, 5, "10.00"),
            tx(2, TxKind::Spent, 5, "-10.00"),
        ]);

        assert!(m.links.is_empty());
        assert!(m.consumers[0].is_underfunded());
        assert_eq!(lot(&m, 1).remaining_amount.to_string(), "10.00");
    }

    #[test]
    fn test_later_earn_does_not_fund_earlier_spend() {
        let m = run(&[
            tx(1, TxKind::Spent, 1, "-5.00"),
            tx(2, TxKind::Earned, 2, "10.00"),
            tx(3, TxKind::Spent, 3, "-4.00"),
        ]);

        assert_eq!(link_tuples(&m), vec![(2, 3, "4.00".into())]);
        assert_eq!(m.consumers[0].unmet().to_string(), "5.00");
        assert!(!m.consumers[1].is_underfunded());
    }

    #[test]
    fn test_expired_consumes_like_spent_and_ignores_sign() {
        let m = run(&[
            tx(1, TxKind::Earned, 1, "10.00"),
            tx(2, TxKind::Expired, 2, "6.00"),
            tx(3, TxKind::Spent, 3, "-4.00"),
        ]);

        assert_eq!(
            link_tuples(&m),
            vec![(1, 2, "6.00".into()), (1, 3, "4.00".into())]
        );
        assert!(lot(&m, 1).is_exhausted());
        assert!(m
            .findings
            .iter()
            .any(|f| matches!(f.kind, FindingKind::LotExhausted { .. })
                && f.transaction_id == Some(1)));
    }

    #[test]
    fn test_zero_amount_lot_is_skipped() {
        let m = run(&[
            tx(1, TxKind::Earned, 1, "0.00"),
            tx(2, TxKind::Earned, 2, "8.00"),
            tx(3, TxKind::Spent, 3, "-3.00"),
        ]);

        assert_eq!(link_tuples(&m), vec![(2, 3, "3.00".into())]);
        assert_eq!(m.lots.len(), 2);
    }

    #[test]
    fn test_zero_demand_produces_no_links() {
        let m = run(&[
            tx(1, TxKind::Earned, 1, "10.00"),
            tx(2, TxKind::Spent, 2, "0.00"),
        ]);

        assert!(m.links.is_empty());
        assert!(!m.consumers[0].is_underfunded());
    }

    #[test]
    fn test_conservation_on_both_sides() {
        let m = run(&[
            tx(1, TxKind::Earned, 1, "7.25"),
            tx(2, TxKind::Earned, 2, "3.10"),
            tx(3, TxKind::Spent, 3, "-5.00"),
            tx(4, TxKind::Expired, 4, "-4.00"),
            tx(5, TxKind::Spent, 5, "-9.99"),
        ]);

        for l in &m.lots {
            let drawn: Money = m
                .links
                .iter()
                .filter(|k| k.lot_transaction_id == l.source_transaction_id)
                .map(|k| k.amount_applied)
                .sum();
            assert!(drawn <= l.original_amount);
            assert_eq!(drawn, l.consumed());
        }
        for c in &m.consumers {
            let funded: Money = m
                .links
                .iter()
                .filter(|k| k.consumer_transaction_id == c.transaction_id)
                .map(|k| k.amount_applied)
                .sum();
            assert_eq!(funded, c.funded);
            assert!(funded <= c.demand);
        }
        assert_eq!(m.remaining_total(), Money::ZERO);
        assert_eq!(m.unmet_total().to_string(), "8.64");
    }

    #[test]
    fn test_duplicate_id_rejects_partition() {
        let err = match_customer(
            100,
            &[
                tx(1, TxKind::Earned, 1, "10.00"),
                tx(1, TxKind::Spent, 2, "-1.00"),
            ],
            UnderfundedPolicy::Flag,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateTxId { tx_id: 1, .. }));
    }

    #[test]
    fn test_foreign_customer_rejects_partition() {
        let mut stray = tx(2, TxKind::Spent, 2, "-1.00");
        stray.customer_id = 200;
        let err = match_customer(
            100,
            &[tx(1, TxKind::Earned, 1, "10.00"), stray],
            UnderfundedPolicy::Flag,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::CustomerMismatch {
                expected: 100,
                actual: 200,
                ..
            }
        ));
    }

    #[test]
    fn test_negative_earn_rejects_partition() {
        let err = match_customer(
            100,
            &[tx(1, TxKind::Earned, 1, "-10.00")],
            UnderfundedPolicy::Flag,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::NegativeEarn { tx_id: 1, .. }));
    }

    #[test]
    fn test_oversized_amount_rejects_partition() {
        let err = match_customer(
            100,
            &[
                tx(1, TxKind::Earned, 1, "2000000000000000"),
                tx(2, TxKind::Spent, 2, "-1.00"),
            ],
            UnderfundedPolicy::Flag,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::AmountOutOfRange { tx_id: 1, .. }));
    }

    #[test]
    fn test_reject_policy_turns_underfunding_into_error() {
        let err = match_customer(
            100,
            &[
                tx(1, TxKind::Earned, 1, "20.00"),
                tx(2, TxKind::Spent, 2, "-25.00"),
            ],
            UnderfundedPolicy::Reject,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Underfunded { tx_id: 2, unmet } if unmet == dec("5.00")));
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let ordered = vec![
            tx(1, TxKind::Earned, 1, "20.00"),
            tx(2, TxKind::Earned, 2, "30.00"),
            tx(3, TxKind::Spent, 3, "-25.00"),
            tx(4, TxKind::Expired, 4, "-10.00"),
        ];
        let mut shuffled = ordered.clone();
        shuffled.reverse();

        assert_eq!(run(&ordered), run(&shuffled));
    }
}
