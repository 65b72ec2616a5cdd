//! Property tests for the FIFO invariants: conservation, chronological
//! precedence, FIFO order, determinism and customer independence.

use chrono::{DateTime, Duration, TimeZone, Utc};
use fifo_ledger::{
    match_customer, validate_matches, LedgerEngine, MatchReport, Money, Transaction, TxKind,
    UnderfundedPolicy,
};
use proptest::prelude::*;
use std::collections::HashMap;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
}

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    }
}

/// Raw draws: (customer, kind selector, hour offset, cents). Hours are kept
/// small so that timestamp ties are common.
fn arb_ledger(max_len: usize) -> impl Strategy<Value = Vec<Transaction>> {
    prop::collection::vec((1u64..4, 0u8..3, 0i64..12, 0i64..5_000), 0..max_len).prop_map(
        |rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (customer, kind, hour, cents))| {
                    let kind = match kind {
                        0 => TxKind::Earned,
                        1 => TxKind::Spent,
                        _ => TxKind::Expired,
                    };
                    let amount = match kind {
                        TxKind::Earned => Money::from_cents(cents),
                        _ => Money::from_cents(-cents),
                    };
                    // Reverse the id order against the row order so ties
                    // cannot be resolved by insertion order by accident.
                    let id = 10_000 - i as u64;
                    Transaction::new(id, customer, kind, base() + Duration::hours(hour), amount)
                })
                .collect()
        },
    )
}

fn run(transactions: &[Transaction]) -> MatchReport {
    let mut engine = LedgerEngine::new();
    for tx in transactions {
        engine.push(tx.clone());
    }
    engine.run().unwrap()
}

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn conservation(txs in arb_ledger(40)) {
        let report = run(&txs);

        let mut drawn: HashMap<u64, Money> = HashMap::new();
        let mut funded: HashMap<u64, Money> = HashMap::new();
        for link in report.links() {
            prop_assert!(link.amount_applied.is_positive());
            *drawn.entry(link.lot_transaction_id).or_insert(Money::ZERO) += link.amount_applied;
            *funded.entry(link.consumer_transaction_id).or_insert(Money::ZERO) += link.amount_applied;
        }

        for lot in report.lots() {
            let d = drawn.get(&lot.source_transaction_id).copied().unwrap_or(Money::ZERO);
            prop_assert!(d <= lot.original_amount);
            prop_assert_eq!(lot.original_amount - d, lot.remaining_amount);
            prop_assert!(!lot.remaining_amount.is_negative());
        }
        for consumer in report.consumers() {
            let f = funded.get(&consumer.transaction_id).copied().unwrap_or(Money::ZERO);
            prop_assert!(f <= consumer.demand);
            prop_assert_eq!(consumer.demand - f, consumer.unmet());
        }
    }

    #[test]
    fn chronological_precedence(txs in arb_ledger(40)) {
        let report = run(&txs);
        let by_id: HashMap<u64, &Transaction> = txs.iter().map(|tx| (tx.id, tx)).collect();

        for link in report.links() {
            let lot = by_id[&link.lot_transaction_id];
            let consumer = by_id[&link.consumer_transaction_id];
            prop_assert_eq!(lot.kind, TxKind::Earned);
            prop_assert!(consumer.kind.is_consumer());
            prop_assert_eq!(lot.customer_id, consumer.customer_id);
            prop_assert!(lot.timestamp < consumer.timestamp);
        }
    }

    #[test]
    fn fifo_order(txs in arb_ledger(40)) {
        let report = run(&txs);

        for customer in report.customers() {
            let order: HashMap<u64, usize> = customer
                .lots
                .iter()
                .enumerate()
                .map(|(idx, lot)| (lot.source_transaction_id, idx))
                .collect();
            let mut drawn = vec![Money::ZERO; customer.lots.len()];
            let mut links = customer.links.iter().peekable();

            for consumer in &customer.consumers {
                while let Some(link) = links.next_if(|l| l.consumer_transaction_id == consumer.transaction_id) {
                    let idx = order[&link.lot_transaction_id];
                    // Every earlier eligible lot must already be empty.
                    for (earlier, lot) in customer.lots[..idx].iter().enumerate() {
                        if lot.earned_at < consumer.timestamp {
                            prop_assert_eq!(drawn[earlier], lot.original_amount);
                        }
                    }
                    drawn[idx] += link.amount_applied;
                }

                if consumer.is_underfunded() {
                    for (idx, lot) in customer.lots.iter().enumerate() {
                        if lot.earned_at < consumer.timestamp {
                            prop_assert_eq!(drawn[idx], lot.original_amount);
                        }
                    }
                }
            }
            prop_assert!(links.next().is_none());
        }
    }

    #[test]
    fn determinism(txs in arb_ledger(40)) {
        let first = run(&txs);
        let second = run(&txs);
        prop_assert_eq!(&first, &second);

        let mut reversed = txs.clone();
        reversed.reverse();
        prop_assert_eq!(&first, &run(&reversed));
    }

    #[test]
    fn customer_independence(txs in arb_ledger(40)) {
        let report = run(&txs);

        for customer in report.customers() {
            let own: Vec<Transaction> = txs
                .iter()
                .filter(|tx| tx.customer_id == customer.customer_id)
                .cloned()
                .collect();
            let alone = match_customer(customer.customer_id, &own, UnderfundedPolicy::Flag).unwrap();
            prop_assert_eq!(customer, &alone);
        }
    }

    #[test]
    fn balances_reconcile(txs in arb_ledger(40)) {
        let report = run(&txs);
        let validation = validate_matches(&report, Money::from_cents(1));
        prop_assert!(validation.passed(), "{}", validation);
        prop_assert!(validation.check("balance_reconciliation").unwrap().passed);
    }
}
