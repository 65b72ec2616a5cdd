//! Flat "redeemed-by" export joining links back onto transactions.
//!
//! Each transaction gets one row. Earned rows carry `redeemed_by` only when
//! exactly one consumer drew the lot; when several did, `redeemed_by` stays
//! empty and `link_count` tells the reader to consult the full link table.

use crate::decimal::Money;
use crate::report::MatchReport;
use crate::transaction::TxKind;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedemptionRow {
    pub transaction_id: u64,
    pub customer_id: u64,
    pub kind: TxKind,
    #[serde(serialize_with = "rfc3339")]
    pub timestamp: DateTime<Utc>,
    #[serde(serialize_with = "rfc3339_opt")]
    pub expires_at: Option<DateTime<Utc>>,
    pub order_id: Option<u64>,
    pub reason: Option<String>,
    pub amount: Money,

    /// Consumer that drew this lot, when it was the only one.
    pub redeemed_by: Option<u64>,

    /// Links touching this transaction, as lot or consumer.
    pub link_count: usize,

    /// Lot balance left (earned) or demand left unfunded (spent/expired).
    pub remaining: Money,
}

fn rfc3339<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn rfc3339_opt<S: Serializer>(
    at: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match at {
        Some(at) => rfc3339(at, serializer),
        None => serializer.serialize_none(),
    }
}

/// Builds the flat export, one row per accepted transaction in report order.
pub fn redemption_rows(report: &MatchReport) -> Vec<RedemptionRow> {
    let mut lot_links: HashMap<u64, Vec<u64>> = HashMap::new();
    let mut consumer_links: HashMap<u64, usize> = HashMap::new();
    for link in report.links() {
        lot_links
            .entry(link.lot_transaction_id)
            .or_default()
            .push(link.consumer_transaction_id);
        *consumer_links
            .entry(link.consumer_transaction_id)
            .or_default() += 1;
    }

    let remaining_lot: HashMap<u64, Money> = report
        .lots()
        .map(|lot| (lot.source_transaction_id, lot.remaining_amount))
        .collect();
    let unmet: HashMap<u64, Money> = report
        .consumers()
        .map(|c| (c.transaction_id, c.unmet()))
        .collect();

    report
        .transactions()
        .iter()
        .map(|tx| {
            let (redeemed_by, link_count, remaining) = match tx.kind {
                TxKind::Earned => {
                    let consumers = lot_links.get(&tx.id).map(Vec::as_slice).unwrap_or(&[]);
                    let redeemed_by = match consumers {
                        [only] => Some(*only),
                        _ => None,
                    };
                    let remaining = remaining_lot.get(&tx.id).copied().unwrap_or(tx.amount);
                    (redeemed_by, consumers.len(), remaining)
                }
                TxKind::Spent | TxKind::Expired => (
                    None,
                    consumer_links.get(&tx.id).copied().unwrap_or(0),
                    unmet.get(&tx.id).copied().unwrap_or_else(|| tx.demand()),
                ),
            };

            RedemptionRow {
                transaction_id: tx.id,
                customer_id: tx.customer_id,
                kind: tx.kind,
                timestamp: tx.timestamp,
                expires_at: tx.expires_at,
                order_id: tx.order_id,
                reason: tx.reason.clone(),
                amount: tx.amount,
                redeemed_by,
                link_count,
                remaining,
            }
        })
        .collect()
}
