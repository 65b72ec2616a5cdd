//! Data-quality checks run before and after matching.
//!
//! Each check produces a [`CheckResult`]; a [`ValidationReport`] passes when
//! no fatal check failed. Nothing here raises on its own; [`ValidationReport::gate`]
//! is where a caller opts into blocking.

use crate::balance::BalanceHistory;
use crate::decimal::Money;
use crate::error::{EngineError, Result};
use crate::finding::Severity;
use crate::report::MatchReport;
use crate::transaction::{Transaction, TxKind};
use chrono::{DateTime, Utc};
use log::{error, info};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub message: String,
    pub severity: Severity,
}

impl CheckResult {
    fn new(name: &'static str, severity: Severity, passed: bool, message: String) -> Self {
        CheckResult {
            name,
            passed,
            message,
            severity,
        }
    }
}

/// Which pipeline stage a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Source,
    PostMatch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Source => f.write_str("source"),
            Stage::PostMatch => f.write_str("post_match"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub stage: Stage,
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    /// `true` when every fatal check passed.
    pub fn passed(&self) -> bool {
        self.error_count() == 0
    }

    pub fn error_count(&self) -> usize {
        self.failed(Severity::Fatal)
    }

    pub fn warning_count(&self) -> usize {
        self.failed(Severity::Warning)
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    fn failed(&self, severity: Severity) -> usize {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.severity == severity)
            .count()
    }

    /// Returns whether the report passed. With `fail_on_error`, a failing
    /// report becomes [`EngineError::ValidationFailed`].
    pub fn gate(&self, fail_on_error: bool) -> Result<bool> {
        if self.passed() {
            info!("Validation passed at stage '{}'", self.stage);
            return Ok(true);
        }

        error!(
            "Validation failed at stage '{}' with {} errors",
            self.stage,
            self.error_count()
        );
        if fail_on_error {
            return Err(EngineError::ValidationFailed {
                stage: self.stage.to_string(),
                errors: self.error_count(),
            });
        }
        Ok(false)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Validation report: {}", self.stage)?;
        writeln!(
            f,
            "Status: {} (errors: {}, warnings: {})",
            if self.passed() { "PASSED" } else { "FAILED" },
            self.error_count(),
            self.warning_count()
        )?;
        for check in &self.checks {
            writeln!(
                f,
                "[{}] {} {}: {}",
                check.severity,
                if check.passed { "ok  " } else { "FAIL" },
                check.name,
                check.message
            )?;
        }
        Ok(())
    }
}

/// Checks raw transactions before matching. `as_of` is the instant after
/// which timestamps count as future-dated.
pub fn validate_source(transactions: &[Transaction], as_of: DateTime<Utc>) -> ValidationReport {
    let mut checks = Vec::new();

    let mut seen = HashSet::with_capacity(transactions.len());
    let duplicates: BTreeSet<u64> = transactions
        .iter()
        .filter(|tx| !seen.insert(tx.id))
        .map(|tx| tx.id)
        .collect();
    checks.push(CheckResult::new(
        "unique_transaction_ids",
        Severity::Fatal,
        duplicates.is_empty(),
        if duplicates.is_empty() {
            "all transaction ids are unique".to_string()
        } else {
            format!("duplicate ids: {:?}", duplicates)
        },
    ));

    let negative_earns = transactions
        .iter()
        .filter(|tx| tx.kind == TxKind::Earned && tx.amount.is_negative())
        .count();
    checks.push(CheckResult::new(
        "earned_amounts_non_negative",
        Severity::Fatal,
        negative_earns == 0,
        format!("{} earned transactions with negative amounts", negative_earns),
    ));

    let positive_consumers = transactions
        .iter()
        .filter(|tx| tx.kind.is_consumer() && tx.amount.is_positive())
        .count();
    checks.push(CheckResult::new(
        "consumer_amounts_negative",
        Severity::Warning,
        positive_consumers == 0,
        format!(
            "{} spent/expired transactions carry a positive amount; magnitudes are used",
            positive_consumers
        ),
    ));

    let bad_expiry = transactions
        .iter()
        .filter(|tx| match (tx.kind, tx.expires_at) {
            (TxKind::Earned, Some(expires)) => expires <= tx.timestamp,
            (TxKind::Earned, None) => false,
            (_, expiry) => expiry.is_some(),
        })
        .count();
    checks.push(CheckResult::new(
        "expiry_consistency",
        Severity::Warning,
        bad_expiry == 0,
        format!(
            "{} transactions with expiry on a non-earned row or not after creation",
            bad_expiry
        ),
    ));

    let future = transactions
        .iter()
        .filter(|tx| tx.timestamp > as_of)
        .count();
    checks.push(CheckResult::new(
        "no_future_timestamps",
        Severity::Warning,
        future == 0,
        format!("{} transactions dated after {}", future, as_of),
    ));

    let zero_customers = transactions
        .iter()
        .filter(|tx| tx.customer_id == 0)
        .count();
    checks.push(CheckResult::new(
        "customer_ids_positive",
        Severity::Fatal,
        zero_customers == 0,
        format!("{} transactions with customer id 0", zero_customers),
    ));

    let customers: BTreeSet<u64> = transactions.iter().map(|tx| tx.customer_id).collect();
    let range = transactions
        .iter()
        .map(|tx| tx.timestamp)
        .min()
        .zip(transactions.iter().map(|tx| tx.timestamp).max());
    checks.push(CheckResult::new(
        "completeness_summary",
        Severity::Info,
        true,
        match range {
            Some((first, last)) => format!(
                "{} transactions for {} customers from {} to {}",
                transactions.len(),
                customers.len(),
                first,
                last
            ),
            None => "no transactions".to_string(),
        },
    ));

    ValidationReport {
        stage: Stage::Source,
        checks,
    }
}

/// Checks a finished run: referential integrity, chronology, conservation
/// and agreement between lot balances and running balances.
pub fn validate_matches(report: &MatchReport, tolerance: Money) -> ValidationReport {
    let mut checks = Vec::new();
    let by_id: HashMap<u64, &Transaction> =
        report.transactions().iter().map(|tx| (tx.id, tx)).collect();

    let mut dangling = 0usize;
    let mut out_of_order = 0usize;
    let mut drawn_per_lot: HashMap<u64, Money> = HashMap::new();
    let mut funded_per_consumer: HashMap<u64, Money> = HashMap::new();

    for link in report.links() {
        let lot = by_id.get(&link.lot_transaction_id);
        let consumer = by_id.get(&link.consumer_transaction_id);
        match (lot, consumer) {
            (Some(lot), Some(consumer))
                if lot.kind == TxKind::Earned && consumer.kind.is_consumer() =>
            {
                if lot.timestamp >= consumer.timestamp {
                    out_of_order += 1;
                }
            }
            _ => dangling += 1,
        }
        *drawn_per_lot
            .entry(link.lot_transaction_id)
            .or_insert(Money::ZERO) += link.amount_applied;
        *funded_per_consumer
            .entry(link.consumer_transaction_id)
            .or_insert(Money::ZERO) += link.amount_applied;
    }

    checks.push(CheckResult::new(
        "links_reference_valid_transactions",
        Severity::Fatal,
        dangling == 0,
        format!("{} links point at unknown or mis-typed transactions", dangling),
    ));
    checks.push(CheckResult::new(
        "chronological_precedence",
        Severity::Fatal,
        out_of_order == 0,
        format!("{} links draw on a lot not earned strictly earlier", out_of_order),
    ));

    let overdrawn_lots = report
        .lots()
        .filter(|lot| {
            let drawn = drawn_per_lot
                .get(&lot.source_transaction_id)
                .copied()
                .unwrap_or(Money::ZERO);
            drawn > lot.original_amount || drawn != lot.consumed()
        })
        .count();
    let overfunded = report
        .consumers()
        .filter(|c| {
            let funded = funded_per_consumer
                .get(&c.transaction_id)
                .copied()
                .unwrap_or(Money::ZERO);
            funded > c.demand || funded != c.funded
        })
        .count();
    checks.push(CheckResult::new(
        "conservation",
        Severity::Fatal,
        overdrawn_lots == 0 && overfunded == 0,
        format!(
            "{} lots and {} consumers disagree with their links",
            overdrawn_lots, overfunded
        ),
    ));

    let balances: &BalanceHistory = report.balances();
    let mut mismatched = 0usize;
    let mut negative = 0usize;
    for customer in report.customers() {
        let Some(current) = balances.current(customer.customer_id) else {
            continue;
        };
        let expected = customer.remaining_total() - customer.unmet_total();
        if (expected - current.balance).abs() > tolerance {
            mismatched += 1;
        }
        if current.is_negative() {
            negative += 1;
        }
    }
    checks.push(CheckResult::new(
        "balance_reconciliation",
        Severity::Warning,
        mismatched == 0,
        format!(
            "{} customers whose lot balance differs from running balance by more than {}",
            mismatched, tolerance
        ),
    ));
    checks.push(CheckResult::new(
        "non_negative_balances",
        Severity::Warning,
        negative == 0,
        format!("{} customers with a negative current balance", negative),
    ));

    let stats = report.stats();
    checks.push(CheckResult::new(
        "matching_statistics",
        Severity::Info,
        true,
        match stats.match_rate() {
            Some(rate) => format!("{} ({:.1}% of lots drawn)", stats, rate),
            None => stats.to_string(),
        },
    ));

    ValidationReport {
        stage: Stage::PostMatch,
        checks,
    }
}
