//! Structured findings returned alongside match results.
//!
//! The engine never raises for warning-class conditions; it records them
//! here and leaves escalation to the caller.

use crate::decimal::Money;
use std::fmt;

/// How serious a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// The customer's partition was rejected.
    Fatal,
    /// Processing continued but the result needs review.
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Fatal => "fatal",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindingKind {
    /// Partition rejected before or during matching.
    Rejected { reason: String },
    /// CSV row that could not be tied to any customer.
    UnattributedRow { row: usize, reason: String },
    /// Consumer demand exceeded prior supply.
    Underfunded { demand: Money, unmet: Money },
    /// Aggregated balance went below zero.
    NegativeBalance { balance: Money },
    /// Lot-derived balance disagrees with the aggregator.
    BalanceMismatch { expected: Money, actual: Money },
    /// Consumer demand fully covered.
    FullyFunded { demand: Money },
    /// Lot drawn to zero.
    LotExhausted { original: Money },
}

/// A single finding, scoped to a customer and optionally a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub customer_id: Option<u64>,
    pub transaction_id: Option<u64>,
    pub kind: FindingKind,
}

impl Finding {
    pub fn rejected(customer_id: u64, reason: impl Into<String>) -> Self {
        Finding {
            severity: Severity::Fatal,
            customer_id: Some(customer_id),
            transaction_id: None,
            kind: FindingKind::Rejected {
                reason: reason.into(),
            },
        }
    }

    pub fn unattributed(row: usize, reason: impl Into<String>) -> Self {
        Finding {
            severity: Severity::Fatal,
            customer_id: None,
            transaction_id: None,
            kind: FindingKind::UnattributedRow {
                row,
                reason: reason.into(),
            },
        }
    }

    pub fn underfunded(customer_id: u64, tx_id: u64, demand: Money, unmet: Money) -> Self {
        Finding {
            severity: Severity::Warning,
            customer_id: Some(customer_id),
            transaction_id: Some(tx_id),
            kind: FindingKind::Underfunded { demand, unmet },
        }
    }

    pub fn negative_balance(customer_id: u64, balance: Money) -> Self {
        Finding {
            severity: Severity::Warning,
            customer_id: Some(customer_id),
            transaction_id: None,
            kind: FindingKind::NegativeBalance { balance },
        }
    }

    pub fn balance_mismatch(customer_id: u64, expected: Money, actual: Money) -> Self {
        Finding {
            severity: Severity::Warning,
            customer_id: Some(customer_id),
            transaction_id: None,
            kind: FindingKind::BalanceMismatch { expected, actual },
        }
    }

    pub fn fully_funded(customer_id: u64, tx_id: u64, demand: Money) -> Self {
        Finding {
            severity: Severity::Info,
            customer_id: Some(customer_id),
            transaction_id: Some(tx_id),
            kind: FindingKind::FullyFunded { demand },
        }
    }

    pub fn lot_exhausted(customer_id: u64, tx_id: u64, original: Money) -> Self {
        Finding {
            severity: Severity::Info,
            customer_id: Some(customer_id),
            transaction_id: Some(tx_id),
            kind: FindingKind::LotExhausted { original },
        }
    }

    /// Short machine-friendly code for exports.
    pub fn code(&self) -> &'static str {
        match self.kind {
            FindingKind::Rejected { .. } => "rejected",
            FindingKind::UnattributedRow { .. } => "unattributed_row",
            FindingKind::Underfunded { .. } => "underfunded",
            FindingKind::NegativeBalance { .. } => "negative_balance",
            FindingKind::BalanceMismatch { .. } => "balance_mismatch",
            FindingKind::FullyFunded { .. } => "fully_funded",
            FindingKind::LotExhausted { .. } => "lot_exhausted",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingKind::Rejected { reason } => write!(f, "partition rejected: {}", reason),
            FindingKind::UnattributedRow { row, reason } => {
                write!(f, "row {} dropped: {}", row, reason)
            }
            FindingKind::Underfunded { demand, unmet } => {
                write!(f, "demand {} left {} unfunded", demand, unmet)
            }
            FindingKind::NegativeBalance { balance } => {
                write!(f, "current balance is negative ({})", balance)
            }
            FindingKind::BalanceMismatch { expected, actual } => write!(
                f,
                "lot-derived balance {} differs from running balance {}",
                expected, actual
            ),
            FindingKind::FullyFunded { demand } => write!(f, "demand {} fully funded", demand),
            FindingKind::LotExhausted { original } => {
                write!(f, "lot of {} fully consumed", original)
            }
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.severity)?;
        if let Some(customer) = self.customer_id {
            write!(f, " customer {}", customer)?;
        }
        if let Some(tx) = self.transaction_id {
            write!(f, " tx {}", tx)?;
        }
        write!(f, ": {}", self.kind)
    }
}
