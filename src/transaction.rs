//! Transaction models for CSV parsing and internal representation.

use crate::decimal::Money;
use crate::error::RecordError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raw transaction record as read from CSV.
///
/// Every column is kept as a string so that a bad field can be reported
/// against the customer it belongs to instead of failing the whole row.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionRecord {
    /// Transaction ID (globally unique)
    #[serde(default)]
    pub id: Option<String>,

    /// Customer ID, the partition key
    #[serde(default)]
    pub customer_id: Option<String>,

    /// Transaction kind: earned, spent, expired
    #[serde(default)]
    pub kind: Option<String>,

    /// Instant the transaction occurred
    #[serde(default)]
    pub timestamp: Option<String>,

    /// Signed amount
    #[serde(default)]
    pub amount: Option<String>,

    /// Expiry instant (earned only)
    #[serde(default)]
    pub expires_at: Option<String>,

    #[serde(default)]
    pub order_id: Option<String>,

    #[serde(default)]
    pub reason: Option<String>,
}

impl TransactionRecord {
    /// Returns the customer this row belongs to, if that much is readable.
    pub fn customer_hint(&self) -> Option<u64> {
        non_blank(&self.customer_id).and_then(|s| s.parse().ok())
    }

    /// Parses the raw CSV record into a typed transaction.
    pub fn parse(&self) -> Result<Transaction, RecordError> {
        let id = parse_u64(&self.id, "id")?;
        let customer_id = parse_u64(&self.customer_id, "customer_id")?;

        let kind_str = non_blank(&self.kind).ok_or(RecordError::MissingField("kind"))?;
        let kind = TxKind::from_str(kind_str)?;

        let timestamp_str =
            non_blank(&self.timestamp).ok_or(RecordError::MissingField("timestamp"))?;
        let timestamp = parse_instant(timestamp_str).ok_or_else(|| RecordError::InvalidField {
            field: "timestamp",
            value: timestamp_str.to_string(),
        })?;

        let amount_str = non_blank(&self.amount).ok_or(RecordError::MissingField("amount"))?;
        let amount = match Money::parse_exact(amount_str) {
            Some(amount) => amount,
            None if Money::from_str(amount_str).is_ok() => {
                return Err(RecordError::InexactAmount(amount_str.to_string()))
            }
            None => {
                return Err(RecordError::InvalidField {
                    field: "amount",
                    value: amount_str.to_string(),
                })
            }
        };

        let expires_at = match non_blank(&self.expires_at) {
            Some(s) => Some(parse_instant(s).ok_or_else(|| RecordError::InvalidField {
                field: "expires_at",
                value: s.to_string(),
            })?),
            None => None,
        };

        let order_id = match non_blank(&self.order_id) {
            Some(_) => Some(parse_u64(&self.order_id, "order_id")?),
            None => None,
        };

        Ok(Transaction {
            id,
            customer_id,
            kind,
            timestamp,
            amount,
            expires_at,
            order_id,
            reason: non_blank(&self.reason).map(str::to_string),
        })
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_u64(field: &Option<String>, name: &'static str) -> Result<u64, RecordError> {
    let raw = non_blank(field).ok_or(RecordError::MissingField(name))?;
    raw.parse().map_err(|_| RecordError::InvalidField {
        field: name,
        value: raw.to_string(),
    })
}

/// Parses an instant. Naive date-times and bare dates are taken as UTC.
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Ledger transaction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    /// Credit granted to the customer; becomes a lot.
    Earned,

    /// Credit redeemed against an order.
    Spent,

    /// Credit removed because it lapsed.
    Expired,
}

impl TxKind {
    /// Returns `true` for kinds that draw down lots.
    pub fn is_consumer(&self) -> bool {
        matches!(self, TxKind::Spent | TxKind::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Earned => "earned",
            TxKind::Spent => "spent",
            TxKind::Expired => "expired",
        }
    }
}

impl FromStr for TxKind {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "earned" => Ok(TxKind::Earned),
            "spent" => Ok(TxKind::Spent),
            "expired" => Ok(TxKind::Expired),
            other => Err(RecordError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed and validated ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Globally unique transaction ID
    pub id: u64,

    /// Customer ID
    pub customer_id: u64,

    pub kind: TxKind,

    pub timestamp: DateTime<Utc>,

    /// Signed amount as supplied. Use [`Transaction::demand`] for consumers.
    pub amount: Money,

    /// Expiry instant for earned credit
    pub expires_at: Option<DateTime<Utc>>,

    pub order_id: Option<u64>,

    pub reason: Option<String>,
}

impl Transaction {
    /// Creates a transaction with no expiry, order or reason.
    pub fn new(
        id: u64,
        customer_id: u64,
        kind: TxKind,
        timestamp: DateTime<Utc>,
        amount: Money,
    ) -> Self {
        Transaction {
            id,
            customer_id,
            kind,
            timestamp,
            amount,
            expires_at: None,
            order_id: None,
            reason: None,
        }
    }

    /// Total order within a customer: timestamp, then ascending id.
    pub fn sort_key(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp, self.id)
    }

    /// Amount a spent/expired transaction needs to draw, always non-negative.
    pub fn demand(&self) -> Money {
        self.amount.abs()
    }
}
