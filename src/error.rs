//! Error types for the FIFO ledger.

use crate::decimal::Money;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur during engine operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Failed to open or read the input file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid transaction record
    #[error("Invalid transaction at row {row}: {source}")]
    InvalidRecord {
        row: usize,
        #[source]
        source: RecordError,
    },

    /// Transaction id seen more than once
    #[error("Duplicate transaction ID {tx_id} for customer {customer_id}")]
    DuplicateTxId { tx_id: u64, customer_id: u64 },

    /// Transaction routed to the wrong customer partition
    #[error("Transaction {tx_id} belongs to customer {actual}, not partition {expected}")]
    CustomerMismatch {
        tx_id: u64,
        expected: u64,
        actual: u64,
    },

    /// Amount too large to aggregate safely
    #[error("Transaction {tx_id} amount {amount} exceeds the accepted magnitude")]
    AmountOutOfRange { tx_id: u64, amount: Money },

    /// Earned transaction with a negative amount
    #[error("Earned transaction {tx_id} has negative amount {amount}")]
    NegativeEarn { tx_id: u64, amount: Money },

    /// Consumer demand exceeds prior supply under the strict funding policy
    #[error("Transaction {tx_id} is under-funded by {unmet}")]
    Underfunded { tx_id: u64, unmet: Money },

    /// Partition rejected while loading; matching is skipped for it
    #[error("Customer {customer_id} rejected: {reason}")]
    Rejected { customer_id: u64, reason: String },

    /// Invocation exceeds the configured transaction cap
    #[error("Input holds {count} transactions, above the limit of {limit}")]
    TooManyTransactions { count: usize, limit: usize },

    /// Dedicated worker pool could not be created
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Validation gate blocked the run
    #[error("Validation failed at stage '{stage}' with {errors} errors")]
    ValidationFailed { stage: String, errors: usize },

    /// Bad command-line usage
    #[error("{0}. Usage: fifo-ledger <input.csv> [--report <kind>] [--max-transactions N] [--threads N] [--strict-funding] [--fail-on-error]")]
    Usage(String),
}

/// Reasons a raw CSV row cannot become a [`Transaction`](crate::Transaction).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Required column is absent or blank
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// Column present but not parseable
    #[error("invalid value '{value}' for field '{field}'")]
    InvalidField { field: &'static str, value: String },

    /// Amount has sub-cent digits or exceeds the accepted magnitude
    #[error("amount '{0}' is not a whole number of cents within the accepted range")]
    InexactAmount(String),

    /// Kind is not one of earned, spent, expired
    #[error("unknown transaction kind '{0}'")]
    UnknownKind(String),
}
