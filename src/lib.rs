//! # FIFO Ledger
//!
//! Matches spent and expired loyalty-credit transactions to the earned
//! transactions that funded them, oldest lot first, and derives running
//! balances per customer.
//!
//! ## Design Principles
//!
//! - **Fixed-point arithmetic**: Uses 2 decimal places via `rust_decimal`
//! - **Strict FIFO**: Lots and consumers ordered by `(timestamp, id)`; a lot is
//!   only eligible for consumers strictly after it was earned
//! - **Partition isolation**: Customers are matched independently and in
//!   parallel; a bad row rejects only its own customer
//! - **Deterministic output**: Customers ascending, links in creation order
//!
//! ## Example
//!
//! ```no_run
//! use fifo_ledger::{LedgerEngine, ReportKind};
//! use std::io::Cursor;
//!
//! let csv = "id,customer_id,kind,timestamp,amount\n\
//!            1,100,earned,2023-01-01,20.00\n\
//!            2,100,spent,2023-02-01,-5.00\n";
//! let mut engine = LedgerEngine::new();
//! engine.ingest_csv(Cursor::new(csv)).unwrap();
//! let report = engine.run().unwrap();
//! fifo_ledger::write_report(&report, ReportKind::Links, std::io::stdout()).unwrap();
//! ```

pub mod audit;
pub mod balance;
pub mod config;
pub mod decimal;
pub mod engine;
pub mod error;
pub mod finding;
pub mod lot;
pub mod matching;
pub mod output;
pub mod report;
pub mod transaction;
pub mod validation;

pub use audit::{redemption_rows, RedemptionRow};
pub use balance::{BalanceEntry, BalanceHistory, CustomerBalance};
pub use config::{EngineConfig, UnderfundedPolicy};
pub use decimal::Money;
pub use engine::LedgerEngine;
pub use error::{EngineError, RecordError, Result};
pub use finding::{Finding, FindingKind, Severity};
pub use lot::{ConsumptionLink, Lot};
pub use matching::{match_customer, ConsumerOutcome, CustomerMatch};
pub use output::{write_report, ReportKind};
pub use report::{ConsumerFunding, FundingSource, LotDraw, MatchReport, MatchStats};
pub use transaction::{Transaction, TransactionRecord, TxKind};
pub use validation::{validate_matches, validate_source, CheckResult, Stage, ValidationReport};
