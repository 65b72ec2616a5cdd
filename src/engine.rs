//! Ledger engine: loads transactions, partitions them by customer and runs
//! the FIFO sweep for every partition.
//!
//! Partitions share no state, so they are matched in parallel on a rayon
//! pool. A malformed row rejects only the customer it belongs to.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::finding::{Finding, Severity};
use crate::matching::{match_customer, CustomerMatch};
use crate::report::MatchReport;
use crate::transaction::{Transaction, TransactionRecord};
use csv::{ReaderBuilder, Trim};
use log::{debug, info, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;

/// Transactions for one customer, plus the reason it was rejected if any.
#[derive(Debug, Default)]
struct Partition {
    transactions: Vec<Transaction>,
    rejection: Option<String>,
}

/// The FIFO ledger engine.
///
/// Collects transactions per customer and produces a [`MatchReport`] on
/// [`run`](LedgerEngine::run). Loading order does not affect the result.
pub struct LedgerEngine {
    config: EngineConfig,

    /// Partitions indexed by customer ID.
    partitions: BTreeMap<u64, Partition>,

    /// Findings that belong to no customer.
    findings: Vec<Finding>,

    count: usize,
}

impl LedgerEngine {
    /// Creates a new empty engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        LedgerEngine {
            config,
            partitions: BTreeMap::new(),
            findings: Vec::new(),
            count: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of transactions accepted so far, across all customers.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Every loaded transaction, including those in rejected partitions,
    /// by customer then `(timestamp, id)`.
    pub fn transactions(&self) -> Vec<Transaction> {
        let mut loaded: Vec<Transaction> = self
            .partitions
            .values()
            .flat_map(|p| p.transactions.iter().cloned())
            .collect();
        loaded.sort_by_key(|tx| (tx.customer_id, tx.sort_key()));
        loaded
    }

    /// Loads transactions from a CSV reader.
    ///
    /// A row that fails to parse rejects its customer's partition; a row
    /// with no readable customer is recorded as an unattributed finding.
    /// Only I/O and header errors abort the load.
    pub fn ingest_csv<R: Read>(&mut self, reader: R) -> Result<()> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        csv_reader.headers()?;

        for (row_idx, result) in csv_reader.deserialize::<TransactionRecord>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row

            let record = match result {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    warn!("Row {}: CSV parse error: {}", row_num, e);
                    self.findings
                        .push(Finding::unattributed(row_num, e.to_string()));
                    continue;
                }
            };

            match record.parse() {
                Ok(tx) => self.push(tx),
                Err(source) => {
                    let err = EngineError::InvalidRecord {
                        row: row_num,
                        source,
                    };
                    match record.customer_hint() {
                        Some(customer_id) => self.reject(customer_id, err.to_string()),
                        None => {
                            warn!("{}", err);
                            self.findings
                                .push(Finding::unattributed(row_num, err.to_string()));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Adds a typed transaction to its customer's partition.
    pub fn push(&mut self, tx: Transaction) {
        self.count += 1;
        self.partitions
            .entry(tx.customer_id)
            .or_default()
            .transactions
            .push(tx);
    }

    /// Marks a customer's partition as rejected. The first reason wins.
    pub fn reject(&mut self, customer_id: u64, reason: impl Into<String>) {
        let reason = reason.into();
        let partition = self.partitions.entry(customer_id).or_default();
        match partition.rejection {
            Some(_) => debug!("Customer {}: further rejection: {}", customer_id, reason),
            None => {
                warn!("Customer {}: rejecting partition: {}", customer_id, reason);
                partition.rejection = Some(reason);
            }
        }
    }

    /// Matches every partition and aggregates balances.
    ///
    /// Fails only when the input exceeds `max_transactions` or the worker
    /// pool cannot be built. Per-customer failures become findings.
    pub fn run(&self) -> Result<MatchReport> {
        if let Some(limit) = self.config.max_transactions {
            if self.count > limit {
                return Err(EngineError::TooManyTransactions {
                    count: self.count,
                    limit,
                });
            }
        }

        let shared_ids = self.cross_customer_duplicates();

        let partitions: Vec<(u64, &Partition)> =
            self.partitions.iter().map(|(id, p)| (*id, p)).collect();
        let policy = self.config.underfunded;

        let sweep = || -> Vec<(u64, Result<CustomerMatch>)> {
            partitions
                .par_iter()
                .map(|&(customer_id, partition)| {
                    let outcome = if let Some(reason) = &partition.rejection {
                        Err(EngineError::Rejected {
                            customer_id,
                            reason: reason.clone(),
                        })
                    } else if let Some(&tx_id) = shared_ids.get(&customer_id) {
                        Err(EngineError::DuplicateTxId { tx_id, customer_id })
                    } else {
                        match_customer(customer_id, &partition.transactions, policy)
                    };
                    (customer_id, outcome)
                })
                .collect()
        };

        let results = match self.config.threads {
            Some(threads) => ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()?
                .install(sweep),
            None => sweep(),
        };

        let mut customers = Vec::with_capacity(results.len());
        let mut rejected = Vec::new();
        let mut findings = self.findings.clone();
        let mut accepted = Vec::new();

        for (customer_id, outcome) in results {
            match outcome {
                Ok(matched) => {
                    if let Some(partition) = self.partitions.get(&customer_id) {
                        accepted.extend(partition.transactions.iter().cloned());
                    }
                    customers.push(matched);
                }
                Err(EngineError::Rejected { reason, .. }) => {
                    rejected.push(customer_id);
                    findings.push(Finding::rejected(customer_id, reason));
                }
                Err(e) => {
                    warn!("Customer {}: {}", customer_id, e);
                    rejected.push(customer_id);
                    findings.push(Finding::rejected(customer_id, e.to_string()));
                }
            }
        }

        accepted.sort_by_key(|tx| (tx.customer_id, tx.sort_key()));
        let mut report = MatchReport::new(customers, accepted, findings, rejected);
        report.flag_balances(self.config.tolerance);

        for customer in report.customers() {
            for finding in &customer.findings {
                if finding.severity == Severity::Warning {
                    warn!("{}", finding);
                }
            }
        }

        info!("FIFO matching complete: {}", report.stats());

        Ok(report)
    }

    /// Customers sharing a transaction id with another customer, mapped to
    /// the first such id.
    fn cross_customer_duplicates(&self) -> HashMap<u64, u64> {
        let mut owner: HashMap<u64, u64> = HashMap::with_capacity(self.count);
        let mut flagged: BTreeMap<u64, u64> = BTreeMap::new();

        for (&customer_id, partition) in &self.partitions {
            let ids: BTreeSet<u64> = partition.transactions.iter().map(|tx| tx.id).collect();
            for id in ids {
                match owner.get(&id) {
                    Some(&other) if other != customer_id => {
                        flagged.entry(other).or_insert(id);
                        flagged.entry(customer_id).or_insert(id);
                    }
                    Some(_) => {}
                    None => {
                        owner.insert(id, customer_id);
                    }
                }
            }
        }

        flagged.into_iter().collect()
    }
}

impl Default for LedgerEngine {
    fn default() -> Self {
        Self::new()
    }
}
