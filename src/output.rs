//! CSV writers for match results.
//!
//! All monetary values are formatted with exactly 2 decimal places and
//! instants as RFC 3339 UTC. Rows come out in report order, which is
//! ascending customer id and then sweep order, so output is reproducible.

use crate::audit::redemption_rows;
use crate::error::{EngineError, Result};
use crate::report::MatchReport;
use chrono::{DateTime, SecondsFormat, Utc};
use csv::WriterBuilder;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Which table to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportKind {
    /// Consumption links.
    #[default]
    Links,
    /// Final lot states.
    Lots,
    /// Transactions joined with their redeemed-by reference.
    Redemptions,
    /// Running balance after every transaction.
    Balances,
    /// Latest balance per customer.
    Current,
    Findings,
}

impl FromStr for ReportKind {
    type Err = EngineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "links" => Ok(ReportKind::Links),
            "lots" => Ok(ReportKind::Lots),
            "redemptions" => Ok(ReportKind::Redemptions),
            "balances" => Ok(ReportKind::Balances),
            "current" => Ok(ReportKind::Current),
            "findings" => Ok(ReportKind::Findings),
            other => Err(EngineError::Usage(format!("Unknown report '{}'", other))),
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportKind::Links => "links",
            ReportKind::Lots => "lots",
            ReportKind::Redemptions => "redemptions",
            ReportKind::Balances => "balances",
            ReportKind::Current => "current",
            ReportKind::Findings => "findings",
        };
        f.write_str(name)
    }
}

fn instant(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Writes the requested table.
pub fn write_report<W: Write>(report: &MatchReport, kind: ReportKind, writer: W) -> Result<()> {
    match kind {
        ReportKind::Links => write_links(report, writer),
        ReportKind::Lots => write_lots(report, writer),
        ReportKind::Redemptions => write_redemptions(report, writer),
        ReportKind::Balances => write_balances(report, writer),
        ReportKind::Current => write_current(report, writer),
        ReportKind::Findings => write_findings(report, writer),
    }
}

pub fn write_links<W: Write>(report: &MatchReport, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(["customer_id", "sequence", "lot_tx", "consumer_tx", "amount"])?;

    for link in report.links() {
        csv_writer.write_record([
            link.customer_id.to_string(),
            link.sequence.to_string(),
            link.lot_transaction_id.to_string(),
            link.consumer_transaction_id.to_string(),
            link.amount_applied.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn write_lots<W: Write>(report: &MatchReport, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record([
        "customer_id",
        "lot_tx",
        "earned_at",
        "expires_at",
        "original",
        "remaining",
    ])?;

    for lot in report.lots() {
        csv_writer.write_record([
            lot.customer_id.to_string(),
            lot.source_transaction_id.to_string(),
            instant(&lot.earned_at),
            optional(lot.expires_at.as_ref().map(instant)),
            lot.original_amount.to_string(),
            lot.remaining_amount.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn write_redemptions<W: Write>(report: &MatchReport, writer: W) -> Result<()> {
    let mut csv_writer = WriterBuilder::new().has_headers(false).from_writer(writer);

    // Written up front so an empty run still yields the header.
    csv_writer.write_record([
        "id",
        "customer_id",
        "kind",
        "timestamp",
        "expires_at",
        "order_id",
        "reason",
        "amount",
        "redeemed_by",
        "link_count",
        "remaining",
    ])?;

    for row in redemption_rows(report) {
        csv_writer.serialize(row)?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn write_balances<W: Write>(report: &MatchReport, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record([
        "customer_id",
        "timestamp",
        "tx",
        "kind",
        "amount",
        "cumulative_earned",
        "cumulative_spent",
        "cumulative_expired",
        "balance",
    ])?;

    for entry in report.balances().entries() {
        csv_writer.write_record([
            entry.totals.customer_id.to_string(),
            instant(&entry.timestamp),
            entry.transaction_id.to_string(),
            entry.kind.to_string(),
            entry.amount.to_string(),
            entry.totals.cumulative_earned.to_string(),
            entry.totals.cumulative_spent.to_string(),
            entry.totals.cumulative_expired.to_string(),
            entry.totals.balance.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn write_current<W: Write>(report: &MatchReport, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(["customer_id", "earned", "spent", "expired", "balance"])?;

    for balance in report.balances().current_all() {
        csv_writer.write_record([
            balance.customer_id.to_string(),
            balance.cumulative_earned.to_string(),
            balance.cumulative_spent.to_string(),
            balance.cumulative_expired.to_string(),
            balance.balance.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn write_findings<W: Write>(report: &MatchReport, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(["severity", "code", "customer_id", "tx", "detail"])?;

    for finding in report.findings() {
        csv_writer.write_record([
            finding.severity.to_string(),
            finding.code().to_string(),
            optional(finding.customer_id),
            optional(finding.transaction_id),
            finding.kind.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}
