// Bulk ledger import from CSV
//
// Columns: account_ref, phone_number, points
// Re-importing the same file is harmless: rows that collide with an existing
// ledger (same account or phone) are counted as duplicates and skipped.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::entities::LoyaltyLedger;
use crate::error::LedgerError;
use crate::store::LedgerStore;

#[derive(Debug, Deserialize)]
struct LedgerRow {
    account_ref: String,
    phone_number: String,
    points: Option<u64>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Read ledgers from a CSV file, opened as of `now`
pub fn load_ledgers_csv(csv_path: &Path, now: DateTime<Utc>) -> Result<Vec<LoyaltyLedger>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let mut ledgers = Vec::new();

    for (line, result) in rdr.deserialize::<LedgerRow>().enumerate() {
        // +2: header row and 1-based lines
        let row: LedgerRow =
            result.with_context(|| format!("Failed to parse ledger row at line {}", line + 2))?;

        let mut ledger = LoyaltyLedger::new(row.account_ref, row.phone_number, now)
            .with_context(|| format!("Invalid ledger row at line {}", line + 2))?;
        let points = row.points.unwrap_or(0);
        if points > 0 {
            ledger.earn(points)?;
        }

        ledgers.push(ledger);
    }

    Ok(ledgers)
}

/// Insert ledgers, skipping ones that already exist
pub fn import_ledgers<S>(store: &S, ledgers: &[LoyaltyLedger]) -> Result<ImportSummary, LedgerError>
where
    S: LedgerStore + ?Sized,
{
    let mut summary = ImportSummary::default();

    for ledger in ledgers {
        match store.insert(ledger) {
            Ok(()) => summary.inserted += 1,
            Err(LedgerError::Duplicate { field }) => {
                warn!(phone = %ledger.phone_fingerprint(), field = %field, "skipping duplicate ledger");
                summary.duplicates += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        "ledger import finished"
    );

    Ok(summary)
}
