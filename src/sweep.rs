// Expiration Sweep - forfeit balances of ledgers past their year end
//
// For every ledger with expiration_date < now:
//   points = 0, expiration_date = Dec 31 of now's year, save.
// Each record is its own unit of work: a failed save is recorded and the
// sweep moves on. Nothing is rolled back across the batch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::entities::LoyaltyLedger;
use crate::error::LedgerError;
use crate::store::LedgerStore;

/// A ledger whose reset could not be persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepFailure {
    pub id: String,
    pub reason: String,
}

/// A ledger that was reset, with what it lost
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResetLedger {
    pub id: String,
    pub forfeited_points: u64,
    pub previous_expiration: DateTime<Utc>,
    pub ledger: LoyaltyLedger,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub swept_at: DateTime<Utc>,
    /// Expired ledgers found by the scan
    pub scanned: usize,
    /// Successfully reset ledgers, in scan order
    pub reset: Vec<ResetLedger>,
    pub failed: Vec<SweepFailure>,
}

impl SweepReport {
    /// Ids of the ledgers that were reset and saved
    pub fn reset_ids(&self) -> Vec<String> {
        self.reset.iter().map(|r| r.id.clone()).collect()
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.id.clone()).collect()
    }

    pub fn forfeited_points(&self) -> u64 {
        self.reset.iter().map(|r| r.forfeited_points).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Reset every ledger in `store` that expired strictly before `now`
///
/// Only the initial scan can fail the whole call.
pub fn run_expiration_sweep<S>(store: &S, now: DateTime<Utc>) -> Result<SweepReport, LedgerError>
where
    S: LedgerStore + ?Sized,
{
    let expired = store.find_expired(now)?;
    let scanned = expired.len();

    let mut reset = Vec::new();
    let mut failed = Vec::new();

    for mut ledger in expired {
        let previous_expiration = ledger.expiration_date;
        let forfeited_points = ledger.reset_expired(now);

        match store.save(&ledger) {
            Ok(()) => {
                info!(
                    ledger_id = %ledger.id,
                    phone = %ledger.phone_fingerprint(),
                    forfeited_points,
                    new_expiration = %ledger.expiration_date,
                    "reset expired ledger"
                );
                reset.push(ResetLedger {
                    id: ledger.id.clone(),
                    forfeited_points,
                    previous_expiration,
                    ledger,
                });
            }
            Err(e) => {
                warn!(ledger_id = %ledger.id, error = %e, "failed to reset expired ledger");
                failed.push(SweepFailure {
                    id: ledger.id,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        scanned,
        reset = reset.len(),
        failed = failed.len(),
        "expiration sweep finished"
    );

    Ok(SweepReport {
        swept_at: now,
        scanned,
        reset,
        failed,
    })
}
