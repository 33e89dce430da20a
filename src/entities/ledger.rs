// Loyalty Ledger Entity - one record per customer
//
// Tracks the usable point balance, the historical redemption counter and a
// year-end expiration. The record is reset in place when it expires, never
// deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::calendar::year_end_of;
use crate::error::LedgerError;

// ============================================================================
// LEDGER ENTITY
// ============================================================================

/// Loyalty ledger for a single account
///
/// Identity: `id` (uuid v4, never changes)
/// Owner: `account_ref` → Account entity (referenced, not owned)
/// Values: `points`, `redeemed_points`, `expiration_date`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyLedger {
    /// Stable external identifier
    pub id: String,

    /// Account this ledger belongs to (one ledger per account)
    pub account_ref: String,

    /// Unique phone number, used for QR/phone lookup
    pub phone_number: String,

    /// Currently usable balance
    pub points: u64,

    /// Cumulative historical redemptions; never reset
    pub redeemed_points: u64,

    /// Always a year-end instant (Dec 31, 00:00:00 UTC)
    pub expiration_date: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

impl LoyaltyLedger {
    /// Create an empty ledger expiring at the end of `now`'s year
    pub fn new(
        account_ref: impl Into<String>,
        phone_number: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let account_ref = account_ref.into();
        let phone_number = phone_number.into();

        if account_ref.trim().is_empty() {
            return Err(LedgerError::InvalidInput("account_ref is required".to_string()));
        }
        if phone_number.trim().is_empty() {
            return Err(LedgerError::InvalidInput("phone_number is required".to_string()));
        }

        Ok(LoyaltyLedger {
            id: uuid::Uuid::new_v4().to_string(),
            account_ref,
            phone_number,
            points: 0,
            redeemed_points: 0,
            expiration_date: year_end_of(now),
            created_at: now,
        })
    }

    /// Add earned points to the usable balance
    pub fn earn(&mut self, points: u64) -> Result<u64, LedgerError> {
        if points == 0 {
            return Err(LedgerError::InvalidInput("points to earn must be positive".to_string()));
        }

        self.points = self
            .points
            .checked_add(points)
            .ok_or_else(|| LedgerError::InvalidInput("point balance overflow".to_string()))?;

        Ok(self.points)
    }

    /// Spend points, moving them into the redemption counter
    ///
    /// On failure the ledger is left unchanged.
    pub fn redeem(&mut self, points: u64) -> Result<u64, LedgerError> {
        if points == 0 {
            return Err(LedgerError::InvalidInput("points to redeem must be positive".to_string()));
        }
        if points > self.points {
            return Err(LedgerError::InsufficientPoints {
                available: self.points,
                requested: points,
            });
        }

        let redeemed = self
            .redeemed_points
            .checked_add(points)
            .ok_or_else(|| LedgerError::InvalidInput("redeemed counter overflow".to_string()))?;

        self.points -= points;
        self.redeemed_points = redeemed;

        Ok(self.points)
    }

    /// Strictly past its expiration at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date < now
    }

    /// Forfeit the balance and roll expiration to the end of `now`'s year
    ///
    /// Returns the number of points forfeited. `redeemed_points` is history
    /// and stays as it is.
    pub fn reset_expired(&mut self, now: DateTime<Utc>) -> u64 {
        let forfeited = self.points;
        self.points = 0;
        self.expiration_date = year_end_of(now);
        forfeited
    }

    /// Short, stable fingerprint of the phone number for logs and audit events
    pub fn phone_fingerprint(&self) -> String {
        phone_fingerprint(&self.phone_number)
    }
}

/// First 12 hex chars of SHA-256(phone)
pub fn phone_fingerprint(phone_number: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(phone_number.trim().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{is_year_end, year_end};
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn create_test_ledger() -> LoyaltyLedger {
        LoyaltyLedger::new("account-1", "+15550001111", at(2023, 6, 1)).unwrap()
    }

    #[test]
    fn test_ledger_creation_defaults() {
        let ledger = create_test_ledger();

        assert!(!ledger.id.is_empty());
        assert_eq!(ledger.account_ref, "account-1");
        assert_eq!(ledger.points, 0);
        assert_eq!(ledger.redeemed_points, 0);
        assert_eq!(ledger.expiration_date, year_end(2023).unwrap());
        assert!(is_year_end(ledger.expiration_date));
        assert_eq!(ledger.created_at, at(2023, 6, 1));
    }

    #[test]
    fn test_ledger_ids_are_unique() {
        let a = create_test_ledger();
        let b = create_test_ledger();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_ledger_requires_account_and_phone() {
        assert!(matches!(
            LoyaltyLedger::new("", "+1555", at(2023, 1, 1)),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            LoyaltyLedger::new("account-1", "  ", at(2023, 1, 1)),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_earn_and_redeem() {
        let mut ledger = create_test_ledger();

        assert_eq!(ledger.earn(500).unwrap(), 500);
        assert_eq!(ledger.redeem(200).unwrap(), 300);
        assert_eq!(ledger.points, 300);
        assert_eq!(ledger.redeemed_points, 200);
    }

    #[test]
    fn test_redeem_more_than_balance_fails_without_change() {
        let mut ledger = create_test_ledger();
        ledger.earn(100).unwrap();

        let err = ledger.redeem(150).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientPoints { available: 100, requested: 150 }
        ));
        assert_eq!(ledger.points, 100);
        assert_eq!(ledger.redeemed_points, 0);
    }

    #[test]
    fn test_zero_amounts_rejected() {
        let mut ledger = create_test_ledger();
        assert!(ledger.earn(0).is_err());
        assert!(ledger.redeem(0).is_err());
    }

    #[test]
    fn test_earn_overflow_rejected() {
        let mut ledger = create_test_ledger();
        ledger.earn(u64::MAX).unwrap();
        assert!(ledger.earn(1).is_err());
        assert_eq!(ledger.points, u64::MAX);
    }

    #[test]
    fn test_is_expired_is_strict() {
        let ledger = create_test_ledger();
        let expiry = ledger.expiration_date;

        assert!(!ledger.is_expired_at(expiry));
        assert!(ledger.is_expired_at(expiry + chrono::Duration::seconds(1)));
        assert!(!ledger.is_expired_at(at(2023, 12, 30)));
    }

    #[test]
    fn test_reset_expired_keeps_redemption_history() {
        let mut ledger = create_test_ledger();
        ledger.earn(500).unwrap();
        ledger.redeem(120).unwrap();

        let forfeited = ledger.reset_expired(at(2024, 1, 2));

        assert_eq!(forfeited, 380);
        assert_eq!(ledger.points, 0);
        assert_eq!(ledger.redeemed_points, 120);
        assert_eq!(ledger.expiration_date, year_end(2024).unwrap());
        assert_eq!(ledger.created_at, at(2023, 6, 1));
    }

    #[test]
    fn test_reset_after_several_idle_years_jumps_to_current_year() {
        let mut ledger = create_test_ledger();
        ledger.earn(10).unwrap();

        ledger.reset_expired(at(2027, 3, 15));
        assert_eq!(ledger.expiration_date, year_end(2027).unwrap());
    }

    #[test]
    fn test_phone_fingerprint() {
        let ledger = create_test_ledger();
        let fp = ledger.phone_fingerprint();

        assert_eq!(fp.len(), 12);
        assert_eq!(fp, phone_fingerprint(" +15550001111 "));
        assert_ne!(fp, phone_fingerprint("+15550002222"));
        assert!(!fp.contains("5550001111"));
    }

    #[test]
    fn test_ledger_serializes_camel_case() {
        let ledger = create_test_ledger();
        let json = serde_json::to_value(&ledger).unwrap();

        assert!(json.get("accountRef").is_some());
        assert!(json.get("redeemedPoints").is_some());
        assert!(json.get("expirationDate").is_some());
    }
}
