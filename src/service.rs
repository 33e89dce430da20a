// Loyalty Service - earn/redeem/sweep on top of a LedgerStore
//
// Writes an audit Event for each change when an audit connection is
// attached. Audit failures are logged, never allowed to undo a ledger write.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db::{insert_event, Event};
use crate::entities::LoyaltyLedger;
use crate::error::LedgerError;
use crate::store::LedgerStore;
use crate::sweep::{run_expiration_sweep, SweepReport};

const ENTITY_TYPE: &str = "loyalty_ledger";

pub struct LoyaltyService<'c, S: LedgerStore> {
    store: S,
    audit: Option<&'c Connection>,
    actor: String,
}

impl<'c, S: LedgerStore> LoyaltyService<'c, S> {
    pub fn new(store: S) -> Self {
        LoyaltyService {
            store,
            audit: None,
            actor: "loyalty_service".to_string(),
        }
    }

    /// Record events in `conn`'s audit trail
    pub fn with_audit(mut self, conn: &'c Connection) -> Self {
        self.audit = Some(conn);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn record(&self, event_type: &str, entity_id: &str, data: serde_json::Value, now: DateTime<Utc>) {
        let Some(conn) = self.audit else {
            return;
        };
        let event = Event::new(event_type, ENTITY_TYPE, entity_id, data, &self.actor, now);
        if let Err(e) = insert_event(conn, &event) {
            warn!(event_type, entity_id, error = %e, "failed to write audit event");
        }
    }

    fn load(&self, id: &str) -> Result<LoyaltyLedger, LedgerError> {
        self.store
            .find(id)?
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    /// Open a ledger for an account with a zero balance
    pub fn enroll(
        &self,
        account_ref: &str,
        phone_number: &str,
        now: DateTime<Utc>,
    ) -> Result<LoyaltyLedger, LedgerError> {
        let ledger = LoyaltyLedger::new(account_ref, phone_number, now)?;
        self.store.insert(&ledger)?;

        info!(ledger_id = %ledger.id, phone = %ledger.phone_fingerprint(), "enrolled ledger");
        self.record(
            "ledger_created",
            &ledger.id,
            serde_json::json!({
                "account_ref": ledger.account_ref,
                "phone": ledger.phone_fingerprint(),
                "expiration_date": ledger.expiration_date.to_rfc3339(),
            }),
            now,
        );

        Ok(ledger)
    }

    pub fn get(&self, id: &str) -> Result<LoyaltyLedger, LedgerError> {
        self.load(id)
    }

    pub fn find_by_phone(&self, phone_number: &str) -> Result<Option<LoyaltyLedger>, LedgerError> {
        self.store.find_by_phone(phone_number)
    }

    /// Credit points to an existing ledger
    pub fn earn(&self, id: &str, points: u64, now: DateTime<Utc>) -> Result<LoyaltyLedger, LedgerError> {
        let mut ledger = self.load(id)?;
        ledger.earn(points)?;
        self.store.save(&ledger)?;

        info!(ledger_id = %ledger.id, points, balance = ledger.points, "points earned");
        self.record(
            "points_earned",
            &ledger.id,
            serde_json::json!({ "points": points, "balance": ledger.points }),
            now,
        );

        Ok(ledger)
    }

    /// Credit points to an account, opening its ledger on first earn
    pub fn earn_for_account(
        &self,
        account_ref: &str,
        phone_number: &str,
        points: u64,
        now: DateTime<Utc>,
    ) -> Result<LoyaltyLedger, LedgerError> {
        match self.store.find_by_account(account_ref)? {
            Some(existing) => self.earn(&existing.id, points, now),
            None => {
                let mut ledger = LoyaltyLedger::new(account_ref, phone_number, now)?;
                ledger.earn(points)?;
                self.store.insert(&ledger)?;

                info!(ledger_id = %ledger.id, points, "opened ledger on first earn");
                self.record(
                    "ledger_created",
                    &ledger.id,
                    serde_json::json!({
                        "account_ref": ledger.account_ref,
                        "phone": ledger.phone_fingerprint(),
                        "expiration_date": ledger.expiration_date.to_rfc3339(),
                    }),
                    now,
                );
                self.record(
                    "points_earned",
                    &ledger.id,
                    serde_json::json!({ "points": points, "balance": ledger.points }),
                    now,
                );

                Ok(ledger)
            }
        }
    }

    /// Spend points from a ledger
    pub fn redeem(&self, id: &str, points: u64, now: DateTime<Utc>) -> Result<LoyaltyLedger, LedgerError> {
        let mut ledger = self.load(id)?;
        ledger.redeem(points)?;
        self.store.save(&ledger)?;

        info!(ledger_id = %ledger.id, points, balance = ledger.points, "points redeemed");
        self.record(
            "points_redeemed",
            &ledger.id,
            serde_json::json!({
                "points": points,
                "balance": ledger.points,
                "redeemed_total": ledger.redeemed_points,
            }),
            now,
        );

        Ok(ledger)
    }

    /// Run the expiration sweep and audit every reset
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, LedgerError> {
        let report = run_expiration_sweep(&self.store, now)?;

        for reset in &report.reset {
            self.record(
                "ledger_reset",
                &reset.id,
                serde_json::json!({
                    "forfeited_points": reset.forfeited_points,
                    "previous_expiration": reset.previous_expiration.to_rfc3339(),
                    "new_expiration": reset.ledger.expiration_date.to_rfc3339(),
                }),
                now,
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_events_for_entity, setup_database};
    use crate::store::{MemoryLedgerStore, SqliteLedgerStore};
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_enroll_earn_redeem_with_audit() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let service = LoyaltyService::new(SqliteLedgerStore::new(&conn)).with_audit(&conn);

        let ledger = service.enroll("account-1", "+15550001111", at(2024, 2, 1)).unwrap();
        service.earn(&ledger.id, 300, at(2024, 2, 2)).unwrap();
        let after = service.redeem(&ledger.id, 120, at(2024, 2, 3)).unwrap();

        assert_eq!(after.points, 180);
        assert_eq!(after.redeemed_points, 120);

        let events = get_events_for_entity(&conn, "loyalty_ledger", &ledger.id).unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["points_redeemed", "points_earned", "ledger_created"]);
        assert!(!events[2].data.to_string().contains("5550001111"));
    }

    #[test]
    fn test_redeem_failure_persists_nothing() {
        let service = LoyaltyService::new(MemoryLedgerStore::new());
        let ledger = service.enroll("account-1", "+1555", at(2024, 2, 1)).unwrap();
        service.earn(&ledger.id, 50, at(2024, 2, 1)).unwrap();

        assert!(matches!(
            service.redeem(&ledger.id, 80, at(2024, 2, 2)),
            Err(LedgerError::InsufficientPoints { .. })
        ));
        assert_eq!(service.get(&ledger.id).unwrap().points, 50);
    }

    #[test]
    fn test_earn_for_account_opens_ledger_once() {
        let service = LoyaltyService::new(MemoryLedgerStore::new());

        let first = service
            .earn_for_account("account-1", "+1555", 40, at(2024, 5, 1))
            .unwrap();
        let second = service
            .earn_for_account("account-1", "+1555", 60, at(2024, 5, 2))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.points, 100);
        assert_eq!(service.store().count().unwrap(), 1);
    }

    #[test]
    fn test_unknown_ledger() {
        let service = LoyaltyService::new(MemoryLedgerStore::new());
        assert!(matches!(
            service.earn("nope", 5, at(2024, 1, 1)),
            Err(LedgerError::NotFound(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_sweep_writes_reset_events() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let service = LoyaltyService::new(SqliteLedgerStore::new(&conn))
            .with_audit(&conn)
            .with_actor("expiration_sweep");

        let ledger = service.enroll("account-1", "+1555", at(2023, 6, 1)).unwrap();
        service.earn(&ledger.id, 500, at(2023, 6, 1)).unwrap();

        let report = service.sweep(at(2024, 1, 2)).unwrap();
        assert_eq!(report.reset_ids(), vec![ledger.id.clone()]);

        let events = get_events_for_entity(&conn, "loyalty_ledger", &ledger.id).unwrap();
        assert_eq!(events[0].event_type, "ledger_reset");
        assert_eq!(events[0].actor, "expiration_sweep");
        assert_eq!(events[0].data["forfeited_points"], 500);
    }
}
