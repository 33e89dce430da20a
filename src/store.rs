// Record stores for ledgers and admin users
//
// `LedgerStore` is the seam the expiration sweep and the service layer work
// against. Two implementations:
// - SqliteLedgerStore: the persistent store (UNIQUE + CHECK constraints)
// - MemoryLedgerStore: in-process store with the same uniqueness rules

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use crate::calendar::is_year_end;
use crate::db::{format_timestamp, insert_event, timestamp_column, Event};
use crate::entities::{AdminRole, AdminUser, LoyaltyLedger};
use crate::error::{unique_violation_field, AuthError, LedgerError};

// ============================================================================
// LEDGER STORE TRAIT
// ============================================================================

pub trait LedgerStore {
    /// Insert a new ledger; uniqueness violations are `Duplicate`
    fn insert(&self, ledger: &LoyaltyLedger) -> Result<(), LedgerError>;

    fn find(&self, id: &str) -> Result<Option<LoyaltyLedger>, LedgerError>;

    fn find_by_account(&self, account_ref: &str) -> Result<Option<LoyaltyLedger>, LedgerError>;

    fn find_by_phone(&self, phone_number: &str) -> Result<Option<LoyaltyLedger>, LedgerError>;

    /// Ledgers whose expiration is strictly before `now`
    fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<LoyaltyLedger>, LedgerError>;

    /// Persist an existing ledger; `NotFound` if it was never inserted
    fn save(&self, ledger: &LoyaltyLedger) -> Result<(), LedgerError>;

    fn count(&self) -> Result<usize, LedgerError>;
}

fn points_to_sql(points: u64) -> Result<i64, LedgerError> {
    i64::try_from(points)
        .map_err(|_| LedgerError::InvalidInput(format!("{} points exceeds storage range", points)))
}

fn points_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

/// Expiration must sit on a year-end instant (Dec 31, 00:00:00 UTC)
fn check_expiration(ledger: &LoyaltyLedger) -> Result<(), LedgerError> {
    if !is_year_end(ledger.expiration_date) {
        return Err(LedgerError::InvalidInput(format!(
            "expiration_date {} is not a year end",
            ledger.expiration_date.to_rfc3339()
        )));
    }
    Ok(())
}

fn map_ledger_write_error(err: rusqlite::Error) -> LedgerError {
    match unique_violation_field(&err) {
        Some(field) => LedgerError::Duplicate { field },
        None => LedgerError::Database(err),
    }
}

// ============================================================================
// SQLITE LEDGER STORE
// ============================================================================

const LEDGER_COLUMNS: &str =
    "id, account_ref, phone_number, points, redeemed_points, expiration_date, created_at";

pub struct SqliteLedgerStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteLedgerStore<'c> {
    /// Wrap a connection whose schema was created by `setup_database`
    pub fn new(conn: &'c Connection) -> Self {
        SqliteLedgerStore { conn }
    }

    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    fn row_to_ledger(row: &Row<'_>) -> rusqlite::Result<LoyaltyLedger> {
        Ok(LoyaltyLedger {
            id: row.get(0)?,
            account_ref: row.get(1)?,
            phone_number: row.get(2)?,
            points: points_column(row, 3)?,
            redeemed_points: points_column(row, 4)?,
            expiration_date: timestamp_column(row, 5)?,
            created_at: timestamp_column(row, 6)?,
        })
    }

    fn find_one(&self, column: &str, value: &str) -> Result<Option<LoyaltyLedger>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM loyalty_ledgers WHERE {} = ?1",
            LEDGER_COLUMNS, column
        );
        let ledger = self
            .conn
            .query_row(&sql, [value], Self::row_to_ledger)
            .optional()?;
        Ok(ledger)
    }
}

impl LedgerStore for SqliteLedgerStore<'_> {
    fn insert(&self, ledger: &LoyaltyLedger) -> Result<(), LedgerError> {
        check_expiration(ledger)?;
        self.conn
            .execute(
                "INSERT INTO loyalty_ledgers (
                    id, account_ref, phone_number, points, redeemed_points,
                    expiration_date, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    ledger.id,
                    ledger.account_ref,
                    ledger.phone_number,
                    points_to_sql(ledger.points)?,
                    points_to_sql(ledger.redeemed_points)?,
                    format_timestamp(ledger.expiration_date),
                    format_timestamp(ledger.created_at),
                ],
            )
            .map_err(map_ledger_write_error)?;

        debug!(ledger_id = %ledger.id, "inserted ledger");
        Ok(())
    }

    fn find(&self, id: &str) -> Result<Option<LoyaltyLedger>, LedgerError> {
        self.find_one("id", id)
    }

    fn find_by_account(&self, account_ref: &str) -> Result<Option<LoyaltyLedger>, LedgerError> {
        self.find_one("account_ref", account_ref)
    }

    fn find_by_phone(&self, phone_number: &str) -> Result<Option<LoyaltyLedger>, LedgerError> {
        self.find_one("phone_number", phone_number)
    }

    fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<LoyaltyLedger>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM loyalty_ledgers WHERE expiration_date < ?1 ORDER BY row_id",
            LEDGER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let ledgers = stmt
            .query_map([format_timestamp(now)], Self::row_to_ledger)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ledgers)
    }

    fn save(&self, ledger: &LoyaltyLedger) -> Result<(), LedgerError> {
        check_expiration(ledger)?;
        let updated = self
            .conn
            .execute(
                "UPDATE loyalty_ledgers
                 SET phone_number = ?2,
                     points = ?3,
                     redeemed_points = ?4,
                     expiration_date = ?5
                 WHERE id = ?1",
                params![
                    ledger.id,
                    ledger.phone_number,
                    points_to_sql(ledger.points)?,
                    points_to_sql(ledger.redeemed_points)?,
                    format_timestamp(ledger.expiration_date),
                ],
            )
            .map_err(map_ledger_write_error)?;

        if updated == 0 {
            return Err(LedgerError::NotFound(ledger.id.clone()));
        }

        Ok(())
    }

    fn count(&self) -> Result<usize, LedgerError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM loyalty_ledgers", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

// ============================================================================
// MEMORY LEDGER STORE
// ============================================================================

/// In-process ledger store
///
/// Clones share the same records.
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    ledgers: Arc<RwLock<Vec<LoyaltyLedger>>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<LoyaltyLedger>> {
        self.ledgers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<LoyaltyLedger>> {
        self.ledgers.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn find_where<F>(&self, predicate: F) -> Option<LoyaltyLedger>
    where
        F: Fn(&LoyaltyLedger) -> bool,
    {
        self.read().iter().find(|l| predicate(l)).cloned()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn insert(&self, ledger: &LoyaltyLedger) -> Result<(), LedgerError> {
        check_expiration(ledger)?;
        let mut ledgers = self.write();

        for existing in ledgers.iter() {
            let field = if existing.id == ledger.id {
                "id"
            } else if existing.account_ref == ledger.account_ref {
                "account_ref"
            } else if existing.phone_number == ledger.phone_number {
                "phone_number"
            } else {
                continue;
            };
            return Err(LedgerError::Duplicate {
                field: field.to_string(),
            });
        }

        ledgers.push(ledger.clone());
        Ok(())
    }

    fn find(&self, id: &str) -> Result<Option<LoyaltyLedger>, LedgerError> {
        Ok(self.find_where(|l| l.id == id))
    }

    fn find_by_account(&self, account_ref: &str) -> Result<Option<LoyaltyLedger>, LedgerError> {
        Ok(self.find_where(|l| l.account_ref == account_ref))
    }

    fn find_by_phone(&self, phone_number: &str) -> Result<Option<LoyaltyLedger>, LedgerError> {
        Ok(self.find_where(|l| l.phone_number == phone_number))
    }

    fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<LoyaltyLedger>, LedgerError> {
        Ok(self
            .read()
            .iter()
            .filter(|l| l.is_expired_at(now))
            .cloned()
            .collect())
    }

    fn save(&self, ledger: &LoyaltyLedger) -> Result<(), LedgerError> {
        check_expiration(ledger)?;
        let mut ledgers = self.write();

        if ledgers
            .iter()
            .any(|l| l.id != ledger.id && l.phone_number == ledger.phone_number)
        {
            return Err(LedgerError::Duplicate {
                field: "phone_number".to_string(),
            });
        }

        let slot = ledgers
            .iter_mut()
            .find(|l| l.id == ledger.id)
            .ok_or_else(|| LedgerError::NotFound(ledger.id.clone()))?;

        // account_ref and created_at are fixed at insert time
        slot.phone_number = ledger.phone_number.clone();
        slot.points = ledger.points;
        slot.redeemed_points = ledger.redeemed_points;
        slot.expiration_date = ledger.expiration_date;

        Ok(())
    }

    fn count(&self) -> Result<usize, LedgerError> {
        Ok(self.read().len())
    }
}

// ============================================================================
// ADMIN USER STORE
// ============================================================================

/// SQLite-backed admin users; every write goes through
/// `AdminUser::prepare_for_persistence` first. Creations and password
/// changes land in the audit trail without any hash material.
const ADMIN_ENTITY_TYPE: &str = "admin_user";

pub struct AdminUserStore<'c> {
    conn: &'c Connection,
    bcrypt_cost: u32,
}

impl<'c> AdminUserStore<'c> {
    pub fn new(conn: &'c Connection, bcrypt_cost: u32) -> Self {
        AdminUserStore { conn, bcrypt_cost }
    }

    fn map_write_error(err: rusqlite::Error) -> AuthError {
        match unique_violation_field(&err) {
            Some(field) => AuthError::Duplicate { field },
            None => AuthError::Database(err),
        }
    }

    fn record(&self, event_type: &str, user: &AdminUser, data: serde_json::Value) {
        let event = Event::new(
            event_type,
            ADMIN_ENTITY_TYPE,
            &user.aid,
            data,
            "admin_user_store",
            Utc::now(),
        );
        if let Err(e) = insert_event(self.conn, &event) {
            warn!(event_type, aid = %user.aid, error = %e, "failed to write audit event");
        }
    }

    /// Hash (if needed) and insert a new admin
    pub fn create(&self, user: &mut AdminUser) -> Result<(), AuthError> {
        user.prepare_for_persistence(self.bcrypt_cost)?;

        self.conn
            .execute(
                "INSERT INTO admin_users (aid, name, email, password, created_at, type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.aid,
                    user.name,
                    user.email,
                    user.password_hash(),
                    format_timestamp(user.created_at),
                    user.role.as_str(),
                ],
            )
            .map_err(Self::map_write_error)?;

        debug!(aid = %user.aid, "created admin user");
        self.record(
            "admin_created",
            user,
            serde_json::json!({
                "name": user.name,
                "email": user.email,
                "role": user.role.as_str(),
            }),
        );
        Ok(())
    }

    /// Persist changes to an existing admin
    ///
    /// Returns whether the password was rehashed.
    pub fn update(&self, user: &mut AdminUser) -> Result<bool, AuthError> {
        let rehashed = user.prepare_for_persistence(self.bcrypt_cost)?;

        let updated = self
            .conn
            .execute(
                "UPDATE admin_users SET name = ?2, email = ?3, password = ?4, type = ?5
                 WHERE aid = ?1",
                params![
                    user.aid,
                    user.name,
                    user.email,
                    user.password_hash(),
                    user.role.as_str(),
                ],
            )
            .map_err(Self::map_write_error)?;

        if updated == 0 {
            return Err(AuthError::NotFound(user.aid.clone()));
        }

        if rehashed {
            self.record(
                "admin_password_changed",
                user,
                serde_json::json!({ "email": user.email }),
            );
        }

        Ok(rehashed)
    }

    fn row_to_admin(row: &Row<'_>) -> rusqlite::Result<AdminUser> {
        let role: String = row.get(5)?;
        Ok(AdminUser::from_stored(
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            timestamp_column(row, 4)?,
            AdminRole::from_tag(&role),
        ))
    }

    fn find_one(&self, column: &str, value: &str) -> Result<Option<AdminUser>, AuthError> {
        let sql = format!(
            "SELECT aid, name, email, password, created_at, type FROM admin_users WHERE {} = ?1",
            column
        );
        let user = self
            .conn
            .query_row(&sql, [value], Self::row_to_admin)
            .optional()?;
        Ok(user)
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<AdminUser>, AuthError> {
        self.find_one("email", email)
    }

    pub fn find_by_aid(&self, aid: &str) -> Result<Option<AdminUser>, AuthError> {
        self.find_one("aid", aid)
    }

    /// Look up by email and check the password
    ///
    /// `Ok(None)` covers both unknown email and wrong password; hashing or
    /// storage problems are errors.
    pub fn authenticate(&self, email: &str, candidate: &str) -> Result<Option<AdminUser>, AuthError> {
        let Some(user) = self.find_by_email(email)? else {
            return Ok(None);
        };

        if user.compare_password(candidate)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
