// Loyalty Ledger - Core Library
// Exposes all modules for use in the CLI and tests

pub mod auth;
pub mod calendar;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod import;
pub mod logging;
pub mod service;
pub mod store;
pub mod sweep;

// Re-export commonly used types
pub use auth::{hash_password, verify_password, DEFAULT_BCRYPT_COST};
pub use calendar::{is_year_end, parse_moment, year_end, year_end_of};
pub use config::{AppConfig, LogFormat};
pub use db::{get_events_for_entity, insert_event, setup_database, Event};
pub use entities::{AdminRole, AdminUser, LoyaltyLedger};
pub use error::{AuthError, LedgerError};
pub use import::{import_ledgers, load_ledgers_csv, ImportSummary};
pub use service::LoyaltyService;
pub use store::{AdminUserStore, LedgerStore, MemoryLedgerStore, SqliteLedgerStore};
pub use sweep::{run_expiration_sweep, ResetLedger, SweepFailure, SweepReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
