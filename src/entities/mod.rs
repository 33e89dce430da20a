// Entity Models
//
// - LoyaltyLedger: point balance + year-end expiration, one per account
// - AdminUser: back-office login with hash-on-write password handling

pub mod admin_user;
pub mod ledger;

pub use admin_user::{AdminRole, AdminUser};
pub use ledger::{phone_fingerprint, LoyaltyLedger};
