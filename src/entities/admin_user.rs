// Admin User Entity - back-office login record
//
// The password field holds plaintext only between construction (or
// `set_password`) and `prepare_for_persistence`. Stores call that step on
// every write, and it hashes anything that is not already a bcrypt hash, so
// what reaches the database is always a hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{hash_password, is_bcrypt_hash, verify_password};
use crate::error::AuthError;

// ============================================================================
// ROLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AdminRole {
    #[default]
    Admin,

    /// Any other role tag found in storage
    Other(String),
}

impl AdminRole {
    pub fn as_str(&self) -> &str {
        match self {
            AdminRole::Admin => "admin",
            AdminRole::Other(tag) => tag,
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "admin" | "" => AdminRole::Admin,
            other => AdminRole::Other(other.to_string()),
        }
    }
}

impl Serialize for AdminRole {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AdminRole {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(AdminRole::from_tag(&tag))
    }
}

// ============================================================================
// ADMIN USER
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    /// Custom admin identifier
    pub aid: String,
    pub name: String,
    /// Login name
    pub email: String,
    /// bcrypt hash once persisted; only settable through `new`/`set_password`
    #[serde(skip_serializing)]
    password: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type", default)]
    pub role: AdminRole,

    #[serde(skip)]
    password_modified: bool,
}

impl AdminUser {
    pub fn new(
        aid: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        let user = AdminUser {
            aid: aid.into(),
            name: name.into(),
            email: email.into(),
            password: password.into(),
            created_at: now,
            role: AdminRole::Admin,
            password_modified: true,
        };

        for (field, value) in [
            ("aid", &user.aid),
            ("name", &user.name),
            ("email", &user.email),
            ("password", &user.password),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::InvalidInput(format!("{} is required", field)));
            }
        }

        Ok(user)
    }

    /// Rebuild a record read back from storage (password already hashed)
    pub(crate) fn from_stored(
        aid: String,
        name: String,
        email: String,
        password_hash: String,
        created_at: DateTime<Utc>,
        role: AdminRole,
    ) -> Self {
        AdminUser {
            aid,
            name,
            email,
            password: password_hash,
            created_at,
            role,
            password_modified: false,
        }
    }

    /// Replace the password; it is hashed on the next write
    pub fn set_password(&mut self, password: impl Into<String>) -> Result<(), AuthError> {
        let password = password.into();
        if password.is_empty() {
            return Err(AuthError::InvalidInput("password is required".to_string()));
        }
        self.password = password;
        self.password_modified = true;
        Ok(())
    }

    /// Stored password value (a bcrypt hash after `prepare_for_persistence`)
    pub fn password_hash(&self) -> &str {
        &self.password
    }

    pub fn is_password_modified(&self) -> bool {
        self.password_modified
    }

    /// Hash a modified password before it is written
    ///
    /// Returns whether a hash was computed. An unchanged password that is
    /// already a bcrypt hash is left alone; anything else (including a
    /// plaintext value that arrived through deserialization) is hashed. On
    /// failure the record keeps its previous state.
    pub fn prepare_for_persistence(&mut self, cost: u32) -> Result<bool, AuthError> {
        if !self.password_modified && is_bcrypt_hash(&self.password) {
            return Ok(false);
        }

        let hashed = hash_password(&self.password, cost)?;
        self.password = hashed;
        self.password_modified = false;
        Ok(true)
    }

    /// Check a candidate plaintext against the stored hash
    ///
    /// A malformed stored hash is a `Comparison` error.
    pub fn compare_password(&self, candidate: &str) -> Result<bool, AuthError> {
        if self.password_modified {
            return Err(AuthError::NotHashed(self.aid.clone()));
        }
        verify_password(candidate, &self.password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    fn create_test_admin() -> AdminUser {
        AdminUser::new("A-001", "Dana", "dana@example.com", "s3cret!", Utc::now()).unwrap()
    }

    #[test]
    fn test_new_admin_defaults() {
        let admin = create_test_admin();
        assert_eq!(admin.role, AdminRole::Admin);
        assert!(admin.is_password_modified());
    }

    #[test]
    fn test_required_fields() {
        let result = AdminUser::new("A-002", "", "x@example.com", "pw", Utc::now());
        assert!(matches!(result, Err(AuthError::InvalidInput(msg)) if msg.contains("name")));
    }

    #[test]
    fn test_prepare_hashes_once() {
        let mut admin = create_test_admin();

        assert!(admin.prepare_for_persistence(TEST_COST).unwrap());
        let first_hash = admin.password.clone();
        assert!(is_bcrypt_hash(&first_hash));
        assert!(!admin.is_password_modified());

        // Unchanged password: no rehash
        assert!(!admin.prepare_for_persistence(TEST_COST).unwrap());
        assert_eq!(admin.password, first_hash);
    }

    #[test]
    fn test_compare_password() {
        let mut admin = create_test_admin();
        admin.prepare_for_persistence(TEST_COST).unwrap();

        assert!(admin.compare_password("s3cret!").unwrap());
        assert!(!admin.compare_password("s3cret?").unwrap());
    }

    #[test]
    fn test_compare_before_hashing_is_an_error() {
        let admin = create_test_admin();
        assert!(matches!(
            admin.compare_password("s3cret!"),
            Err(AuthError::NotHashed(_))
        ));
    }

    #[test]
    fn test_set_password_rehashes() {
        let mut admin = create_test_admin();
        admin.prepare_for_persistence(TEST_COST).unwrap();

        admin.set_password("n3w-pass").unwrap();
        assert!(admin.prepare_for_persistence(TEST_COST).unwrap());
        assert!(admin.compare_password("n3w-pass").unwrap());
        assert!(!admin.compare_password("s3cret!").unwrap());
    }

    #[test]
    fn test_failed_hash_leaves_record_untouched() {
        let mut admin = create_test_admin();

        let err = admin.prepare_for_persistence(2).unwrap_err();
        assert!(matches!(err, AuthError::Hashing(_)));
        assert_eq!(admin.password, "s3cret!");
        assert!(admin.is_password_modified());
    }

    #[test]
    fn test_deserialized_plaintext_is_hashed_on_prepare() {
        let mut admin: AdminUser = serde_json::from_str(
            r#"{"aid":"A-003","name":"Lee","email":"lee@example.com",
                "password":"hunter2","createdAt":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(!admin.is_password_modified());

        assert!(admin.prepare_for_persistence(TEST_COST).unwrap());
        assert!(is_bcrypt_hash(admin.password_hash()));
        assert!(admin.compare_password("hunter2").unwrap());
    }

    #[test]
    fn test_malformed_stored_hash_is_comparison_error() {
        let admin = AdminUser::from_stored(
            "A-004".to_string(),
            "Kim".to_string(),
            "kim@example.com".to_string(),
            "$2b$10$short".to_string(),
            Utc::now(),
            AdminRole::Admin,
        );

        assert!(matches!(
            admin.compare_password("anything"),
            Err(AuthError::Comparison(_))
        ));
    }

    #[test]
    fn test_role_tags() {
        assert_eq!(AdminRole::from_tag("admin"), AdminRole::Admin);
        assert_eq!(
            AdminRole::from_tag("support"),
            AdminRole::Other("support".to_string())
        );

        let admin = create_test_admin();
        let json = serde_json::to_value(&admin).unwrap();
        assert_eq!(json["type"], "admin");
        assert!(json.get("password").is_none());
    }
}
