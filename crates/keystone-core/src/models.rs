//! Domain models shared by the service layers
//!
//! The `users` table is the only persisted entity. Roles are free-form string
//! tags; the constants below are the tags the service assigns itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role assigned to self-registered users
pub const ROLE_USER: &str = "user";

/// Role conventionally allowed to administer users
pub const ROLE_ADMIN: &str = "admin";

/// Persisted identity record
///
/// `password` holds the Argon2 PHC string and is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Build a new, not yet persisted user with a fresh id
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>, role: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            password: password_hash.into(),
            role: role.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Email comparison used for lookups and the uniqueness rule
    pub fn email_matches(&self, email: &str) -> bool {
        normalize_email(&self.email) == normalize_email(email)
    }
}

/// Normalize an email address the way lookups compare it
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new("a@x.com", "$argon2id$hash", ROLE_USER);
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.role, "user");
        assert!(!user.is_deleted());
        assert_eq!(user.created_at, user.updated_at);
        assert!(!user.id.is_nil());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = User::new("a@x.com", "h", ROLE_USER);
        let b = User::new("a@x.com", "h", ROLE_USER);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_email_matches_ignores_case() {
        let user = User::new("Alice@Example.com", "h", ROLE_USER);
        assert!(user.email_matches("alice@example.com"));
        assert!(user.email_matches("  ALICE@EXAMPLE.COM "));
        assert!(!user.email_matches("bob@example.com"));
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn test_email_matches_non_ascii_case() {
        let user = User::new("Ölaf@Exämple.com", "hash", ROLE_USER);
        assert!(user.email_matches("ölaf@exÄmple.COM"));
        assert!(!user.email_matches("olaf@example.com"));
    }

    #[test]
    fn test_password_never_serialized() {
        let user = User::new("a@x.com", "super-secret-hash", ROLE_USER);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("super-secret-hash"));
        assert!(!json.contains("password"));
        assert!(!json.contains("deleted_at"));
    }
}
