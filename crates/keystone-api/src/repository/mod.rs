//! Repository/transaction gateway
//!
//! Services talk to storage only through the ports defined here:
//! - `UserRepository` for the `users` table
//! - `RepositoryRegistry`, a factory for repositories that also runs units of
//!   work inside one transaction
//!
//! The Postgres implementation lives in `postgres`; an in-memory registry is
//! available behind the `test-utils` feature.

pub mod executor;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use keystone_core::User;
use std::future::Future;
use thiserror::Error;
use uuid::Uuid;

pub use executor::DbExecutor;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryRepositoryRegistry;
pub use postgres::{PgRepositoryRegistry, PgUserRepository};

/// Repository errors
///
/// Every variant names the operation and the key it was run with so log
/// lines can be traced back to a single statement.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{operation}: {entity} not found ({key})")]
    NotFound {
        operation: &'static str,
        entity: &'static str,
        key: String,
    },

    #[error("{operation}: {entity} with this {field} already exists ({key})")]
    Conflict {
        operation: &'static str,
        entity: &'static str,
        field: &'static str,
        key: String,
    },

    #[error("{operation}: expected {expected} affected row(s), got {actual} ({key})")]
    UnexpectedRowsAffected {
        operation: &'static str,
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("{operation}: database error ({key}): {source}")]
    Database {
        operation: &'static str,
        key: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{operation}: transaction handle still in use")]
    TransactionInUse { operation: &'static str },
}

impl RepositoryError {
    pub fn database(operation: &'static str, key: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Database {
            operation,
            key: key.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Access to the `users` table
///
/// Every method ignores soft-deleted rows. Email comparison is
/// case-insensitive.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fetch the active user with this email, `NotFound` if none
    async fn find_by_email(&self, email: &str) -> Result<User, RepositoryError>;

    async fn exists_by_email(&self, email: &str) -> Result<bool, RepositoryError>;

    /// Insert a new row; exactly one row must be affected
    async fn create(&self, user: &User) -> Result<(), RepositoryError>;

    async fn get_by_id(&self, id: Uuid) -> Result<User, RepositoryError>;

    /// All active users, oldest first
    async fn list(&self) -> Result<Vec<User>, RepositoryError>;
}

/// Factory for repositories bound either to a pool or to a transaction
///
/// `run_in_transaction` hands the unit of work a registry whose repositories
/// all share one transaction:
/// - the unit returns `Err`: rollback, and the unit's error is returned
/// - the unit panics: rollback, then the panic resumes
/// - the unit returns `Ok`: commit; a commit failure is returned
///
/// Calling it on a registry that is already transactional runs the unit in
/// the existing transaction; there are no savepoints.
#[async_trait]
pub trait RepositoryRegistry: Clone + Send + Sync + 'static {
    type Users: UserRepository + Clone + 'static;

    fn user_repository(&self) -> Self::Users;

    /// Whether repositories from this registry run inside a transaction
    fn in_transaction(&self) -> bool;

    async fn run_in_transaction<T, E, F, Fut>(&self, unit: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<RepositoryError> + Send + 'static,
        F: FnOnce(Self) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static;

    /// Round trip to the backing store
    async fn ping(&self) -> Result<(), RepositoryError>;
}
