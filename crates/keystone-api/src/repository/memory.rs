//! In-memory repository registry for tests
//!
//! Mirrors the Postgres semantics the services rely on: soft-deleted rows are
//! invisible, emails are unique case-insensitively, and `run_in_transaction`
//! restores the previous table contents when the unit of work fails or
//! panics. Concurrent units are not isolated from each other.

use super::{RepositoryError, RepositoryRegistry, UserRepository};
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use keystone_core::User;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

type Table = Arc<Mutex<Vec<User>>>;

fn lock(table: &Table) -> MutexGuard<'_, Vec<User>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `UserRepository` over a shared vector
#[derive(Debug, Clone)]
pub struct MemoryUserRepository {
    users: Table,
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<User, RepositoryError> {
        lock(&self.users)
            .iter()
            .find(|u| !u.is_deleted() && u.email_matches(email))
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound {
                operation: "users.find_by_email",
                entity: "user",
                key: email.to_string(),
            })
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, RepositoryError> {
        Ok(lock(&self.users)
            .iter()
            .any(|u| !u.is_deleted() && u.email_matches(email)))
    }

    async fn create(&self, user: &User) -> Result<(), RepositoryError> {
        let mut users = lock(&self.users);
        if users
            .iter()
            .any(|u| !u.is_deleted() && u.email_matches(&user.email))
        {
            return Err(RepositoryError::Conflict {
                operation: "users.create",
                entity: "user",
                field: "email",
                key: user.email.clone(),
            });
        }
        users.push(user.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, RepositoryError> {
        lock(&self.users)
            .iter()
            .find(|u| !u.is_deleted() && u.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound {
                operation: "users.get_by_id",
                entity: "user",
                key: id.to_string(),
            })
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(lock(&self.users)
            .iter()
            .filter(|u| !u.is_deleted())
            .cloned()
            .collect())
    }
}

/// Registry backed by a process-local table
#[derive(Debug, Clone, Default)]
pub struct MemoryRepositoryRegistry {
    users: Table,
    in_transaction: bool,
}

impl MemoryRepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row directly, bypassing uniqueness checks
    pub fn insert(&self, user: User) {
        lock(&self.users).push(user);
    }

    /// Mark a row deleted; returns false when no active row has this id
    pub fn soft_delete(&self, id: Uuid) -> bool {
        let mut users = lock(&self.users);
        match users.iter_mut().find(|u| u.id == id && !u.is_deleted()) {
            Some(user) => {
                user.deleted_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Every row, deleted ones included
    pub fn snapshot(&self) -> Vec<User> {
        lock(&self.users).clone()
    }

    fn restore(&self, rows: Vec<User>) {
        *lock(&self.users) = rows;
    }
}

#[async_trait]
impl RepositoryRegistry for MemoryRepositoryRegistry {
    type Users = MemoryUserRepository;

    fn user_repository(&self) -> MemoryUserRepository {
        MemoryUserRepository {
            users: Arc::clone(&self.users),
        }
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn run_in_transaction<T, E, F, Fut>(&self, unit: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<RepositoryError> + Send + 'static,
        F: FnOnce(Self) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if self.in_transaction {
            return unit(self.clone()).await;
        }

        let before = self.snapshot();
        let scoped = Self {
            users: Arc::clone(&self.users),
            in_transaction: true,
        };

        match AssertUnwindSafe(unit(scoped)).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                self.restore(before);
                Err(err)
            }
            Err(panic) => {
                self.restore(before);
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn user(email: &str) -> User {
        User::new(email, "$argon2id$hash", "user")
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let registry = MemoryRepositoryRegistry::new();
        let users = registry.user_repository();
        users.create(&user("Alice@Example.com")).await.unwrap();

        assert!(users.exists_by_email("alice@example.com").await.unwrap());
        let found = users.find_by_email("ALICE@EXAMPLE.COM").await.unwrap();
        assert_eq!(found.email, "Alice@Example.com");
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let registry = MemoryRepositoryRegistry::new();
        let users = registry.user_repository();
        assert_ok!(users.create(&user("a@x.com")).await);

        let err = assert_err!(users.create(&user("A@X.COM")).await);
        assert!(err.is_conflict());
        assert_eq!(users.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_soft_deleted_rows_are_invisible() {
        let registry = MemoryRepositoryRegistry::new();
        let users = registry.user_repository();
        let deleted = user("gone@x.com");
        users.create(&deleted).await.unwrap();
        assert!(registry.soft_delete(deleted.id));

        assert!(users.find_by_email("gone@x.com").await.unwrap_err().is_not_found());
        assert!(users.get_by_id(deleted.id).await.unwrap_err().is_not_found());
        assert!(!users.exists_by_email("gone@x.com").await.unwrap());
        assert!(users.list().await.unwrap().is_empty());

        // The email is free again once the old row is deleted
        users.create(&user("gone@x.com")).await.unwrap();
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_unit_restores_rows() {
        let registry = MemoryRepositoryRegistry::new();

        let result: Result<(), RepositoryError> = registry
            .run_in_transaction(|tx| async move {
                tx.user_repository().create(&user("a@x.com")).await?;
                tx.user_repository().create(&user("a@x.com")).await?;
                Ok(())
            })
            .await;

        assert!(result.unwrap_err().is_conflict());
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_successful_unit_keeps_rows() {
        let registry = MemoryRepositoryRegistry::new();

        let id = registry
            .run_in_transaction(|tx| async move {
                assert!(tx.in_transaction());
                let new_user = user("a@x.com");
                tx.user_repository().create(&new_user).await?;
                Ok::<_, RepositoryError>(new_user.id)
            })
            .await
            .unwrap();

        assert_eq!(registry.user_repository().get_by_id(id).await.unwrap().id, id);
        assert!(!registry.in_transaction());
    }

    #[tokio::test]
    async fn test_nested_unit_joins_outer_transaction() {
        let registry = MemoryRepositoryRegistry::new();

        let result: Result<(), RepositoryError> = registry
            .run_in_transaction(|outer| async move {
                outer
                    .run_in_transaction(|inner| async move {
                        assert!(inner.in_transaction());
                        inner.user_repository().create(&user("a@x.com")).await
                    })
                    .await?;
                Err(RepositoryError::NotFound {
                    operation: "test",
                    entity: "user",
                    key: "x".to_string(),
                })
            })
            .await;

        assert_err!(result);
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_unit_restores_rows_and_resumes_panic() {
        let registry = MemoryRepositoryRegistry::new();
        let tx_registry = registry.clone();

        let handle = tokio::spawn(async move {
            tx_registry
                .run_in_transaction(|tx| async move {
                    tx.user_repository().create(&user("a@x.com")).await?;
                    if true {
                        panic!("unit of work exploded");
                    }
                    Ok::<_, RepositoryError>(())
                })
                .await
        });

        assert!(handle.await.unwrap_err().is_panic());
        assert!(registry.snapshot().is_empty());
    }
}
