//! Postgres implementation of the repository ports
//!
//! Author: hephaex@gmail.com

use super::executor::{DbExecutor, SharedTransaction};
use super::{RepositoryError, RepositoryRegistry, UserRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use keystone_core::User;
use sqlx::{FromRow, PgPool, Row};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, password, role, created_at, updated_at, deleted_at";

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Database row for `users`
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            password: row.password,
            role: row.role,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

fn map_sqlx_error(operation: &'static str, key: &str, err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return RepositoryError::Conflict {
                operation,
                entity: "user",
                field: "email",
                key: key.to_string(),
            };
        }
    }
    RepositoryError::database(operation, key, err)
}

fn decode_user(
    operation: &'static str,
    key: &str,
    row: &sqlx::postgres::PgRow,
) -> Result<User, RepositoryError> {
    UserRow::from_row(row)
        .map(User::from)
        .map_err(|e| RepositoryError::database(operation, key, e))
}

/// `UserRepository` over a pool or a transaction
#[derive(Debug, Clone)]
pub struct PgUserRepository {
    executor: DbExecutor,
}

impl PgUserRepository {
    pub fn new(executor: DbExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<User, RepositoryError> {
        const OP: &str = "users.find_by_email";
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE lower(email) = lower($1) AND deleted_at IS NULL LIMIT 1"
        );

        let row = self
            .executor
            .fetch_optional(sqlx::query(&sql).bind(email))
            .await
            .map_err(|e| map_sqlx_error(OP, email, e))?
            .ok_or_else(|| RepositoryError::NotFound {
                operation: OP,
                entity: "user",
                key: email.to_string(),
            })?;

        decode_user(OP, email, &row)
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, RepositoryError> {
        const OP: &str = "users.exists_by_email";
        let row = self
            .executor
            .fetch_one(
                sqlx::query(
                    "SELECT EXISTS (SELECT 1 FROM users \
                     WHERE lower(email) = lower($1) AND deleted_at IS NULL)",
                )
                .bind(email),
            )
            .await
            .map_err(|e| map_sqlx_error(OP, email, e))?;

        row.try_get::<bool, _>(0)
            .map_err(|e| RepositoryError::database(OP, email, e))
    }

    async fn create(&self, user: &User) -> Result<(), RepositoryError> {
        const OP: &str = "users.create";
        let result = self
            .executor
            .execute(
                sqlx::query(
                    "INSERT INTO users (id, email, password, role, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(user.id)
                .bind(&user.email)
                .bind(&user.password)
                .bind(&user.role)
                .bind(user.created_at)
                .bind(user.updated_at),
            )
            .await
            .map_err(|e| map_sqlx_error(OP, &user.email, e))?;

        if result.rows_affected() != 1 {
            return Err(RepositoryError::UnexpectedRowsAffected {
                operation: OP,
                key: user.email.clone(),
                expected: 1,
                actual: result.rows_affected(),
            });
        }

        debug!(user_id = %user.id, "user row inserted");
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, RepositoryError> {
        const OP: &str = "users.get_by_id";
        let key = id.to_string();
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");

        let row = self
            .executor
            .fetch_optional(sqlx::query(&sql).bind(id))
            .await
            .map_err(|e| map_sqlx_error(OP, &key, e))?
            .ok_or_else(|| RepositoryError::NotFound {
                operation: OP,
                entity: "user",
                key: key.clone(),
            })?;

        decode_user(OP, &key, &row)
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        const OP: &str = "users.list";
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY created_at, id"
        );

        let rows = self
            .executor
            .fetch_all(sqlx::query(&sql))
            .await
            .map_err(|e| map_sqlx_error(OP, "*", e))?;

        rows.iter().map(|row| decode_user(OP, "*", row)).collect()
    }
}

/// Registry over a Postgres pool
///
/// Cloning is cheap. A registry created by `run_in_transaction` carries the
/// transaction in its executor; every repository it hands out shares it.
#[derive(Debug, Clone)]
pub struct PgRepositoryRegistry {
    pool: PgPool,
    executor: DbExecutor,
}

impl PgRepositoryRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self {
            executor: DbExecutor::Pool(pool.clone()),
            pool,
        }
    }

    pub fn executor(&self) -> &DbExecutor {
        &self.executor
    }
}

/// Take sole ownership of the transaction once the unit of work is done
fn reclaim(
    shared: SharedTransaction,
    operation: &'static str,
) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, RepositoryError> {
    Arc::try_unwrap(shared)
        .map(Mutex::into_inner)
        .map_err(|_| RepositoryError::TransactionInUse { operation })
}

async fn rollback(shared: SharedTransaction) {
    match reclaim(shared, "transaction.rollback") {
        Ok(tx) => {
            if let Err(e) = tx.rollback().await {
                error!(error = %e, "transaction rollback failed");
            }
        }
        // The last clone to drop rolls the transaction back
        Err(e) => warn!(error = %e, "rollback deferred to drop"),
    }
}

async fn commit(shared: SharedTransaction) -> Result<(), RepositoryError> {
    let tx = reclaim(shared, "transaction.commit")?;
    tx.commit()
        .await
        .map_err(|e| RepositoryError::database("transaction.commit", "", e))
}

#[async_trait]
impl RepositoryRegistry for PgRepositoryRegistry {
    type Users = PgUserRepository;

    fn user_repository(&self) -> PgUserRepository {
        PgUserRepository::new(self.executor.clone())
    }

    fn in_transaction(&self) -> bool {
        self.executor.is_transaction()
    }

    async fn run_in_transaction<T, E, F, Fut>(&self, unit: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<RepositoryError> + Send + 'static,
        F: FnOnce(Self) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if self.in_transaction() {
            return unit(self.clone()).await;
        }

        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| E::from(RepositoryError::database("transaction.begin", "", e)))?;
        let shared: SharedTransaction = Arc::new(Mutex::new(tx));
        let scoped = Self {
            pool: self.pool.clone(),
            executor: DbExecutor::Transaction(Arc::clone(&shared)),
        };

        let outcome = AssertUnwindSafe(unit(scoped)).catch_unwind().await;

        match outcome {
            Ok(Ok(value)) => {
                commit(shared).await.map_err(E::from)?;
                Ok(value)
            }
            Ok(Err(err)) => {
                rollback(shared).await;
                Err(err)
            }
            Err(panic) => {
                rollback(shared).await;
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.executor
            .execute(sqlx::query("SELECT 1"))
            .await
            .map(|_| ())
            .map_err(|e| RepositoryError::database("ping", "", e))
    }
}
