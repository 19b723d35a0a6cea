use std::{
    ops::{Deref, DerefMut},
    str::FromStr,
    sync::Arc,
};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, Method, StatusCode},
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Sqlite, SqliteConnection, SqlitePool, Transaction,
};
use tracing::error;

use crate::{app::AppState, Error};

pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// A request-scoped transaction.
///
/// Every handler touching the database takes one of these. Writes become
/// visible only after [`UnitOfWork::commit`]; dropping the value on any other
/// path (early return, `?`, panic) rolls everything back.
///
/// Requests that may write take the write lock up front with
/// `BEGIN IMMEDIATE`. Overlapping writers then queue on SQLite's busy
/// timeout instead of failing when they upgrade from a read lock.
pub struct UnitOfWork(Transaction<'static, Sqlite>);

impl UnitOfWork {
    pub async fn begin(db: &SqlitePool) -> Result<Self, Error> {
        Ok(Self(db.begin().await?))
    }

    pub async fn begin_immediate(db: &SqlitePool) -> Result<Self, Error> {
        Ok(Self(db.begin_with("BEGIN IMMEDIATE").await?))
    }

    pub async fn commit(self) -> Result<(), Error> {
        self.0.commit().await.map_err(|e| e.into())
    }
}

impl Deref for UnitOfWork {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for UnitOfWork {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for UnitOfWork
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<AppState>::from_ref(state);
        let uow = if parts.method == Method::GET || parts.method == Method::HEAD {
            UnitOfWork::begin(&state.db).await
        } else {
            UnitOfWork::begin_immediate(&state.db).await
        };
        uow.map_err(|err| {
            error!("failed to begin the request transaction: {:?}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }
}

// An in-memory database with the full schema and the default roles.
//
// It is limited to a single connection since every in-memory connection
// would otherwise open its own empty database.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    crate::models::create_tables(&pool).await.unwrap();
    crate::models::Role::ensure_defaults(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{connect, test_pool, UnitOfWork};

    async fn count_roles_named(db: &sqlx::SqlitePool, name: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM roles WHERE name = ?")
            .bind(name)
            .fetch_one(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let db = test_pool().await;
        let mut uow = UnitOfWork::begin(&db).await.unwrap();
        sqlx::query("INSERT INTO roles (name) VALUES ('Editor')")
            .execute(&mut *uow)
            .await
            .unwrap();
        uow.commit().await.unwrap();

        assert_eq!(count_roles_named(&db, "Editor").await, 1);
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let db = test_pool().await;
        {
            let mut uow = UnitOfWork::begin(&db).await.unwrap();
            sqlx::query("INSERT INTO roles (name) VALUES ('Editor')")
                .execute(&mut *uow)
                .await
                .unwrap();
        }

        assert_eq!(count_roles_named(&db, "Editor").await, 0);
    }

    #[tokio::test]
    async fn test_overlapping_writers_both_commit() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("desk.db").display());
        let db = connect(&url, 2).await.unwrap();
        crate::models::create_tables(&db).await.unwrap();

        // read before writing, the way the edit and delete handlers do.
        let mut first = UnitOfWork::begin_immediate(&db).await.unwrap();
        let _: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles")
            .fetch_one(&mut *first)
            .await
            .unwrap();

        let second = tokio::spawn({
            let db = db.clone();
            async move {
                let mut uow = UnitOfWork::begin_immediate(&db).await?;
                let _: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles")
                    .fetch_one(&mut *uow)
                    .await?;
                sqlx::query("INSERT INTO roles (name) VALUES ('Writer')")
                    .execute(&mut *uow)
                    .await?;
                uow.commit().await
            }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        sqlx::query("INSERT INTO roles (name) VALUES ('Editor')")
            .execute(&mut *first)
            .await
            .unwrap();
        first.commit().await.unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(count_roles_named(&db, "Editor").await, 1);
        assert_eq!(count_roles_named(&db, "Writer").await, 1);
    }
}
