use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, SqliteConnection};
use tracing::info;

use crate::Error;

#[derive(Clone, Debug, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, FromRow, Serialize)]
pub struct CategoryWithCount {
    pub id: i64,
    pub name: String,
    pub article_count: i64,
}

impl Category {
    pub async fn get_all(conn: &mut SqliteConnection) -> Result<Vec<Self>, Error> {
        sqlx::query_as("SELECT id, name FROM categories ORDER BY name ASC")
            .fetch_all(conn)
            .await
            .map_err(|e| e.into())
    }

    pub async fn get_all_with_count(
        conn: &mut SqliteConnection,
    ) -> Result<Vec<CategoryWithCount>, Error> {
        sqlx::query_as(
            "SELECT c.id, c.name, COUNT(a.id) AS article_count
             FROM categories AS c
             LEFT JOIN articles AS a ON a.category_id = c.id
             GROUP BY c.id, c.name
             ORDER BY c.name ASC",
        )
        .fetch_all(conn)
        .await
        .map_err(|e| e.into())
    }

    pub async fn get_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Self>, Error> {
        sqlx::query_as("SELECT id, name FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(|e| e.into())
    }

    // names are compared case-insensitively, `except_id` lets a category keep its own name.
    pub async fn name_taken(
        conn: &mut SqliteConnection,
        name: &str,
        except_id: Option<i64>,
    ) -> Result<bool, Error> {
        let owner: Option<i64> =
            sqlx::query_scalar("SELECT id FROM categories WHERE LOWER(name) = LOWER(?)")
                .bind(name.trim())
                .fetch_optional(conn)
                .await?;
        Ok(owner.is_some_and(|id| Some(id) != except_id))
    }

    pub async fn insert(conn: &mut SqliteConnection, name: &str) -> Result<i64, Error> {
        let id = sqlx::query("INSERT INTO categories (name) VALUES (?)")
            .bind(name.trim())
            .execute(conn)
            .await?
            .last_insert_rowid();
        info!("inserted category {} with id {}", name, id);
        Ok(id)
    }

    pub async fn rename(conn: &mut SqliteConnection, id: i64, name: &str) -> Result<(), Error> {
        sqlx::query("UPDATE categories SET name = ? WHERE id = ?")
            .bind(name.trim())
            .bind(id)
            .execute(conn)
            .await?;
        info!("renamed category {} to {}", id, name);
        Ok(())
    }

    /// Deletes the category and every article filed under it.
    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<(), Error> {
        let articles = super::Article::delete_by_category(&mut *conn, id).await?;
        info!("deleted {} articles of category {}", articles, id);
        sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        info!("deleted category {}", id);
        Ok(())
    }
}
