use serde::Serialize;
use sqlx::{prelude::FromRow, SqliteConnection};
use tracing::info;

use crate::{utils::parse_tag_names, Error};

#[derive(Clone, Debug, FromRow, Serialize, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

impl Tag {
    pub async fn get_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Self>, Error> {
        sqlx::query_as("SELECT id, name FROM tags WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(|e| e.into())
    }

    pub async fn get_by_name(
        conn: &mut SqliteConnection,
        name: &str,
    ) -> Result<Option<Self>, Error> {
        sqlx::query_as("SELECT id, name FROM tags WHERE name = ?")
            .bind(name.to_lowercase())
            .fetch_optional(conn)
            .await
            .map_err(|e| e.into())
    }

    pub async fn get_by_article(
        conn: &mut SqliteConnection,
        article_id: i64,
    ) -> Result<Vec<Self>, Error> {
        sqlx::query_as(
            "SELECT t.id, t.name FROM tags AS t
             INNER JOIN article_tags AS atg ON atg.tag_id = t.id
             WHERE atg.article_id = ?
             ORDER BY t.name ASC",
        )
        .bind(article_id)
        .fetch_all(conn)
        .await
        .map_err(|e| e.into())
    }

    async fn insert(conn: &mut SqliteConnection, name: &str) -> Result<Self, Error> {
        let id = sqlx::query("INSERT INTO tags (name) VALUES (?)")
            .bind(name)
            .execute(conn)
            .await?
            .last_insert_rowid();
        info!("inserted tag {} with id {}", name, id);
        Ok(Self {
            id,
            name: name.to_string(),
        })
    }

    /// Turns free-text tag input into tag rows.
    ///
    /// Existing tags are reused by their lowercase name; missing ones are
    /// inserted through `conn`, so they only persist if the caller's
    /// transaction commits. Empty input resolves to no tags.
    pub async fn resolve(conn: &mut SqliteConnection, text: &str) -> Result<Vec<Self>, Error> {
        let mut tags = vec![];
        for name in parse_tag_names(text) {
            let tag = match Self::get_by_name(&mut *conn, &name).await? {
                Some(tag) => tag,
                None => Self::insert(&mut *conn, &name).await?,
            };
            tags.push(tag);
        }
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::Tag;
    use crate::db::{test_pool, UnitOfWork};

    fn names(tags: &[Tag]) -> Vec<&str> {
        let mut names = tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_resolve_mixed_case_duplicates() {
        let db = test_pool().await;
        let mut uow = UnitOfWork::begin(&db).await.unwrap();

        let tags = Tag::resolve(&mut uow, "Go, go GO").await.unwrap();
        assert_eq!(names(&tags), vec!["go"]);
    }

    #[tokio::test]
    async fn test_resolve_reuses_existing_rows() {
        let db = test_pool().await;
        let mut uow = UnitOfWork::begin(&db).await.unwrap();

        let first = Tag::resolve(&mut uow, "rust, web").await.unwrap();
        let second = Tag::resolve(&mut uow, "WEB rust").await.unwrap();
        let mut first_ids = first.iter().map(|t| t.id).collect::<Vec<_>>();
        let mut second_ids = second.iter().map(|t| t.id).collect::<Vec<_>>();
        first_ids.sort();
        second_ids.sort();
        assert_eq!(first_ids, second_ids);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags")
            .fetch_one(&mut *uow)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_resolve_empty_input() {
        let db = test_pool().await;
        let mut uow = UnitOfWork::begin(&db).await.unwrap();

        assert!(Tag::resolve(&mut uow, "").await.unwrap().is_empty());
        assert!(Tag::resolve(&mut uow, " ,, \t ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_new_tags_vanish_on_rollback() {
        let db = test_pool().await;
        {
            let mut uow = UnitOfWork::begin(&db).await.unwrap();
            Tag::resolve(&mut uow, "ephemeral").await.unwrap();
        }

        let mut uow = UnitOfWork::begin(&db).await.unwrap();
        assert!(Tag::get_by_name(&mut uow, "ephemeral").await.unwrap().is_none());
    }
}
