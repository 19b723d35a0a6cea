use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{prelude::FromRow, SqliteConnection};
use tracing::info;

use super::Tag;
use crate::{
    listing::{page_offset, ListParams, Paged, PAGE_SIZE},
    Error,
};

#[derive(Clone, Debug, FromRow, Serialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub category_id: i64,
    pub created_at: DateTime<Utc>,
}

// An article joined with its author, category and tags, as the views need it.
#[derive(Clone, Debug, FromRow, Serialize)]
pub struct ArticleDetails {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author_name: String,
    pub author_email: String,
    pub category_id: i64,
    pub category_name: String,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub tags: Vec<Tag>,
}

const SELECT_DETAILS_SQL: &str = r#"
SELECT a.id, a.title, a.content, a.author_id,
       u.full_name AS author_name, u.email AS author_email,
       a.category_id, c.name AS category_name, a.created_at
FROM articles AS a
INNER JOIN users AS u ON u.id = a.author_id
INNER JOIN categories AS c ON c.id = a.category_id
"#;

// `?1` is the search text or NULL. lower() only folds ASCII letters in SQLite.
const SEARCH_FILTER_SQL: &str = r#"
WHERE ?1 IS NULL
   OR instr(lower(a.title), lower(?1)) > 0
   OR instr(lower(a.content), lower(?1)) > 0
"#;

impl Article {
    pub async fn get_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Self>, Error> {
        sqlx::query_as(
            "SELECT id, title, content, author_id, category_id, created_at
             FROM articles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(|e| e.into())
    }

    pub async fn get_details(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<ArticleDetails>, Error> {
        let details: Option<ArticleDetails> =
            sqlx::query_as(&format!("{SELECT_DETAILS_SQL} WHERE a.id = ?"))
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
        match details {
            Some(mut details) => {
                details.tags = Tag::get_by_article(conn, id).await?;
                Ok(Some(details))
            }
            None => Ok(None),
        }
    }

    /// One page of the article list, filtered by title or content and sorted.
    pub async fn list(
        conn: &mut SqliteConnection,
        params: &ListParams,
    ) -> Result<Paged<ArticleDetails>, Error> {
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM articles AS a {SEARCH_FILTER_SQL}"
        ))
        .bind(params.filter.as_deref())
        .fetch_one(&mut *conn)
        .await?;
        let offset = match page_offset(params.page) {
            Some(offset) if offset < total => offset,
            _ => return Ok(Paged::empty(params.page, total)),
        };

        let items = sqlx::query_as(&format!(
            "{SELECT_DETAILS_SQL} {SEARCH_FILTER_SQL} ORDER BY {} LIMIT ?2 OFFSET ?3",
            params.sort.order_by_sql()
        ))
        .bind(params.filter.as_deref())
        .bind(PAGE_SIZE)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Paged::new(
            Self::with_tags(conn, items).await?,
            params.page,
            total,
        ))
    }

    pub async fn list_by_tag(
        conn: &mut SqliteConnection,
        tag_id: i64,
        page: i64,
    ) -> Result<Paged<ArticleDetails>, Error> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM article_tags WHERE tag_id = ?")
                .bind(tag_id)
                .fetch_one(&mut *conn)
                .await?;
        let offset = match page_offset(page) {
            Some(offset) if offset < total => offset,
            _ => return Ok(Paged::empty(page, total)),
        };

        let items = sqlx::query_as(&format!(
            "{SELECT_DETAILS_SQL}
             INNER JOIN article_tags AS atg ON atg.article_id = a.id
             WHERE atg.tag_id = ?1
             ORDER BY a.title ASC, a.id ASC
             LIMIT ?2 OFFSET ?3"
        ))
        .bind(tag_id)
        .bind(PAGE_SIZE)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Paged::new(Self::with_tags(conn, items).await?, page, total))
    }

    async fn with_tags(
        conn: &mut SqliteConnection,
        mut items: Vec<ArticleDetails>,
    ) -> Result<Vec<ArticleDetails>, Error> {
        for item in items.iter_mut() {
            item.tags = Tag::get_by_article(&mut *conn, item.id).await?;
        }
        Ok(items)
    }

    pub async fn create(
        conn: &mut SqliteConnection,
        author_id: i64,
        category_id: i64,
        title: &str,
        content: &str,
        tags: &str,
    ) -> Result<i64, Error> {
        let id = sqlx::query(
            "INSERT INTO articles (title, content, author_id, category_id, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(title)
        .bind(content)
        .bind(author_id)
        .bind(category_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();
        info!("inserted article {} with id {}", title, id);

        let tags = Tag::resolve(&mut *conn, tags).await?;
        Self::replace_tags(conn, id, &tags).await?;
        Ok(id)
    }

    // the author is never changed after creation.
    pub async fn update(
        conn: &mut SqliteConnection,
        id: i64,
        category_id: i64,
        title: &str,
        content: &str,
        tags: &str,
    ) -> Result<(), Error> {
        sqlx::query("UPDATE articles SET title = ?, content = ?, category_id = ? WHERE id = ?")
            .bind(title)
            .bind(content)
            .bind(category_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        info!("updated article {} with id {}", title, id);

        let tags = Tag::resolve(&mut *conn, tags).await?;
        Self::replace_tags(conn, id, &tags).await
    }

    /// Replaces the whole tag set of the article, no diffing.
    pub async fn replace_tags(
        conn: &mut SqliteConnection,
        id: i64,
        tags: &[Tag],
    ) -> Result<(), Error> {
        sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        for tag in tags {
            sqlx::query("INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?, ?)")
                .bind(id)
                .bind(tag.id)
                .execute(&mut *conn)
                .await?;
        }
        info!("set {} tags for article {}", tags.len(), id);
        Ok(())
    }

    // tag rows themselves are left alone, even when nothing references them anymore.
    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<(), Error> {
        sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        info!("deleted article {}", id);
        Ok(())
    }

    pub(crate) async fn delete_by_category(
        conn: &mut SqliteConnection,
        category_id: i64,
    ) -> Result<u64, Error> {
        sqlx::query(
            "DELETE FROM article_tags
             WHERE article_id IN (SELECT id FROM articles WHERE category_id = ?)",
        )
        .bind(category_id)
        .execute(&mut *conn)
        .await?;
        let result = sqlx::query("DELETE FROM articles WHERE category_id = ?")
            .bind(category_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub(crate) async fn delete_by_author(
        conn: &mut SqliteConnection,
        author_id: i64,
    ) -> Result<u64, Error> {
        sqlx::query(
            "DELETE FROM article_tags
             WHERE article_id IN (SELECT id FROM articles WHERE author_id = ?)",
        )
        .bind(author_id)
        .execute(&mut *conn)
        .await?;
        let result = sqlx::query("DELETE FROM articles WHERE author_id = ?")
            .bind(author_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}

impl ArticleDetails {
    // the tag names joined the way the editor shows them.
    pub fn tags_text(&self) -> String {
        self.tags
            .iter()
            .map(|tag| tag.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::Article;
    use crate::{
        db::{test_pool, UnitOfWork},
        listing::{ListParams, SortOrder},
        models::{fixtures, Tag},
    };

    fn params(sort: SortOrder, filter: Option<&str>, page: i64) -> ListParams {
        ListParams {
            sort,
            filter: filter.map(str::to_string),
            page,
        }
    }

    fn tag_names(details: &super::ArticleDetails) -> Vec<&str> {
        details.tags.iter().map(|t| t.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_create_and_clear_tags() {
        let db = test_pool().await;
        let mut uow = UnitOfWork::begin(&db).await.unwrap();
        let author = fixtures::user(&mut uow, "a@example.com", "A").await;
        let news = fixtures::category(&mut uow, "News").await;

        let id = fixtures::article(&mut uow, &author, &news, "T", "C", "Rust, rust,  Go").await;
        let details = Article::get_details(&mut uow, id).await.unwrap().unwrap();
        assert_eq!(tag_names(&details), vec!["go", "rust"]);
        assert_eq!(details.tags_text(), "go, rust");
        assert_eq!(details.author_name, "A");
        assert_eq!(details.category_name, "News");

        Article::update(&mut uow, id, news.id, "T", "C", "").await.unwrap();
        let details = Article::get_details(&mut uow, id).await.unwrap().unwrap();
        assert!(details.tags.is_empty());
        // the tags are orphaned, not deleted.
        assert!(Tag::get_by_name(&mut uow, "rust").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_is_idempotent_and_keeps_author() {
        let db = test_pool().await;
        let mut uow = UnitOfWork::begin(&db).await.unwrap();
        let author = fixtures::user(&mut uow, "a@example.com", "A").await;
        let news = fixtures::category(&mut uow, "News").await;
        let misc = fixtures::category(&mut uow, "Misc").await;
        let id = fixtures::article(&mut uow, &author, &news, "T", "C", "x").await;

        for _ in 0..2 {
            Article::update(&mut uow, id, misc.id, "T2", "C2", "B a, A")
                .await
                .unwrap();
        }
        let details = Article::get_details(&mut uow, id).await.unwrap().unwrap();
        assert_eq!(tag_names(&details), vec!["a", "b"]);
        assert_eq!(details.title, "T2");
        assert_eq!(details.category_id, misc.id);
        assert_eq!(details.author_id, author.id);
    }

    #[tokio::test]
    async fn test_delete_leaves_tags() {
        let db = test_pool().await;
        let mut uow = UnitOfWork::begin(&db).await.unwrap();
        let author = fixtures::user(&mut uow, "a@example.com", "A").await;
        let news = fixtures::category(&mut uow, "News").await;
        let id = fixtures::article(&mut uow, &author, &news, "T", "C", "keep").await;

        Article::delete(&mut uow, id).await.unwrap();
        assert!(Article::get_by_id(&mut uow, id).await.unwrap().is_none());
        assert!(Tag::get_by_name(&mut uow, "keep").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_search_sort_and_pages() {
        let db = test_pool().await;
        let mut uow = UnitOfWork::begin(&db).await.unwrap();
        let zed = fixtures::user(&mut uow, "z@example.com", "Zed").await;
        let amy = fixtures::user(&mut uow, "a@example.com", "Amy").await;
        let news = fixtures::category(&mut uow, "News").await;
        fixtures::article(&mut uow, &zed, &news, "Banana", "about FOO bars", "").await;
        fixtures::article(&mut uow, &amy, &news, "apple", "nothing", "").await;
        fixtures::article(&mut uow, &amy, &news, "Cherry foo", "x", "").await;
        fixtures::article(&mut uow, &zed, &news, "Date", "y", "").await;
        fixtures::article(&mut uow, &amy, &news, "Elder", "z", "").await;

        // search matches title or content, ignoring ASCII case.
        let page = Article::list(&mut uow, &params(SortOrder::TitleAsc, Some("foo"), 1))
            .await
            .unwrap();
        let titles = page.items.iter().map(|a| a.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["Banana", "Cherry foo"]);
        assert_eq!(page.total_items, 2);

        let page = Article::list(&mut uow, &params(SortOrder::TitleDesc, None, 1))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.page_count, 2);
        assert!(page
            .items
            .windows(2)
            .all(|pair| pair[0].title >= pair[1].title));

        let page = Article::list(&mut uow, &params(SortOrder::AuthorAsc, None, 1))
            .await
            .unwrap();
        assert!(page.items.iter().all(|a| a.author_name == "Amy"));

        let page = Article::list(&mut uow, &params(SortOrder::AuthorDesc, None, 1))
            .await
            .unwrap();
        assert_eq!(page.items[0].author_name, "Zed");

        let page = Article::list(&mut uow, &params(SortOrder::TitleAsc, None, 2))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(!page.has_next);

        // beyond the last page.
        let page = Article::list(&mut uow, &params(SortOrder::TitleAsc, None, 5))
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.page_count, 2);

        let page = Article::list(&mut uow, &params(SortOrder::TitleAsc, None, 0))
            .await
            .unwrap();
        assert!(page.items.is_empty());

        // pages whose offset does not fit in an i64 are empty, not the first page.
        for huge in [i64::MAX, 4_611_686_018_427_387_905] {
            let page = Article::list(&mut uow, &params(SortOrder::TitleAsc, None, huge))
                .await
                .unwrap();
            assert!(page.items.is_empty());
            assert_eq!(page.total_items, 5);
        }
    }

    #[tokio::test]
    async fn test_list_by_tag() {
        let db = test_pool().await;
        let mut uow = UnitOfWork::begin(&db).await.unwrap();
        let author = fixtures::user(&mut uow, "a@example.com", "A").await;
        let news = fixtures::category(&mut uow, "News").await;
        for title in ["d", "c", "b", "a"] {
            fixtures::article(&mut uow, &author, &news, title, "x", "rust").await;
        }
        fixtures::article(&mut uow, &author, &news, "other", "x", "go").await;
        let rust = Tag::get_by_name(&mut uow, "rust").await.unwrap().unwrap();

        let page = Article::list_by_tag(&mut uow, rust.id, 1).await.unwrap();
        let titles = page.items.iter().map(|a| a.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["a", "b", "c"]);
        assert_eq!(page.total_items, 4);

        let page = Article::list_by_tag(&mut uow, rust.id, 2).await.unwrap();
        assert_eq!(page.items.len(), 1);
        for page in [3, i64::MAX, 4_611_686_018_427_387_905] {
            assert!(Article::list_by_tag(&mut uow, rust.id, page)
                .await
                .unwrap()
                .items
                .is_empty());
        }
    }
}
