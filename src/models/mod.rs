mod articles;
mod categories;
mod tags;
mod users;

pub(crate) use articles::*;
pub(crate) use categories::*;
pub(crate) use tags::*;
pub(crate) use users::*;

const CREATE_TABLE_USERS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    full_name TEXT NOT NULL,
    password TEXT NOT NULL
);
"#;

const CREATE_TABLE_ROLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS roles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
"#;

const CREATE_TABLE_USER_ROLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS user_roles (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, role_id)
);
"#;

const CREATE_TABLE_CATEGORIES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
"#;

const CREATE_TABLE_TAGS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
"#;

const CREATE_TABLE_ARTICLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL
);
"#;

const CREATE_TABLE_ARTICLE_TAGS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS article_tags (
    article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id),
    PRIMARY KEY (article_id, tag_id)
);
"#;

const CREATE_INDEXES_SQL: [&str; 3] = [
    "CREATE INDEX IF NOT EXISTS idx_articles_category ON articles(category_id);",
    "CREATE INDEX IF NOT EXISTS idx_articles_author ON articles(author_id);",
    "CREATE INDEX IF NOT EXISTS idx_article_tags_tag ON article_tags(tag_id);",
];

pub async fn create_tables(db: &sqlx::SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_TABLE_USERS_SQL).execute(db).await?;
    sqlx::query(CREATE_TABLE_ROLES_SQL).execute(db).await?;
    sqlx::query(CREATE_TABLE_USER_ROLES_SQL).execute(db).await?;
    sqlx::query(CREATE_TABLE_CATEGORIES_SQL).execute(db).await?;
    sqlx::query(CREATE_TABLE_TAGS_SQL).execute(db).await?;
    sqlx::query(CREATE_TABLE_ARTICLES_SQL).execute(db).await?;
    sqlx::query(CREATE_TABLE_ARTICLE_TAGS_SQL).execute(db).await?;
    for sql in CREATE_INDEXES_SQL {
        sqlx::query(sql).execute(db).await?;
    }
    Ok(())
}
