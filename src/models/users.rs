use serde::Serialize;
use sqlx::{prelude::FromRow, SqliteConnection};
use tracing::info;

use crate::Error;

pub const ADMIN_ROLE: &str = "Admin";
pub const USER_ROLE: &str = "User";

const SELECT_USER_SQL: &str = r#"
SELECT u.id, u.username, u.email, u.full_name, u.password,
       EXISTS (
           SELECT 1 FROM user_roles AS ur
           INNER JOIN roles AS r ON r.id = ur.role_id
           WHERE ur.user_id = u.id AND r.name = 'Admin'
       ) AS is_admin
FROM users AS u
"#;

#[derive(Clone, Debug, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub is_admin: bool,
}

impl User {
    pub async fn get_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Self>, Error> {
        sqlx::query_as(&format!("{SELECT_USER_SQL} WHERE u.id = ?"))
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(|e| e.into())
    }

    pub async fn get_by_email(
        conn: &mut SqliteConnection,
        email: &str,
    ) -> Result<Option<Self>, Error> {
        sqlx::query_as(&format!("{SELECT_USER_SQL} WHERE u.email = ?"))
            .bind(email.trim().to_lowercase())
            .fetch_optional(conn)
            .await
            .map_err(|e| e.into())
    }

    pub async fn get_all(conn: &mut SqliteConnection) -> Result<Vec<Self>, Error> {
        sqlx::query_as(&format!("{SELECT_USER_SQL} ORDER BY u.email ASC"))
            .fetch_all(conn)
            .await
            .map_err(|e| e.into())
    }

    // check whether the email is already used by another account.
    pub async fn email_taken(
        conn: &mut SqliteConnection,
        email: &str,
        except_id: Option<i64>,
    ) -> Result<bool, Error> {
        let owner: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(conn)
            .await?;
        Ok(owner.is_some_and(|id| Some(id) != except_id))
    }

    // logins are by email, so the username always mirrors it.
    pub async fn insert(
        conn: &mut SqliteConnection,
        email: &str,
        full_name: &str,
        password_hash: &str,
    ) -> Result<i64, Error> {
        let email = email.trim().to_lowercase();
        let id = sqlx::query(
            "INSERT INTO users (username, email, full_name, password) VALUES (?, ?, ?, ?)",
        )
        .bind(&email)
        .bind(&email)
        .bind(full_name.trim())
        .bind(password_hash)
        .execute(conn)
        .await?
        .last_insert_rowid();
        info!("inserted user {} with id {}", email, id);
        Ok(id)
    }

    pub async fn update_profile(
        conn: &mut SqliteConnection,
        id: i64,
        email: &str,
        full_name: &str,
    ) -> Result<(), Error> {
        let email = email.trim().to_lowercase();
        sqlx::query("UPDATE users SET username = ?, email = ?, full_name = ? WHERE id = ?")
            .bind(&email)
            .bind(&email)
            .bind(full_name.trim())
            .bind(id)
            .execute(conn)
            .await?;
        info!("updated user {} with email {}", id, email);
        Ok(())
    }

    pub async fn modify_password(
        conn: &mut SqliteConnection,
        id: i64,
        password_hash: &str,
    ) -> Result<(), Error> {
        sqlx::query("UPDATE users SET password = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(conn)
            .await?;
        info!("changed password of user {}", id);
        Ok(())
    }

    /// Deletes the user together with every article they wrote.
    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<(), Error> {
        let articles = super::Article::delete_by_author(&mut *conn, id).await?;
        info!("deleted {} articles of user {}", articles, id);
        sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        info!("deleted user {}", id);
        Ok(())
    }

    // create the configured admin account on first start, do nothing if the email is taken.
    pub async fn ensure_admin(
        db: &sqlx::SqlitePool,
        email: &str,
        full_name: &str,
        password: &str,
    ) -> Result<(), Error> {
        let mut tx = db.begin().await?;
        let id = match Self::get_by_email(&mut tx, email).await? {
            Some(user) => user.id,
            None => {
                let hash = password_auth::generate_hash(password);
                Self::insert(&mut tx, email, full_name, &hash).await?
            }
        };
        Role::grant(&mut tx, id, ADMIN_ROLE).await?;
        Role::grant(&mut tx, id, USER_ROLE).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Clone, Debug, FromRow, Serialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

// A role as shown on the user editor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoleSelection {
    pub name: String,
    pub is_selected: bool,
}

impl Role {
    pub async fn ensure_defaults(db: &sqlx::SqlitePool) -> Result<(), Error> {
        for name in [ADMIN_ROLE, USER_ROLE] {
            sqlx::query("INSERT OR IGNORE INTO roles (name) VALUES (?)")
                .bind(name)
                .execute(db)
                .await?;
        }
        Ok(())
    }

    pub async fn get_all(conn: &mut SqliteConnection) -> Result<Vec<Self>, Error> {
        sqlx::query_as("SELECT id, name FROM roles ORDER BY name ASC")
            .fetch_all(conn)
            .await
            .map_err(|e| e.into())
    }

    pub async fn names_of_user(
        conn: &mut SqliteConnection,
        user_id: i64,
    ) -> Result<Vec<String>, Error> {
        sqlx::query_scalar(
            "SELECT r.name FROM roles AS r
             INNER JOIN user_roles AS ur ON ur.role_id = r.id
             WHERE ur.user_id = ?
             ORDER BY r.name ASC",
        )
        .bind(user_id)
        .fetch_all(conn)
        .await
        .map_err(|e| e.into())
    }

    // every known role, flagged with whether the user holds it.
    pub async fn selections_of_user(
        conn: &mut SqliteConnection,
        user_id: i64,
    ) -> Result<Vec<RoleSelection>, Error> {
        let held = Self::names_of_user(&mut *conn, user_id).await?;
        Ok(Self::get_all(&mut *conn)
            .await?
            .into_iter()
            .map(|role| RoleSelection {
                is_selected: held.contains(&role.name),
                name: role.name,
            })
            .collect())
    }

    // returns whether a new grant was written.
    pub async fn grant(
        conn: &mut SqliteConnection,
        user_id: i64,
        name: &str,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO user_roles (user_id, role_id)
             SELECT ?, id FROM roles WHERE name = ?",
        )
        .bind(user_id)
        .bind(name)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn revoke(
        conn: &mut SqliteConnection,
        user_id: i64,
        name: &str,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            "DELETE FROM user_roles
             WHERE user_id = ? AND role_id IN (SELECT id FROM roles WHERE name = ?)",
        )
        .bind(user_id)
        .bind(name)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Makes the user hold exactly the selected roles.
    ///
    /// Only known roles are considered; unknown names in `selected` are
    /// ignored. Roles already in the wanted state are left alone.
    pub async fn set_for_user(
        conn: &mut SqliteConnection,
        user_id: i64,
        selected: &[String],
    ) -> Result<(), Error> {
        for role in Self::selections_of_user(&mut *conn, user_id).await? {
            let wanted = selected.iter().any(|name| name == &role.name);
            if wanted && !role.is_selected {
                Self::grant(&mut *conn, user_id, &role.name).await?;
                info!("granted role {} to user {}", role.name, user_id);
            } else if !wanted && role.is_selected {
                Self::revoke(&mut *conn, user_id, &role.name).await?;
                info!("revoked role {} from user {}", role.name, user_id);
            }
        }
        Ok(())
    }
}
