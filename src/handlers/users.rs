use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::Form;
use minijinja::context;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tower_sessions::Session;
use validator::{Validate, ValidationErrors};

use crate::{
    app::AppState,
    auth::CurrentUser,
    db::UnitOfWork,
    models::{Role, RoleSelection, User},
    notify::{notify, take_notification, NotificationKind},
    utils::{add_error, field_errors, Path},
    Error,
};

const LIST_URL: &str = "/User/List";
const MIN_PASSWORD_LENGTH: usize = 6;

// `roles` holds one entry per ticked checkbox, hence the `axum_extra` form extractor.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct UserEditForm {
    #[validate(email(message = "Please enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "The full name is required."))]
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub confirm_password: String,
    pub roles: Vec<String>,
}

impl UserEditForm {
    fn trimmed(self) -> Self {
        Self {
            email: self.email.trim().to_lowercase(),
            full_name: self.full_name.trim().to_string(),
            ..self
        }
    }
}

pub(crate) fn check_new_password(errors: &mut ValidationErrors, password: &str, confirm: &str) {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        add_error(
            errors,
            "password",
            "The password must be at least 6 characters long.",
        );
    }
    if password != confirm {
        add_error(
            errors,
            "confirm_password",
            "The password and its confirmation do not match.",
        );
    }
}

async fn load_user(conn: &mut SqliteConnection, id: i64) -> Result<User, Error> {
    User::get_by_id(conn, id)
        .await?
        .ok_or(Error::NotFound("user"))
}

/// Updates the profile, the password when a new one was typed, and the roles.
pub(crate) async fn edit_user(
    conn: &mut SqliteConnection,
    id: i64,
    form: &UserEditForm,
) -> Result<(), Error> {
    let user = load_user(&mut *conn, id).await?;

    let mut errors = form.validate().err().unwrap_or_else(ValidationErrors::new);
    let change_password = !form.password.is_empty();
    if change_password {
        check_new_password(&mut errors, &form.password, &form.confirm_password);
    }
    if User::email_taken(&mut *conn, &form.email, Some(user.id)).await? {
        add_error(
            &mut errors,
            "email",
            "This email is already used by another account.",
        );
    }
    if !errors.errors().is_empty() {
        return Err(errors.into());
    }

    User::update_profile(&mut *conn, user.id, &form.email, &form.full_name).await?;
    if change_password {
        let hash = password_auth::generate_hash(&form.password);
        User::modify_password(&mut *conn, user.id, &hash).await?;
    }
    Role::set_for_user(conn, user.id, &form.roles).await
}

fn render_form(
    state: &AppState,
    current_user: &User,
    id: i64,
    form: &UserEditForm,
    roles: Vec<RoleSelection>,
    errors: Option<&ValidationErrors>,
) -> Result<Response, Error> {
    Ok(state
        .render_template(
            "user_form.html",
            Some(current_user),
            context! {
                user_id => id,
                form => form,
                roles => roles,
                errors => errors.map(field_errors).unwrap_or_default(),
            },
        )?
        .into_response())
}

pub async fn handler_user_index() -> Redirect {
    Redirect::to(LIST_URL)
}

pub async fn handler_user_list(
    State(state): State<Arc<AppState>>,
    CurrentUser(current_user): CurrentUser,
    session: Session,
    mut uow: UnitOfWork,
) -> Result<Response, Error> {
    let users = User::get_all(&mut uow).await?;
    Ok(state
        .render_template(
            "user_list.html",
            Some(&current_user),
            context! {
                users => users,
                notification => take_notification(&session).await?,
            },
        )?
        .into_response())
}

pub async fn handler_user_edit_get(
    State(state): State<Arc<AppState>>,
    CurrentUser(current_user): CurrentUser,
    Path(id): Path<i64>,
    mut uow: UnitOfWork,
) -> Result<Response, Error> {
    let user = load_user(&mut uow, id).await?;
    let roles = Role::selections_of_user(&mut uow, id).await?;
    let form = UserEditForm {
        email: user.email,
        full_name: user.full_name,
        roles: roles
            .iter()
            .filter(|role| role.is_selected)
            .map(|role| role.name.clone())
            .collect(),
        ..Default::default()
    };
    render_form(&state, &current_user, id, &form, roles, None)
}

pub async fn handler_user_edit_post(
    State(state): State<Arc<AppState>>,
    CurrentUser(current_user): CurrentUser,
    Path(id): Path<i64>,
    session: Session,
    mut uow: UnitOfWork,
    Form(form): Form<UserEditForm>,
) -> Result<Response, Error> {
    let form = form.trimmed();
    match edit_user(&mut uow, id, &form).await {
        Ok(_) => {
            uow.commit().await?;
            notify(&session, NotificationKind::Info, "User edited.").await?;
            Ok(Redirect::to(LIST_URL).into_response())
        }
        Err(Error::Validation(errors)) => {
            // show the roles as they were ticked, not as they are stored.
            let roles = Role::get_all(&mut uow)
                .await?
                .into_iter()
                .map(|role| RoleSelection {
                    is_selected: form.roles.contains(&role.name),
                    name: role.name,
                })
                .collect();
            render_form(&state, &current_user, id, &form, roles, Some(&errors))
        }
        Err(err) => Err(err),
    }
}

pub async fn handler_user_delete_get(
    State(state): State<Arc<AppState>>,
    CurrentUser(current_user): CurrentUser,
    Path(id): Path<i64>,
    mut uow: UnitOfWork,
) -> Result<Response, Error> {
    let user = load_user(&mut uow, id).await?;
    Ok(state
        .render_template(
            "user_delete.html",
            Some(&current_user),
            context! { user => user },
        )?
        .into_response())
}

pub async fn handler_user_delete_post(
    Path(id): Path<i64>,
    session: Session,
    mut uow: UnitOfWork,
) -> Result<Response, Error> {
    load_user(&mut uow, id).await?;
    User::delete(&mut uow, id).await?;
    uow.commit().await?;
    notify(&session, NotificationKind::Warning, "User deleted.").await?;
    Ok(Redirect::to(LIST_URL).into_response())
}

#[cfg(test)]
mod tests {
    use super::{edit_user, UserEditForm};
    use crate::{
        db::{test_pool, UnitOfWork},
        models::{fixtures, Role, User, ADMIN_ROLE, USER_ROLE},
        utils::field_errors,
        Error,
    };

    fn form(email: &str, full_name: &str, roles: &[&str]) -> UserEditForm {
        UserEditForm {
            email: email.to_string(),
            full_name: full_name.to_string(),
            roles: roles.iter().map(|role| role.to_string()).collect(),
            ..Default::default()
        }
        .trimmed()
    }

    #[tokio::test]
    async fn test_edit_profile_and_roles() {
        let db = test_pool().await;
        let mut uow = UnitOfWork::begin(&db).await.unwrap();
        let user = fixtures::user(&mut uow, "old@example.com", "Old").await;
        Role::grant(&mut uow, user.id, USER_ROLE).await.unwrap();

        edit_user(
            &mut uow,
            user.id,
            &form(" New@Example.com ", "New Name", &[ADMIN_ROLE, USER_ROLE]),
        )
        .await
        .unwrap();

        let edited = User::get_by_id(&mut uow, user.id).await.unwrap().unwrap();
        assert_eq!(edited.email, "new@example.com");
        assert_eq!(edited.username, "new@example.com");
        assert_eq!(edited.full_name, "New Name");
        assert!(edited.is_admin);
        // no password typed, the hash stays.
        assert_eq!(edited.password, user.password);

        edit_user(&mut uow, user.id, &form("new@example.com", "New Name", &[]))
            .await
            .unwrap();
        assert!(Role::names_of_user(&mut uow, user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_change_password() {
        let db = test_pool().await;
        let mut uow = UnitOfWork::begin(&db).await.unwrap();
        let user = fixtures::user(&mut uow, "u@example.com", "U").await;

        let mut change = form("u@example.com", "U", &[USER_ROLE]);
        change.password = "hunter22".to_string();
        change.confirm_password = "hunter22".to_string();
        edit_user(&mut uow, user.id, &change).await.unwrap();

        let edited = User::get_by_id(&mut uow, user.id).await.unwrap().unwrap();
        assert!(password_auth::verify_password("hunter22", &edited.password).is_ok());
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let db = test_pool().await;
        let mut uow = UnitOfWork::begin(&db).await.unwrap();
        let user = fixtures::user(&mut uow, "u@example.com", "U").await;
        fixtures::user(&mut uow, "taken@example.com", "T").await;

        let mut bad = form("not an email", "", &[ADMIN_ROLE]);
        bad.password = "short".to_string();
        bad.confirm_password = "other".to_string();
        match edit_user(&mut uow, user.id, &bad).await {
            Err(Error::Validation(errors)) => {
                let errors = field_errors(&errors);
                for field in ["email", "full_name", "password", "confirm_password"] {
                    assert!(errors.contains_key(field), "missing error for {field}");
                }
            }
            other => panic!("expected a validation error, got {:?}", other),
        }

        assert!(matches!(
            edit_user(&mut uow, user.id, &form("taken@example.com", "U", &[])).await,
            Err(Error::Validation(_))
        ));

        // nothing was written by the failed attempts.
        let unchanged = User::get_by_id(&mut uow, user.id).await.unwrap().unwrap();
        assert_eq!(unchanged.email, "u@example.com");
        assert!(!unchanged.is_admin);
    }

    #[tokio::test]
    async fn test_missing_user() {
        let db = test_pool().await;
        let mut uow = UnitOfWork::begin(&db).await.unwrap();
        assert!(matches!(
            edit_user(&mut uow, 7, &form("x@example.com", "X", &[])).await,
            Err(Error::NotFound(_))
        ));
    }
}
