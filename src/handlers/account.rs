use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use axum_login::AuthSession;
use tower_sessions::Session;
use minijinja::context;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::info;
use validator::{Validate, ValidationErrors};

use crate::{
    app::AppState,
    auth::Credentials,
    db::UnitOfWork,
    models::{Role, User, USER_ROLE},
    notify::{notify, NotificationKind},
    utils::{add_error, field_errors, safe_next},
    Error,
};

use super::users::check_new_password;

const HOME_URL: &str = "/Article/List";

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    next: Option<String>,
}

pub async fn handler_login_get(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, Error> {
    Ok(state
        .render_template(
            "login.html",
            auth_session.user.as_ref(),
            context! { next => safe_next(query.next.as_deref()) },
        )?
        .into_response())
}

pub async fn handler_login_post(
    State(state): State<Arc<AppState>>,
    mut auth_session: AuthSession<AppState>,
    Form(credentials): Form<Credentials>,
) -> Result<Response, Error> {
    let next = safe_next(credentials.next.as_deref())
        .unwrap_or(HOME_URL)
        .to_string();
    let email = credentials.email.clone();
    // authenticate the user, a wrong email or password shows the form again.
    let user = match auth_session.authenticate(credentials).await? {
        Some(user) => user,
        None => {
            info!("failed login attempt for {}", email);
            return Ok(state
                .render_template(
                    "login.html",
                    None,
                    context! {
                        email => email,
                        next => next,
                        error => "Invalid email or password.",
                    },
                )?
                .into_response());
        }
    };
    // login the user into the session.
    auth_session.login(&user).await?;
    Ok(Redirect::to(&next).into_response())
}

pub async fn handler_logout(mut auth_session: AuthSession<AppState>) -> Result<Redirect, Error> {
    auth_session.logout().await?;
    Ok(Redirect::to(HOME_URL))
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct RegisterForm {
    #[validate(email(message = "Please enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "The full name is required."))]
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub confirm_password: String,
}

impl RegisterForm {
    fn trimmed(self) -> Self {
        Self {
            email: self.email.trim().to_lowercase(),
            full_name: self.full_name.trim().to_string(),
            ..self
        }
    }
}

/// Creates a plain `User` account from the registration form.
pub(crate) async fn register_user(
    conn: &mut SqliteConnection,
    form: &RegisterForm,
) -> Result<User, Error> {
    let mut errors = form.validate().err().unwrap_or_else(ValidationErrors::new);
    check_new_password(&mut errors, &form.password, &form.confirm_password);
    if User::email_taken(&mut *conn, &form.email, None).await? {
        add_error(
            &mut errors,
            "email",
            "This email is already used by another account.",
        );
    }
    if !errors.errors().is_empty() {
        return Err(errors.into());
    }

    let hash = password_auth::generate_hash(&form.password);
    let id = User::insert(&mut *conn, &form.email, &form.full_name, &hash).await?;
    Role::grant(&mut *conn, id, USER_ROLE).await?;
    User::get_by_id(conn, id)
        .await?
        .ok_or(Error::NotFound("user"))
}

fn render_register(
    state: &AppState,
    form: &RegisterForm,
    errors: Option<&ValidationErrors>,
) -> Result<Response, Error> {
    Ok(state
        .render_template(
            "register.html",
            None,
            context! {
                form => form,
                errors => errors.map(field_errors).unwrap_or_default(),
            },
        )?
        .into_response())
}

pub async fn handler_register_get(State(state): State<Arc<AppState>>) -> Result<Response, Error> {
    render_register(&state, &RegisterForm::default(), None)
}

pub async fn handler_register_post(
    State(state): State<Arc<AppState>>,
    mut auth_session: AuthSession<AppState>,
    session: Session,
    mut uow: UnitOfWork,
    Form(form): Form<RegisterForm>,
) -> Result<Response, Error> {
    let form = form.trimmed();
    let user = match register_user(&mut uow, &form).await {
        Ok(user) => user,
        Err(Error::Validation(errors)) => return render_register(&state, &form, Some(&errors)),
        Err(err) => return Err(err),
    };
    uow.commit().await?;

    auth_session.login(&user).await?;
    notify(
        &session,
        NotificationKind::Success,
        "Your account has been created.",
    )
    .await?;
    Ok(Redirect::to(HOME_URL).into_response())
}
