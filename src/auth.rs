use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_login::{AuthSession, AuthUser, AuthnBackend, UserId};
use serde::Deserialize;
use tokio::task;

use crate::{app::AppState, error::Error, models::User, policy::require_admin, utils::login_url};

impl AuthUser for User {
    type Id = i64;

    fn id(&self) -> Self::Id {
        self.id
    }

    // changing the password invalidates every existing session of the user.
    fn session_auth_hash(&self) -> &[u8] {
        self.password.as_bytes()
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub next: Option<String>,
}

#[async_trait]
impl AuthnBackend for AppState {
    type User = User;
    type Credentials = Credentials;
    type Error = Error;

    async fn authenticate(
        &self,
        creds: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let mut conn = self.db.acquire().await?;
        let user = User::get_by_email(&mut conn, &creds.email).await?;
        // Verifying the password is blocking and potentially slow, so we'll do so via
        // `spawn_blocking`.
        task::spawn_blocking(|| {
            Ok(user.filter(|user| {
                password_auth::verify_password(creds.password, &user.password).is_ok()
            }))
        })
        .await?
    }

    async fn get_user(&self, user_id: &UserId<Self>) -> Result<Option<Self::User>, Self::Error> {
        let mut conn = self.db.acquire().await?;
        User::get_by_id(&mut conn, *user_id).await
    }
}

impl From<axum_login::Error<AppState>> for Error {
    fn from(err: axum_login::Error<AppState>) -> Self {
        match err {
            axum_login::Error::Session(err) => Error::Session(err),
            axum_login::Error::Backend(err) => err,
        }
    }
}

/// The logged-in user of the request.
///
/// Extracting it from an anonymous request redirects to the login page and
/// remembers where the visitor wanted to go.
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_session = AuthSession::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        match auth_session.user {
            Some(user) => Ok(CurrentUser(user)),
            None => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|path| path.as_str())
                    .unwrap_or("/");
                Err(Redirect::to(&login_url(next)).into_response())
            }
        }
    }
}

// Guards a whole group of routes, anonymous visitors are sent to the login page first.
pub async fn admin_required(
    CurrentUser(user): CurrentUser,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    require_admin(&user)?;
    Ok(next.run(request).await)
}
