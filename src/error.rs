use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio::task;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    MiniJinja(#[from] minijinja::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    TaskJoin(#[from] task::JoinError),

    #[error(transparent)]
    Session(#[from] tower_sessions::session::Error),

    #[error("config validation failed: {0}")]
    ConfigValidation(String),

    #[error("invalid input: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("you are not allowed to do that")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(&'static str),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::OK,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // whether the error is caused by the request rather than by the server.
    pub fn is_client_error(&self) -> bool {
        !self.status_code().is_server_error()
    }
}

// Marks a response whose body should be replaced by the rendered error page.
#[derive(Clone, Debug)]
pub struct ErrorPage {
    pub message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if self.is_client_error() {
            self.to_string()
        } else {
            error!("request failed: {:?}", self);
            "Oops, something went wrong on our side...".to_string()
        };
        let mut response = status.into_response();
        response.extensions_mut().insert(ErrorPage { message });
        response
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::{Error, ErrorPage};

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::NotFound("article").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::BadRequest("missing id").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Sqlx(sqlx::Error::RowNotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(Error::Forbidden.is_client_error());
        assert!(!Error::ConfigValidation("x".to_string()).is_client_error());
    }

    #[test]
    fn test_into_response_hides_server_errors() {
        let response = Error::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let page = response.extensions().get::<ErrorPage>().unwrap();
        assert_eq!(page.message, "you are not allowed to do that");

        let response = Error::Sqlx(sqlx::Error::PoolClosed).into_response();
        let page = response.extensions().get::<ErrorPage>().unwrap();
        assert!(!page.message.contains("pool"));
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(Error::NotFound("category").to_string(), "category not found");
    }
}
