use std::{borrow::Cow, collections::BTreeMap};

use axum::{
    async_trait,
    extract::{rejection::PathRejection, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use validator::{ValidationError, ValidationErrors};

use crate::Error;

// A wrapper for `axum::extract::Path` that answers a malformed id with a 400 page.
pub struct Path<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for Path<T>
where
    // derive the `FromRequestParts` implementation for `axum::extract::Path` for the type `T`.
    axum::extract::Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    T: Send,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Path::<T>::from_request_parts(parts, state).await {
            Ok(value) => Ok(Self(value.0)),
            Err(rejection) => {
                warn!("parse path rejection: {:?}", rejection);
                Err(Error::BadRequest("malformed id"))
            }
        }
    }
}

/// Splits free-text tag input into normalized tag names.
///
/// Commas and whitespace both separate tags. Names are lowercased and
/// deduplicated; the result is sorted so the output is deterministic.
pub fn parse_tag_names(text: &str) -> Vec<String> {
    let mut names = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>();
    names.sort();
    names.dedup();
    names
}

// Only local absolute paths are allowed as a post-login target, `//host` would leave the site.
pub fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|next| next.starts_with('/') && !next.starts_with("//") && !next.contains('\\'))
}

pub fn login_url(next: &str) -> String {
    let next: String = url::form_urlencoded::byte_serialize(next.as_bytes()).collect();
    format!("/Account/Login?next={}", next)
}

pub fn add_error(errors: &mut ValidationErrors, field: &'static str, message: &'static str) {
    let mut error = ValidationError::new(field);
    error.message = Some(Cow::Borrowed(message));
    errors.add(field, error);
}

// Flatten the errors into one message per field for the templates.
pub fn field_errors(errors: &ValidationErrors) -> BTreeMap<String, String> {
    errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, errors)| {
            let message = errors.first().map(|error| match &error.message {
                Some(message) => message.to_string(),
                None => format!("invalid {}", field),
            })?;
            Some((field.to_string(), message))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use validator::ValidationErrors;

    use super::{add_error, field_errors, login_url, parse_tag_names, safe_next};

    #[test]
    fn test_parse_tag_names() {
        assert_eq!(
            parse_tag_names("hello,world,foo,bar"),
            vec!["bar", "foo", "hello", "world"]
        );
        assert_eq!(
            parse_tag_names(",,,hello world\tfoo,bar, ,  ,"),
            vec!["bar", "foo", "hello", "world"]
        );
        assert_eq!(parse_tag_names("Rust, rust,  Go"), vec!["go", "rust"]);
        assert_eq!(parse_tag_names("Go, go GO"), vec!["go"]);
        assert!(parse_tag_names("").is_empty());
        assert!(parse_tag_names(" , ,,\n").is_empty());
    }

    #[test]
    fn test_parse_tag_names_is_idempotent() {
        let once = parse_tag_names("B, a  A,c");
        let twice = parse_tag_names(&once.join(", "));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/Article/Create")), Some("/Article/Create"));
        assert_eq!(safe_next(Some("//evil.example")), None);
        assert_eq!(safe_next(Some("https://evil.example")), None);
        assert_eq!(safe_next(Some("/\\evil.example")), None);
        assert_eq!(safe_next(None), None);
    }

    #[test]
    fn test_login_url_encodes_next() {
        assert_eq!(
            login_url("/Article/Edit/3?x=1"),
            "/Account/Login?next=%2FArticle%2FEdit%2F3%3Fx%3D1"
        );
    }

    #[test]
    fn test_field_errors() {
        let mut errors = ValidationErrors::new();
        add_error(&mut errors, "name", "Name is taken.");
        let messages = field_errors(&errors);
        assert_eq!(messages.get("name").map(String::as_str), Some("Name is taken."));
        assert_eq!(messages.len(), 1);
    }
}
