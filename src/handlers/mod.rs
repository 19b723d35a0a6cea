mod account;
mod articles;
mod categories;
mod tags;
mod users;

pub use account::*;
pub use articles::*;
pub use categories::*;
pub use tags::*;
pub use users::*;

use crate::Error;

pub async fn handler_404() -> Error {
    Error::NotFound("page")
}

// The id-less variants of the `/{Resource}/{Action}/:id` routes.
pub async fn handler_missing_id() -> Error {
    Error::BadRequest("missing id")
}

pub async fn handler_ping() -> &'static str {
    "pong"
}
