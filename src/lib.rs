mod app;
mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod listing;
mod models;
mod notify;
mod policy;
mod utils;

pub use app::App;
pub use error::Error;
