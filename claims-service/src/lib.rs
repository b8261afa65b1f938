pub mod app;
pub mod auth;
pub mod config;
pub mod handlers;

pub use app::{build_router, AppState};
