pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod mailing;
pub mod models;
pub mod service;
pub mod sessions;
pub mod state;

pub use errors::AppError;
pub use service::{get_router, shutdown_signal, StubWebsite, WebsiteService};
pub use state::{SharedState, WebsiteState};
