//! Admin HTTP API: schedule CRUD, manual runs and scheduler status.

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use {
    error::ApiError,
    server::{build_app, serve, shutdown_signal, start_server},
    state::AppState,
};
