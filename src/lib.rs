pub mod config;
pub mod core;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

// Re-export commonly used items for convenience
pub use config::{ConfigError, ServerConfig};
pub use crate::core::*;
pub use errors::app_error::{AppError, AppResult};
pub use state::AppState;
