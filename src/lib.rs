pub mod clock;
pub mod config;
pub mod error;
pub mod host;
pub mod plugin;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod web;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
