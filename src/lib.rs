#![forbid(unsafe_code)]

pub mod config;
pub mod discord;
pub mod errors;
pub mod feed;
pub mod inventory;
pub mod models;
pub mod relay;
pub mod scheduler;
pub mod uploader;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
