pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod governor;
pub mod history;
pub mod market;
pub mod store;
pub mod utils;

pub use error::{AppError, Result};
