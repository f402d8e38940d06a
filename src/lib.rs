pub mod app_state;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

pub use app_state::AppState;
pub use config::Config;
pub use error::{Result, TradeError};
