//! Utils - Local Persistence

pub mod config_store;

pub use config_store::{load_config, save_config};
