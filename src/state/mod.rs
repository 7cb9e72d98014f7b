//! State - Session State Modules
//!
//! Plain state owned by the session, each mutated only through its own
//! methods.

pub mod config_state;
pub mod connection_state;
pub mod data_state;
pub mod log_state;
