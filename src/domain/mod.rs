//! Domain - Pure Data Structures and Wire Types

pub mod config;
pub mod profile;
pub mod sample;
