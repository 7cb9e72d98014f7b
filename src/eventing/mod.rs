//! Eventing - Session Event Queue

pub mod app_event;

pub use app_event::*;
