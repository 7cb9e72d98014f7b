//! PLC Pulse Client Library
//!
//! Core of a real-time coil monitoring client. A bridge server talks Modbus
//! to the field device and relays coil samples over an event channel; this
//! crate tracks the device connection, records the samples, mirrors them to a
//! cloud realtime store, and keeps reusable device profiles there.

pub mod app;
pub mod constants;
pub mod domain;
pub mod error;
pub mod eventing;
pub mod helpers;
pub mod services;
pub mod state;
pub mod utils;
