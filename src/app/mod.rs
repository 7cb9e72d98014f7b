//! Application Layer
//!
//! The session that ties the bridge channel, the cloud gateway and client
//! state together.

pub mod session;

pub use session::{Session, View};
