//! Remote Keyed Store
//!
//! The realtime datastore behind the cloud gateway, addressed by
//! slash-separated paths ("plcConfigs/config_1700000000000"). A watched path
//! yields the whole subtree as one JSON value, or `None` when empty.

use crate::error::Result;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::watch;

/// Current contents of a watched path
pub type Snapshot = Option<Value>;

pub trait RemoteStore: Send + Sync {
    /// Open the connection and start any background monitoring.
    /// Must run inside a tokio runtime.
    fn connect(&self) -> Result<()>;

    /// Overwrite the value at `path`
    fn set(&self, path: &str, value: Value) -> BoxFuture<'static, Result<()>>;

    /// Follow a path; the receiver starts with the current snapshot
    fn watch(&self, path: &str) -> watch::Receiver<Snapshot>;

    /// Follow the store's own reachability flag
    fn reachability(&self) -> watch::Receiver<bool>;
}
