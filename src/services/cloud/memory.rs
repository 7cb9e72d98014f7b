//! In-Process Store
//!
//! A `RemoteStore` kept in memory. The binary uses it when cloud sync is
//! disabled so profiles can still be saved for the session; tests use its
//! reachability toggle and write-failure switch.

use super::store::{RemoteStore, Snapshot};
use crate::error::{Error, Result};
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::watch;

#[derive(Default)]
struct Tree {
    /// Leaf values keyed by full path
    leaves: BTreeMap<String, Value>,
    watchers: Vec<(String, watch::Sender<Snapshot>)>,
}

impl Tree {
    fn snapshot(&self, path: &str) -> Snapshot {
        if let Some(value) = self.leaves.get(path) {
            return Some(value.clone());
        }

        let prefix = format!("{}/", path);
        let mut root = Map::new();
        for (key, value) in self.leaves.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            insert_nested(&mut root, rest, value.clone());
        }

        if root.is_empty() {
            None
        } else {
            Some(Value::Object(root))
        }
    }
}

fn insert_nested(node: &mut Map<String, Value>, rest: &str, value: Value) {
    match rest.split_once('/') {
        None => {
            node.insert(rest.to_string(), value);
        }
        Some((head, tail)) => {
            let child = node
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(map) = child {
                insert_nested(map, tail, value);
            }
        }
    }
}

fn overlaps(a: &str, b: &str) -> bool {
    a == b || a.starts_with(&format!("{}/", b)) || b.starts_with(&format!("{}/", a))
}

struct Shared {
    tree: Mutex<Tree>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
    reachable: watch::Sender<bool>,
}

/// In-memory realtime store
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (reachable, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                tree: Mutex::new(Tree::default()),
                fail_writes: AtomicBool::new(false),
                writes: AtomicUsize::new(0),
                reachable,
            }),
        }
    }

    /// Make every following write fail
    pub fn fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.shared.reachable.send_replace(reachable);
    }

    /// Read a path synchronously
    pub fn get(&self, path: &str) -> Snapshot {
        self.shared.tree.lock().snapshot(path)
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.shared.writes.load(Ordering::SeqCst)
    }

    fn write(&self, path: &str, value: Value) -> Result<()> {
        if self.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Write {
                path: path.to_string(),
                message: "write rejected".to_string(),
            });
        }

        let mut tree = self.shared.tree.lock();
        let nested = format!("{}/", path);
        tree.leaves.retain(|key, _| !key.starts_with(&nested));
        tree.leaves.insert(path.to_string(), value);
        self.shared.writes.fetch_add(1, Ordering::SeqCst);

        let tree = &mut *tree;
        tree.watchers.retain(|(_, tx)| !tx.is_closed());
        for (watched, tx) in &tree.watchers {
            if overlaps(watched, path) {
                tx.send_replace(tree.snapshot(watched));
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MemoryStore {
    fn connect(&self) -> Result<()> {
        tracing::info!("Using in-process store");
        Ok(())
    }

    fn set(&self, path: &str, value: Value) -> BoxFuture<'static, Result<()>> {
        future::ready(self.write(path, value)).boxed()
    }

    fn watch(&self, path: &str) -> watch::Receiver<Snapshot> {
        let mut tree = self.shared.tree.lock();
        let (tx, rx) = watch::channel(tree.snapshot(path));
        tree.watchers.push((path.to_string(), tx));
        rx
    }

    fn reachability(&self) -> watch::Receiver<bool> {
        self.shared.reachable.subscribe()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("leaves", &self.shared.tree.lock().leaves.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subtree_snapshot() {
        let store = MemoryStore::new();
        store.set("plcConfigs/a", json!({"n": 1})).await.expect("write");
        store.set("plcConfigs/b", json!({"n": 2})).await.expect("write");
        store.set("plcData/latest", json!(true)).await.expect("write");

        assert_eq!(
            store.get("plcConfigs"),
            Some(json!({"a": {"n": 1}, "b": {"n": 2}}))
        );
        assert_eq!(store.get("plcData"), Some(json!({"latest": true})));
        assert_eq!(store.get("missing"), None);
    }

    #[tokio::test]
    async fn test_watch_sees_child_writes() {
        let store = MemoryStore::new();
        let mut rx = store.watch("plcConfigs");
        assert!(rx.borrow_and_update().is_none());

        store.set("plcConfigs/a", json!(1)).await.expect("write");
        rx.changed().await.expect("changed");
        assert_eq!(*rx.borrow(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_failed_write_changes_nothing() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        assert!(store.set("plcData/latest", json!(1)).await.is_err());
        assert_eq!(store.get("plcData/latest"), None);
        assert_eq!(store.write_count(), 0);
    }
}
