//! Realtime Database over REST
//!
//! Talks to a Firebase-style realtime database through its REST surface:
//! `PUT {base}/{path}.json` writes, `GET {base}/{path}.json` reads. There is
//! no push channel on this surface, so reachability is probed and watched
//! paths are polled; a successful local write triggers an immediate re-poll.

use super::store::{RemoteStore, Snapshot};
use crate::constants::CLOUD_REQUEST_TIMEOUT_SECS;
use crate::domain::config::CloudConfig;
use crate::error::{Error, Result};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

#[derive(Clone)]
struct Endpoint {
    client: reqwest::Client,
    base: String,
    auth_token: Option<String>,
}

impl Endpoint {
    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base, path.trim_matches('/'))
    }

    /// Request for `path` with the auth token as an encoded query parameter
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.request(method, self.url(path));
        match &self.auth_token {
            Some(token) => request.query(&[("auth", token)]),
            None => request,
        }
    }

    async fn put(&self, path: &str, value: &Value) -> Result<()> {
        let response = self
            .request(reqwest::Method::PUT, path)
            .json(value)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Write {
                path: path.to_string(),
                message: status.to_string(),
            });
        }
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Snapshot> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await?
            .error_for_status()?;
        let value: Value = response.json().await?;
        Ok((!value.is_null()).then_some(value))
    }

    /// Shallow read of the root; any HTTP answer below 500 means reachable
    async fn probe(&self) -> bool {
        let request = self
            .request(reqwest::Method::GET, "")
            .query(&[("shallow", "true")]);
        match request.send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(e) => {
                tracing::debug!("Cloud probe failed: {}", e);
                false
            }
        }
    }
}

/// REST-backed realtime store
pub struct RestStore {
    endpoint: Endpoint,
    probe_interval: Duration,
    poll_interval: Duration,
    reachable: Arc<watch::Sender<bool>>,
    refresh: Arc<Notify>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RestStore {
    pub fn new(config: &CloudConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(CLOUD_REQUEST_TIMEOUT_SECS))
            .build()?;
        let (reachable, _) = watch::channel(false);

        Ok(Self {
            endpoint: Endpoint {
                client,
                base: config.database_url.trim_end_matches('/').to_string(),
                auth_token: config.auth_token.clone(),
            },
            probe_interval: Duration::from_millis(config.probe_interval_ms.max(100)),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(100)),
            reachable: Arc::new(reachable),
            refresh: Arc::new(Notify::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }
}

impl RemoteStore for RestStore {
    fn connect(&self) -> Result<()> {
        tracing::info!("Connecting to realtime database at {}", self.endpoint.base);

        let endpoint = self.endpoint.clone();
        let reachable = self.reachable.clone();
        let interval = self.probe_interval;
        self.track(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let up = endpoint.probe().await;
                reachable.send_if_modified(|current| {
                    let changed = *current != up;
                    *current = up;
                    changed
                });
            }
        }));
        Ok(())
    }

    fn set(&self, path: &str, value: Value) -> BoxFuture<'static, Result<()>> {
        let endpoint = self.endpoint.clone();
        let refresh = self.refresh.clone();
        let path = path.to_string();
        async move {
            endpoint.put(&path, &value).await?;
            refresh.notify_waiters();
            Ok(())
        }
        .boxed()
    }

    fn watch(&self, path: &str) -> watch::Receiver<Snapshot> {
        let (tx, rx) = watch::channel(None);
        let endpoint = self.endpoint.clone();
        let refresh = self.refresh.clone();
        let interval = self.poll_interval;
        let path = path.to_string();

        self.track(tokio::spawn(async move {
            loop {
                match endpoint.get(&path).await {
                    Ok(snapshot) => {
                        tx.send_if_modified(|current| {
                            let changed = *current != snapshot;
                            *current = snapshot;
                            changed
                        });
                    }
                    Err(e) => tracing::debug!("Polling {} failed: {}", path, e),
                }
                if tx.is_closed() {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = refresh.notified() => {}
                    _ = tx.closed() => break,
                }
            }
        }));
        rx
    }

    fn reachability(&self) -> watch::Receiver<bool> {
        self.reachable.subscribe()
    }
}

impl Drop for RestStore {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore")
            .field("base", &self.endpoint.base)
            .field("reachable", &*self.reachable.borrow())
            .finish()
    }
}
