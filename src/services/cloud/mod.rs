//! Cloud Sync Gateway
//!
//! Mirrors live samples into a remote realtime store, persists device
//! profiles, and reports the store's reachability. Its lifecycle is
//! independent of the bridge channel: either can be up while the other is
//! down.
//!
//! ## Data layout
//!
//! ```text
//! plcData/latest               last sample (overwritten)
//! plcData/history/{epochMs}    every sample (append-only)
//! plcConfigs/{id}              one record per saved profile
//! ```

mod memory;
mod rest;
mod store;

pub use memory::MemoryStore;
pub use rest::RestStore;
pub use store::{RemoteStore, Snapshot};

use crate::constants::{PATH_CONFIGS, PATH_HISTORY, PATH_LATEST, PROFILE_ID_PREFIX};
use crate::domain::profile::DeviceProfile;
use crate::domain::sample::Sample;
use crate::error::{Error, Result};
use crate::eventing::{AppEvent, AppEventSender};
use crate::services::subscription::Subscription;
use crate::state::data_state::SampleMirror;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

type StatusListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Reachability flag plus the listeners following it
#[derive(Default)]
struct StatusHub {
    connected: AtomicBool,
    listeners: Mutex<Vec<(u64, StatusListener)>>,
    next_id: AtomicU64,
}

impl StatusHub {
    /// Store and broadcast under the listener lock so a listener being added
    /// concurrently sees either the old value then this one, or just this one.
    fn set(&self, connected: bool) {
        let listeners = self.listeners.lock();
        self.connected.store(connected, Ordering::SeqCst);
        tracing::info!(
            "Cloud connection state: {}",
            if connected { "connected" } else { "disconnected" }
        );

        for (_, listener) in listeners.iter() {
            listener(connected);
        }
    }
}

/// Background work started by `initialize`
struct Running {
    uploads: mpsc::UnboundedSender<Sample>,
    monitor: JoinHandle<()>,
    uploader: JoinHandle<()>,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.monitor.abort();
        self.uploader.abort();
    }
}

/// Gateway to the cloud datastore. Clones share the same connection.
#[derive(Clone)]
pub struct CloudGateway {
    store: Arc<dyn RemoteStore>,
    notices: Option<AppEventSender>,
    status: Arc<StatusHub>,
    running: Arc<Mutex<Option<Running>>>,
}

impl CloudGateway {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            notices: None,
            status: Arc::new(StatusHub::default()),
            running: Arc::new(Mutex::new(None)),
        }
    }

    /// Raise user-visible notices (upload failures) on this queue
    pub fn with_notices(mut self, notices: AppEventSender) -> Self {
        self.notices = Some(notices);
        self
    }

    /// Connect to the store and start following its reachability.
    /// A second call is a no-op. Must run inside a tokio runtime.
    pub fn initialize(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }

        if let Err(e) = self.store.connect() {
            tracing::error!("Cloud initialization error: {}", e);
            self.notify(AppEvent::error("Failed to initialize cloud storage"));
            return Err(e);
        }

        let (upload_tx, upload_rx) = mpsc::unbounded_channel();
        let monitor = tokio::spawn(follow_reachability(
            self.store.reachability(),
            self.status.clone(),
        ));
        let uploader = tokio::spawn(upload_worker(
            upload_rx,
            self.store.clone(),
            self.notices.clone(),
        ));

        *running = Some(Running {
            uploads: upload_tx,
            monitor,
            uploader,
        });
        tracing::info!("Cloud gateway initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Last known reachability of the store
    pub fn connection_status(&self) -> bool {
        self.status.connected.load(Ordering::SeqCst)
    }

    /// Follow reachability; `listener` is called right away with the current
    /// value, then on every change until the handle is released.
    ///
    /// Listeners run with the listener list locked and must not call back
    /// into the gateway's listener methods.
    pub fn add_connection_status_listener(
        &self,
        listener: impl Fn(bool) + Send + Sync + 'static,
    ) -> Subscription {
        let listener: StatusListener = Arc::new(listener);
        let id = self.status.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut listeners = self.status.listeners.lock();
            listener(self.connection_status());
            listeners.push((id, listener));
        }

        let status = Arc::downgrade(&self.status);
        Subscription::new(move || {
            if let Some(status) = status.upgrade() {
                status.listeners.lock().retain(|(other, _)| *other != id);
            }
        })
    }

    // ==================== Samples ====================

    /// Queue a sample for mirroring to `plcData/latest` and the history
    /// archive. Never blocks; failures are logged and raised as notices.
    pub fn upload_sample(&self, sample: &Sample) {
        let running = self.running.lock();
        let Some(running) = running.as_ref() else {
            tracing::warn!("Cloud gateway not initialized, skipping data upload");
            return;
        };

        if running.uploads.send(sample.clone()).is_err() {
            tracing::warn!("Cloud upload worker stopped, sample dropped");
        }
    }

    /// Follow `plcData/latest`
    pub fn subscribe_to_latest_data(
        &self,
        mut callback: impl FnMut(Sample) + Send + 'static,
    ) -> Subscription {
        if !self.is_initialized() {
            tracing::warn!("Cloud gateway not initialized, cannot subscribe");
            return Subscription::noop();
        }

        self.follow(PATH_LATEST, move |snapshot| {
            let Some(value) = snapshot else {
                return;
            };
            match serde_json::from_value::<Sample>(value) {
                Ok(sample) => callback(sample),
                Err(e) => tracing::warn!("Ignoring malformed latest sample: {}", e),
            }
        })
    }

    // ==================== Profiles ====================

    /// Give a profile its persisted identity: an id of `config_{epochMs}` and
    /// a creation time, each only if missing.
    pub fn stamp_profile(&self, mut profile: DeviceProfile) -> DeviceProfile {
        let now = Utc::now().timestamp_millis();
        profile
            .id
            .get_or_insert_with(|| format!("{}{}", PROFILE_ID_PREFIX, now));
        profile.created_at.get_or_insert(now);
        profile
    }

    /// Write a profile to `plcConfigs/{id}` and resolve with its id.
    /// Saving a profile that already has an id overwrites that record.
    pub async fn save_profile(&self, profile: DeviceProfile) -> Result<String> {
        if !self.is_initialized() {
            tracing::warn!("Cloud gateway not initialized, skipping config save");
            return Err(Error::GatewayUninitialized);
        }

        let profile = self.stamp_profile(profile);
        let id = profile.id.clone().unwrap_or_default();
        let value = serde_json::to_value(&profile)?;

        match self.store.set(&format!("{}/{}", PATH_CONFIGS, id), value).await {
            Ok(()) => {
                tracing::info!("PLC configuration {} saved", id);
                Ok(id)
            }
            Err(e) => {
                tracing::error!("Error saving PLC config {}: {}", id, e);
                Err(e)
            }
        }
    }

    /// Follow the saved profile set. `callback` receives the full set, newest
    /// first, now and after every change.
    pub fn stream_saved_profiles(
        &self,
        mut callback: impl FnMut(Vec<DeviceProfile>) + Send + 'static,
    ) -> Subscription {
        if !self.is_initialized() {
            tracing::warn!("Cloud gateway not initialized, cannot get saved configs");
            return Subscription::noop();
        }

        self.follow(PATH_CONFIGS, move |snapshot| {
            callback(materialize_profiles(snapshot));
        })
    }

    fn follow(
        &self,
        path: &str,
        mut on_snapshot: impl FnMut(Snapshot) + Send + 'static,
    ) -> Subscription {
        let mut rx = self.store.watch(path);
        let task = tokio::spawn(async move {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                on_snapshot(snapshot);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
        Subscription::new(move || task.abort())
    }

    fn notify(&self, event: AppEvent) {
        if let Some(tx) = &self.notices {
            let _ = tx.send(event);
        }
    }
}

impl SampleMirror for CloudGateway {
    fn upload_sample(&self, sample: &Sample) {
        CloudGateway::upload_sample(self, sample);
    }
}

impl std::fmt::Debug for CloudGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudGateway")
            .field("initialized", &self.is_initialized())
            .field("connected", &self.connection_status())
            .finish()
    }
}

/// Turn a `plcConfigs` snapshot into profiles sorted by `createdAt`, newest first
pub fn materialize_profiles(snapshot: Snapshot) -> Vec<DeviceProfile> {
    let Some(Value::Object(records)) = snapshot else {
        return Vec::new();
    };

    let mut profiles: Vec<DeviceProfile> = records
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value(value) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!("Skipping unreadable profile {}: {}", key, e);
                None
            }
        })
        .collect();
    profiles.sort_by(|a, b| b.created_at.unwrap_or(0).cmp(&a.created_at.unwrap_or(0)));
    profiles
}

async fn follow_reachability(mut rx: watch::Receiver<bool>, status: Arc<StatusHub>) {
    loop {
        let connected = *rx.borrow_and_update();
        status.set(connected);
        if rx.changed().await.is_err() {
            break;
        }
    }
}

async fn upload_worker(
    mut samples: mpsc::UnboundedReceiver<Sample>,
    store: Arc<dyn RemoteStore>,
    notices: Option<AppEventSender>,
) {
    while let Some(sample) = samples.recv().await {
        let value = match serde_json::to_value(&sample) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to encode sample: {}", e);
                continue;
            }
        };
        let history_path = format!("{}/{}", PATH_HISTORY, Utc::now().timestamp_millis());

        let latest = store.set(PATH_LATEST, value.clone());
        let history = store.set(&history_path, value);
        match futures::future::try_join(latest, history).await {
            Ok(_) => tracing::debug!("Data uploaded to cloud: {}", sample),
            Err(e) => {
                tracing::error!("Cloud upload error: {}", e);
                if let Some(tx) = &notices {
                    let _ = tx.send(AppEvent::error("Failed to upload data to cloud"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventing::event_queue;
    use crate::state::log_state::NoticeLevel;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    fn gateway() -> (CloudGateway, MemoryStore) {
        let store = MemoryStore::new();
        (CloudGateway::new(Arc::new(store.clone())), store)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_uninitialized_operations() {
        let (gateway, store) = gateway();

        gateway.upload_sample(&Sample::new("T1", true));
        assert_eq!(store.write_count(), 0);

        let err = gateway
            .save_profile(DeviceProfile::default())
            .await
            .expect_err("must reject");
        assert!(matches!(err, Error::GatewayUninitialized));

        assert!(gateway.stream_saved_profiles(|_| {}).is_noop());
        assert!(gateway.subscribe_to_latest_data(|_| {}).is_noop());
    }

    #[tokio::test]
    async fn test_upload_writes_latest_and_history() {
        let (gateway, store) = gateway();
        gateway.initialize().expect("init");

        gateway.upload_sample(&Sample::new("T1", true));
        settle().await;

        assert_eq!(
            store.get(PATH_LATEST),
            Some(json!({"timestamp": "T1", "value": true}))
        );
        let history = store.get(PATH_HISTORY).expect("history");
        assert_eq!(history.as_object().map(|m| m.len()), Some(1));
    }

    #[tokio::test]
    async fn test_upload_failure_raises_notice() {
        let store = MemoryStore::new();
        let (tx, mut rx) = event_queue();
        let gateway = CloudGateway::new(Arc::new(store.clone())).with_notices(tx);
        gateway.initialize().expect("init");
        store.fail_writes(true);

        gateway.upload_sample(&Sample::new("T1", false));

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("notice in time")
            .expect("queue open");
        assert!(matches!(event, AppEvent::Notice(n) if n.level == NoticeLevel::Error));
    }

    #[tokio::test]
    async fn test_save_profile_stamps_and_overwrites() {
        let (gateway, store) = gateway();
        gateway.initialize().expect("init");

        let id = gateway
            .save_profile(DeviceProfile::default())
            .await
            .expect("saved");
        assert!(id.starts_with(PROFILE_ID_PREFIX));

        let record: DeviceProfile =
            serde_json::from_value(store.get(&format!("{}/{}", PATH_CONFIGS, id)).expect("record"))
                .expect("profile");
        assert_eq!(record.id.as_deref(), Some(id.as_str()));
        let created_at = record.created_at.expect("createdAt");

        let mut edited = record.clone();
        edited.coil_address = 9;
        let again = gateway.save_profile(edited).await.expect("saved");
        assert_eq!(again, id);

        let all = store.get(PATH_CONFIGS).expect("configs");
        assert_eq!(all.as_object().map(|m| m.len()), Some(1));
        assert_eq!(all[id.as_str()]["coilAddress"], json!(9));
        assert_eq!(all[id.as_str()]["createdAt"], json!(created_at));
    }

    #[tokio::test]
    async fn test_save_profile_write_failure() {
        let (gateway, store) = gateway();
        gateway.initialize().expect("init");
        store.fail_writes(true);

        let err = gateway
            .save_profile(DeviceProfile::default())
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::Write { .. }));
    }

    #[tokio::test]
    async fn test_saved_profiles_newest_first() {
        let (gateway, _store) = gateway();
        gateway.initialize().expect("init");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = gateway.stream_saved_profiles(move |profiles| {
            let _ = tx.send(profiles);
        });
        assert!(rx.recv().await.expect("initial").is_empty());

        let mut older = DeviceProfile::tcp("10.0.0.1", 502);
        older.id = Some("config_old".into());
        older.created_at = Some(1_000);
        gateway.save_profile(older).await.expect("saved");
        let snapshot = rx.recv().await.expect("update");
        assert_eq!(snapshot.len(), 1);

        let mut newer = DeviceProfile::tcp("10.0.0.2", 502);
        newer.id = Some("config_new".into());
        newer.created_at = Some(2_000);
        gateway.save_profile(newer).await.expect("saved");
        let snapshot = rx.recv().await.expect("update");

        let ids: Vec<_> = snapshot.iter().filter_map(|p| p.id.as_deref()).collect();
        assert_eq!(ids, vec!["config_new", "config_old"]);
    }

    #[tokio::test]
    async fn test_late_listener_gets_current_value() {
        let (gateway, store) = gateway();
        gateway.initialize().expect("init");
        settle().await;
        assert!(gateway.connection_status());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = gateway.add_connection_status_listener(move |up| sink.lock().push(up));
        assert_eq!(*seen.lock(), vec![true]);

        store.set_reachable(false);
        settle().await;
        assert_eq!(*seen.lock(), vec![true, false]);

        subscription.unsubscribe();
        store.set_reachable(true);
        settle().await;
        assert_eq!(*seen.lock(), vec![true, false]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_listeners_converge_while_status_flips() {
        let (gateway, store) = gateway();
        gateway.initialize().expect("init");

        let flipper = tokio::spawn({
            let store = store.clone();
            async move {
                for i in 0..200 {
                    store.set_reachable(i % 2 == 1);
                    tokio::task::yield_now().await;
                }
            }
        });

        let mut lasts = Vec::new();
        let mut subscriptions = Vec::new();
        for _ in 0..50 {
            let last = Arc::new(Mutex::new(None));
            let sink = last.clone();
            subscriptions.push(gateway.add_connection_status_listener(move |up| {
                *sink.lock() = Some(up);
            }));
            lasts.push(last);
            tokio::task::yield_now().await;
        }

        flipper.await.expect("flipper");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let current = gateway.connection_status();
        assert!(current);
        for last in &lasts {
            assert_eq!(*last.lock(), Some(current));
        }
    }

    #[test]
    fn test_materialize_skips_bad_records() {
        let snapshot = Some(json!({
            "config_1": {"modbusType": "tcp", "ipAddress": "a", "port": 1,
                         "coilAddress": 0, "unitId": 1, "enableLogging": true, "createdAt": 5},
            "junk": {"hello": "world"},
            "config_2": {"modbusType": "tcp", "ipAddress": "b", "port": 1,
                         "coilAddress": 0, "unitId": 1, "enableLogging": true, "createdAt": 9}
        }));
        let profiles = materialize_profiles(snapshot);
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].created_at, Some(9));
        assert!(materialize_profiles(None).is_empty());
    }
}
