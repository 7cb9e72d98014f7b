//! Session
//!
//! Owns both connections and all client state, and applies every event on one
//! queue. Channel callbacks, cloud pushes and save outcomes all land on that
//! queue; user commands run directly on the session. Nothing else writes to
//! the state.
//!
//! ```text
//! TransportChannel ──┐
//! CloudGateway ──────┼──► AppEvent queue ──► Session::handle ──► state
//! save task ─────────┘
//! ```

use std::sync::Arc;

use crate::constants::NOTIFICATION_LOG_CAPACITY;
use crate::domain::profile::DeviceProfile;
use crate::error::Result;
use crate::eventing::{AppEvent, AppEventReceiver, AppEventSender, event_queue};
use crate::services::cloud::{CloudGateway, RemoteStore};
use crate::services::subscription::Subscription;
use crate::services::transport::{ChannelConnector, TransportChannel};
use crate::state::config_state::ConfigState;
use crate::state::connection_state::{
    ConnectionMachine, ConnectionStatus, DisconnectCause, Effect,
};
use crate::state::data_state::DataState;
use crate::state::log_state::{Notice, NoticeLevel, NotificationLog};

/// Which screen the presentation layer should show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    /// Profile entry and saved profiles
    #[default]
    Setup,
    /// Live value, chart and statistics
    Monitor,
}

/// One client session
pub struct Session {
    transport: TransportChannel,
    gateway: CloudGateway,

    machine: ConnectionMachine,
    data: DataState,
    config: ConfigState,
    notices: NotificationLog,
    view: View,

    tx: AppEventSender,
    rx: AppEventReceiver,

    reachability: Option<Subscription>,
    saved_profiles: Option<Subscription>,
}

impl Session {
    pub fn new(connector: Arc<dyn ChannelConnector>, store: Arc<dyn RemoteStore>) -> Self {
        let (tx, rx) = event_queue();
        let gateway = CloudGateway::new(store).with_notices(tx.clone());

        Self {
            transport: TransportChannel::new(connector),
            gateway,
            machine: ConnectionMachine::new(),
            data: DataState::new(),
            config: ConfigState::new(),
            notices: NotificationLog::new(NOTIFICATION_LOG_CAPACITY),
            view: View::default(),
            tx,
            rx,
            reachability: None,
            saved_profiles: None,
        }
    }

    /// Open the bridge channel and the cloud connection.
    /// Must run inside a tokio runtime.
    pub fn start(&mut self, endpoint: &str) {
        tracing::info!("Starting session");
        self.transport.initialize(endpoint, Arc::new(self.tx.clone()));

        if self.gateway.initialize().is_err() {
            // The gateway already raised a notice; the session runs without cloud.
            return;
        }

        if self.reachability.is_none() {
            let tx = self.tx.clone();
            self.reachability = Some(self.gateway.add_connection_status_listener(move |up| {
                let _ = tx.send(AppEvent::CloudReachability(up));
            }));
        }
    }

    /// Tear down both connections and every subscription
    pub fn shutdown(&mut self) {
        tracing::info!("Shutting down session");
        self.saved_profiles = None;
        self.reachability = None;
        self.transport.disconnect();
    }

    // ==================== User Commands ====================

    /// Adopt `profile` and ask the bridge to open the device link
    pub fn connect(&mut self, profile: DeviceProfile) -> Result<()> {
        let profile = match self.config.activate(profile) {
            Ok(profile) => profile.clone(),
            Err(e) => {
                self.notify(NoticeLevel::Error, e.to_string());
                return Err(e);
            }
        };

        if let Err(e) = self.transport.connect_to_plc(&profile) {
            self.notify(NoticeLevel::Error, format!("Failed to connect: {}", e));
            return Err(e);
        }

        let effects = self.machine.connect_forwarded();
        self.apply(effects);
        Ok(())
    }

    /// Ask the bridge to close the device link
    pub fn disconnect(&mut self) {
        self.transport.disconnect_from_plc();
        let effects = self.machine.disconnect_requested();
        self.apply(effects);
    }

    /// Persist the active profile. The outcome arrives later as
    /// `AppEvent::ProfileSaved`.
    pub fn save_active_profile(&mut self) -> Result<()> {
        let profile = match self.config.begin_save() {
            Ok(profile) => self.gateway.stamp_profile(profile),
            Err(e) => {
                self.notify(NoticeLevel::Warn, e.to_string());
                return Err(e);
            }
        };

        let gateway = self.gateway.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = gateway
                .save_profile(profile.clone())
                .await
                .map(|_| profile)
                .map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::ProfileSaved(outcome));
        });
        Ok(())
    }

    // ==================== Event Loop ====================

    /// Wait for the next queued event without applying it
    pub async fn next_event(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }

    /// Apply every event already queued; returns how many were applied
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.handle(event);
            applied += 1;
        }
        applied
    }

    /// Apply one event to the session state
    pub fn handle(&mut self, event: AppEvent) {
        match event {
            AppEvent::ChannelOpened => {
                self.machine.channel_opened();
                self.notify(NoticeLevel::Success, "Connected to server");
            }
            AppEvent::ChannelClosed => {
                let effects = self.machine.channel_closed();
                self.apply(effects);
            }
            AppEvent::DeviceStatus(status) => {
                let effects = self.machine.status_reported(status);
                self.apply(effects);
            }
            AppEvent::Data(sample) => {
                self.data.ingest(sample, &self.gateway);
            }
            AppEvent::RemoteError(message) => {
                self.notify(NoticeLevel::Error, format!("Error: {}", message));
            }
            AppEvent::CloudReachability(up) => {
                self.cloud_reachability_changed(up);
            }
            AppEvent::SavedProfiles(profiles) => {
                tracing::debug!("{} saved profiles", profiles.len());
                self.config.replace_saved(profiles);
            }
            AppEvent::ProfileSaved(outcome) => {
                self.config.finish_save(&outcome);
                match outcome {
                    Ok(_) => self.notify(NoticeLevel::Success, "PLC configuration saved to cloud"),
                    Err(e) => self.notify(
                        NoticeLevel::Error,
                        format!("Failed to save PLC configuration: {}", e),
                    ),
                }
            }
            AppEvent::Notice(notice) => self.notices.push(notice),
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Connecting => self.notify(NoticeLevel::Info, "Connecting to PLC..."),
                Effect::Connected => {
                    self.view = View::Monitor;
                    self.notify(NoticeLevel::Success, "PLC Connected");
                }
                Effect::Disconnected(DisconnectCause::ChannelLost) => {
                    self.notify(NoticeLevel::Error, "Disconnected from server")
                }
                Effect::Disconnected(DisconnectCause::DeviceDisconnected) => {
                    self.notify(NoticeLevel::Error, "PLC Disconnected")
                }
                Effect::Disconnected(DisconnectCause::UserRequested) => {
                    self.notify(NoticeLevel::Info, "Disconnected from PLC")
                }
            }
        }
    }

    /// Follow the saved set only while the store is reachable
    fn cloud_reachability_changed(&mut self, up: bool) {
        self.config.set_cloud_reachable(up);

        if !up {
            self.saved_profiles = None;
            return;
        }
        if self.saved_profiles.is_none() {
            let tx = self.tx.clone();
            self.saved_profiles = Some(self.gateway.stream_saved_profiles(move |profiles| {
                let _ = tx.send(AppEvent::SavedProfiles(profiles));
            }));
        }
    }

    fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.notices.push(Notice::new(level, message));
    }

    // ==================== Queries ====================

    pub fn status(&self) -> ConnectionStatus {
        self.machine.status()
    }

    pub fn machine(&self) -> &ConnectionMachine {
        &self.machine
    }

    pub fn data(&self) -> &DataState {
        &self.data
    }

    pub fn config(&self) -> &ConfigState {
        &self.config
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn notices(&self) -> &NotificationLog {
        &self.notices
    }

    /// Notices raised since the last call
    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.take_unseen()
    }

    pub fn gateway(&self) -> &CloudGateway {
        &self.gateway
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.machine.status())
            .field("view", &self.view)
            .field("samples", &self.data.history().len())
            .field("cloud", &self.config.cloud_reachable())
            .finish()
    }
}
