//! AppEvent - Application Event Enum
//!
//! Everything that reaches the session from the outside world: bridge channel
//! callbacks, cloud gateway pushes, and user-facing notices raised by services.
//! Events are queued on a single unbounded channel and applied one at a time.

use tokio::sync::mpsc;

use crate::domain::profile::DeviceProfile;
use crate::domain::sample::Sample;
use crate::state::connection_state::ConnectionStatus;
use crate::state::log_state::{Notice, NoticeLevel};

/// Sending half of the session event queue
pub type AppEventSender = mpsc::UnboundedSender<AppEvent>;

/// Receiving half of the session event queue
pub type AppEventReceiver = mpsc::UnboundedReceiver<AppEvent>;

/// Application events for service -> session communication
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The bridge channel opened (`connect`)
    ChannelOpened,

    /// The bridge channel dropped (`disconnect`)
    ChannelClosed,

    /// Device link status reported by the bridge (`plc_connection_status`)
    DeviceStatus(ConnectionStatus),

    /// Coil sample relayed by the bridge (`plc_data`)
    Data(Sample),

    /// Error pushed by the bridge (`error`)
    RemoteError(String),

    /// Cloud datastore reachability changed
    CloudReachability(bool),

    /// Fresh snapshot of the saved profile set, newest first
    SavedProfiles(Vec<DeviceProfile>),

    /// Outcome of an in-flight profile save
    ProfileSaved(Result<DeviceProfile, String>),

    /// User-visible notification
    Notice(Notice),
}

impl AppEvent {
    /// Create a notice event with current timestamp
    pub fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self::Notice(Notice::new(level, message))
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::notice(NoticeLevel::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::notice(NoticeLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::notice(NoticeLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::notice(NoticeLevel::Error, message)
    }
}

/// Create the session event queue
pub fn event_queue() -> (AppEventSender, AppEventReceiver) {
    mpsc::unbounded_channel()
}
