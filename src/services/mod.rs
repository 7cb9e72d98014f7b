//! Service Layer
//!
//! The two external connections of a session and the plumbing they share.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Session                            │
//! │  ┌──────────────────────┐        ┌────────────────────────┐  │
//! │  │   TransportChannel   │        │      CloudGateway      │  │
//! │  │  (bridge, commands)  │        │  (mirror, profiles)    │  │
//! │  │  ┌────────────────┐  │        │  ┌──────────────────┐  │  │
//! │  │  │   Supervisor   │  │        │  │   RemoteStore    │  │  │
//! │  │  │ (retry policy) │  │        │  │ (REST / memory)  │  │  │
//! │  │  └────────────────┘  │        │  └──────────────────┘  │  │
//! │  └──────────────────────┘        └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼ AppEvent
//!                        Session::handle
//! ```

pub mod cloud;
pub mod subscription;
pub mod supervisor;
pub mod transport;

pub use cloud::CloudGateway;
pub use subscription::Subscription;
pub use supervisor::{LinkState, RetryConfig, Supervisor};
pub use transport::{
    ChannelConnector, ChannelHandler, LinkKind, SocketIoConnector, TcpLinkConnector, TransportChannel,
    connector_for,
};
