//! Persistent streaming connection with topic subscriptions.
//!
//! States move `Disconnected -> Connecting -> Connected`, and on loss through
//! `Backoff -> Connecting` until the reconnect budget runs out. Subscriptions
//! survive reconnects and are replayed on every successful open.

pub mod client;
pub mod events;
pub mod socket;

pub use client::{StreamingClient, StreamingOptions};
pub use events::{ConnectionStatus, ControlAction, ControlMessage, StreamEvent};
pub use socket::{InboundFrame, SocketConnection, SocketConnector, SocketHandle, TungsteniteConnector};
