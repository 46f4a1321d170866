//! Transport implementations for the Offer Patrol game protocol.
//!
//! Concrete [`Transport`](crate::Transport) implementations live here behind
//! feature gates. Enable the corresponding Cargo feature to pull one in:
//!
//! | Feature                | Types                                        |
//! |------------------------|----------------------------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`], [`WebSocketConnector`] |

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
