//! Transport abstraction for the Offer Patrol game protocol.
//!
//! Two seams live here:
//!
//! - [`Transport`] — one live bidirectional text-message connection. The game
//!   protocol is JSON text, so implementations handle framing internally
//!   (WebSocket frames, length-prefixed TCP, …).
//! - [`Connect`] — an async factory that dials a **fresh** [`Transport`].
//!   Because the client reconnects indefinitely after a connection loss, it
//!   cannot be handed a single pre-connected transport; it holds a connector
//!   and asks it for a new connection each cycle. Session addressing (player
//!   id and nickname in the URL path) is the connector's concern.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use offer_patrol_client::error::OfferPatrolError;
//! use offer_patrol_client::transport::{Connect, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), OfferPatrolError> {
//!         // Send the JSON text message over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, OfferPatrolError>> {
//!         // Receive the next JSON text message
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), OfferPatrolError> {
//!         // Gracefully shut down the connection
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector { /* endpoint, identity, ... */ }
//!
//! #[async_trait]
//! impl Connect for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&mut self) -> Result<MyTransport, OfferPatrolError> {
//!         // Dial a fresh connection
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::OfferPatrolError;

/// A bidirectional text message transport for the Offer Patrol protocol.
///
/// Implementors shuttle serialized JSON strings between the client and the
/// game server. Each call to [`send`](Transport::send) transmits one complete
/// JSON message; each call to [`recv`](Transport::recv) returns one.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is
/// used inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data. Channel-based implementations (e.g.,
/// wrapping `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`OfferPatrolError::TransportSend`] if the message could not be
    /// sent (e.g., connection broken, write buffer full).
    async fn send(&mut self, message: String) -> Result<(), OfferPatrolError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete message was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed cleanly by the server
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, OfferPatrolError>>;

    /// Close the transport connection gracefully.
    ///
    /// After calling this method, subsequent calls to [`send`](Transport::send)
    /// and [`recv`](Transport::recv) may return errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), OfferPatrolError>;
}

/// Factory for fresh [`Transport`] connections, used once at startup and once
/// per reconnection cycle.
///
/// Each call must dial a brand-new connection; returning a previously used
/// transport is a logic error. A failed attempt is not fatal — the client
/// waits its reconnect delay and calls again.
#[async_trait]
pub trait Connect: Send + 'static {
    /// The transport type this connector produces.
    type Transport: Transport;

    /// Dial a new connection to the game server.
    ///
    /// # Errors
    ///
    /// Returns [`OfferPatrolError::Connect`] (or a transport-specific error)
    /// when the connection cannot be established.
    async fn connect(&mut self) -> Result<Self::Transport, OfferPatrolError>;
}
