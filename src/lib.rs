//! # Offer Patrol Client
//!
//! Transport-agnostic Rust client for the Offer Patrol real-time game
//! protocol — a multiplayer fraud-spotting game where players judge
//! marketplace offer cards as legitimate or pirated against a round deadline.
//!
//! This crate provides a high-level async client that keeps one long-lived
//! connection to the game server, mirrors the server's authoritative state
//! locally, and recovers from connection loss automatically.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] and [`Connect`]
//!   traits for any backend
//! - **Wire-compatible** — all protocol types match the server's JSON format
//!   exactly, including its lenient timestamp and score encodings
//! - **WebSocket built-in** — default `transport-websocket` feature provides
//!   `WebSocketConnector` with session addressing (player id + nickname in
//!   the URL path)
//! - **Self-healing** — fixed-delay reconnection, forever; the server resyncs
//!   full state on every connect
//! - **Event-driven** — receive typed [`OfferPatrolEvent`]s via a channel,
//!   including a derived one-second countdown tick
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use offer_patrol_client::{
//!     identity::{self, FileIdentityStore},
//!     transports::WebSocketConnector,
//!     OfferPatrolClient, OfferPatrolConfig, OfferPatrolEvent,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = FileIdentityStore::new(".offer_patrol_id");
//!     let identity = identity::get_or_create(&store)?;
//!
//!     let connector = WebSocketConnector::new("ws://localhost:8000/ws", identity.clone());
//!     let (client, mut events) =
//!         OfferPatrolClient::start(connector, OfferPatrolConfig::new(identity));
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             OfferPatrolEvent::RoundStarted { cards, .. } => {
//!                 if let Some(card) = cards.first() {
//!                     client.denounce(&card.id).await;
//!                 }
//!             }
//!             OfferPatrolEvent::Feedback { correct, .. } => {
//!                 println!("{}", if correct { "acertou!" } else { "errou." });
//!             }
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod countdown;
pub mod error;
pub mod event;
pub mod identity;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{OfferPatrolClient, OfferPatrolConfig};
pub use error::OfferPatrolError;
pub use event::OfferPatrolEvent;
pub use identity::PlayerIdentity;
pub use protocol::{Card, ClientAction, PlayerAction, ServerMessage, Verdict};
pub use state::{ConnectionState, GameSnapshot};
pub use transport::{Connect, Transport};
