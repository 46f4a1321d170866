#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for Offer Patrol Client integration tests.
//!
//! Provides a scripted [`MockTransport`] / [`MockConnector`] pair and helper
//! functions for constructing server message JSON shaped the way the real
//! backend emits it (naive ISO timestamps, float scores, camelCase card
//! fields).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::Utc;
use offer_patrol_client::{Connect, OfferPatrolError, PlayerIdentity, Transport};
use serde_json::json;

// ── MockTransport ───────────────────────────────────────────────────

/// A scripted mock transport for integration testing.
///
/// Scripted server frames are consumed in order by `recv()`; an explicit
/// `None` entry simulates a clean server-side close. All messages sent by
/// the client are recorded in `sent`. Further frames can be injected
/// mid-test through a [`ServerScript`] handle, which is how step-by-step
/// scenarios avoid racing the client's own actions.
pub struct MockTransport {
    /// Scripted server frames (consumed in order by `recv`).
    incoming: Arc<StdMutex<VecDeque<Option<Result<String, OfferPatrolError>>>>>,
    /// Recorded outgoing messages from the client.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Whether `close()` has been called.
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a new mock transport with the given scripted incoming frames.
    ///
    /// Returns the transport plus shared handles for inspecting sent messages
    /// and whether close was called.
    pub fn new(
        incoming: Vec<Option<Result<String, OfferPatrolError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: Arc::new(StdMutex::new(VecDeque::from(incoming))),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }

    /// A handle for injecting further server frames while the test runs.
    pub fn server_script(&self) -> ServerScript {
        ServerScript {
            queue: Arc::clone(&self.incoming),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), OfferPatrolError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, OfferPatrolError>> {
        loop {
            if let Some(item) = self.incoming.lock().unwrap().pop_front() {
                return item;
            }
            // Queue drained — wait for the test to push more (or forever,
            // keeping the connection alive until shutdown is called).
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    async fn close(&mut self) -> Result<(), OfferPatrolError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Test-side handle that plays the server: pushes frames into a
/// [`MockTransport`]'s queue after the client is already running.
pub struct ServerScript {
    queue: Arc<StdMutex<VecDeque<Option<Result<String, OfferPatrolError>>>>>,
}

impl ServerScript {
    /// Deliver one text frame to the client.
    pub fn send(&self, json: String) {
        self.queue.lock().unwrap().push_back(Some(Ok(json)));
    }

    /// Close the connection cleanly from the server side.
    pub fn close(&self) {
        self.queue.lock().unwrap().push_back(None);
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// A connector that hands out scripted transports in order.
///
/// Each connection cycle consumes one transport; once exhausted, `connect`
/// hangs forever so tests observe no further `Connected` events.
pub struct MockConnector {
    transports: VecDeque<MockTransport>,
}

impl MockConnector {
    pub fn new(transports: Vec<MockTransport>) -> Self {
        Self {
            transports: VecDeque::from(transports),
        }
    }

    /// Convenience: a connector with a single scripted transport, returning
    /// the sent/closed inspection handles alongside.
    pub fn single(
        incoming: Vec<Option<Result<String, OfferPatrolError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let (transport, sent, closed) = MockTransport::new(incoming);
        (Self::new(vec![transport]), sent, closed)
    }
}

#[async_trait]
impl Connect for MockConnector {
    type Transport = MockTransport;

    async fn connect(&mut self) -> Result<MockTransport, OfferPatrolError> {
        match self.transports.pop_front() {
            Some(t) => Ok(t),
            None => std::future::pending().await,
        }
    }
}

// ── Identity helper ─────────────────────────────────────────────────

pub fn test_identity() -> PlayerIdentity {
    PlayerIdentity {
        id: "11111111-2222-3333-4444-555555555555".into(),
        nickname: "Vigilante 🛡️".into(),
    }
}

// ── JSON helper functions ───────────────────────────────────────────

/// Returns a card object shaped exactly like the backend's card JSON:
/// camelCase price and shipping fields, Portuguese label strings.
pub fn card_json(id: &str, label: &str) -> serde_json::Value {
    json!({
        "id": id,
        "product": "fone bluetooth",
        "brand": "SomBoa",
        "priceBRL": 89.9,
        "originalPriceBRL": 349.9,
        "shippingInfo": "envio internacional, 40 dias",
        "description": "Fone original na caixa, lacrado",
        "photos": 2,
        "signals": ["desconto de 74%", "prazo de entrega suspeito"],
        "label": label,
        "difficulty": 3
    })
}

/// Returns a naive ISO 8601 timestamp string `secs` seconds from now, the
/// way the backend's `utcnow().isoformat()` emits deadlines (no offset).
pub fn naive_expires_at(secs: i64) -> String {
    (Utc::now() + chrono::Duration::seconds(secs))
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Returns the JSON string for a `new_round` server message.
pub fn new_round_json(card_ids: &[&str], expires_in_secs: i64) -> String {
    json!({
        "type": "new_round",
        "cards": card_ids.iter().map(|id| card_json(id, "pirata")).collect::<Vec<_>>(),
        "expires_at": naive_expires_at(expires_in_secs),
    })
    .to_string()
}

/// Returns the JSON string for a `game_state` resync message.
pub fn game_state_json(card_ids: &[&str], expires_in_secs: i64) -> String {
    json!({
        "type": "game_state",
        "cards": card_ids.iter().map(|id| card_json(id, "legitimo")).collect::<Vec<_>>(),
        "expires_at": naive_expires_at(expires_in_secs),
        "leaderboard": [{ "nickname": "Esperto 🦈", "score": 40 }],
    })
    .to_string()
}

/// Returns the JSON string for a `feedback` message. The total score is a
/// float, matching what the backend's score store reports.
pub fn feedback_json(card_id: &str, correct: bool, score_change: i64, new_total: f64) -> String {
    json!({
        "type": "feedback",
        "card_id": card_id,
        "correct": correct,
        "correct_label": "pirata",
        "score_change": score_change,
        "new_total_score": new_total,
    })
    .to_string()
}

/// Returns the JSON string for a `leaderboard_update` message.
pub fn leaderboard_update_json(entries: &[(&str, i64)]) -> String {
    json!({
        "type": "leaderboard_update",
        "leaderboard": entries
            .iter()
            .map(|(nickname, score)| json!({ "nickname": nickname, "score": score }))
            .collect::<Vec<_>>(),
    })
    .to_string()
}

/// Returns the JSON string for a `round_end` message carrying the final
/// standings.
pub fn round_end_json(entries: &[(&str, i64)]) -> String {
    json!({
        "type": "round_end",
        "leaderboard": entries
            .iter()
            .map(|(nickname, score)| json!({ "nickname": nickname, "score": score }))
            .collect::<Vec<_>>(),
    })
    .to_string()
}

/// Returns the JSON string for a server `error` message.
pub fn error_json(message: &str) -> String {
    json!({ "type": "error", "message": message }).to_string()
}
