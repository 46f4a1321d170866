//! Async client for the Offer Patrol game protocol.
//!
//! [`OfferPatrolClient`] is a thin handle over a background connection loop
//! task. The loop owns the transport, parses inbound frames, applies each
//! message's rule to the shared [`GameState`], and emits
//! [`OfferPatrolEvent`]s on a bounded channel returned from
//! [`OfferPatrolClient::start`]. When the connection drops, the loop waits a
//! fixed delay and dials the connector again, indefinitely; because the loop
//! is sequential, at most one connection attempt is ever pending.
//!
//! # Example
//!
//! ```rust,ignore
//! let identity = identity::get_or_create(&store)?;
//! let connector = WebSocketConnector::new("ws://localhost:8000/ws", identity.clone());
//! let (client, mut events) = OfferPatrolClient::start(connector, OfferPatrolConfig::new(identity));
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         OfferPatrolEvent::RoundStarted { cards, .. } => { /* show first card */ }
//!         OfferPatrolEvent::Feedback { correct, .. } => { /* toast */ }
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

use crate::countdown::{display_seconds, is_ending_soon, remaining_seconds};
use crate::event::OfferPatrolEvent;
use crate::identity::PlayerIdentity;
use crate::protocol::{Card, ClientAction, PlayerAction, ServerMessage};
use crate::state::{AtomicConnectionState, CardFeedback, ConnectionState, GameSnapshot, GameState};
use crate::transport::{Connect, Transport};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default delay between a connection loss and the next connection attempt.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default delay between feedback on the presented card and auto-advance.
const DEFAULT_ADVANCE_DELAY: Duration = Duration::from_millis(1200);

/// Period of the countdown tick while a round deadline is set.
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for an [`OfferPatrolClient`].
///
/// The only required input is the player identity; all other fields have
/// defaults matching the reference behavior.
///
/// # Example
///
/// ```
/// use offer_patrol_client::client::OfferPatrolConfig;
/// use offer_patrol_client::identity::PlayerIdentity;
/// use std::time::Duration;
///
/// let identity = PlayerIdentity { id: "p1".into(), nickname: "Sagaz 🦊".into() };
/// let config = OfferPatrolConfig::new(identity)
///     .with_reconnect_delay(Duration::from_secs(3))
///     .with_event_channel_capacity(512);
/// assert_eq!(config.reconnect_delay, Duration::from_secs(3));
/// ```
#[derive(Debug, Clone)]
pub struct OfferPatrolConfig {
    /// Identity presented to the server. Immutable for the session.
    pub identity: PlayerIdentity,
    /// Delay between a connection loss and the next attempt. The reconnect
    /// loop never gives up and never escalates this delay.
    ///
    /// Defaults to **5 seconds**.
    pub reconnect_delay: Duration,
    /// Delay between feedback resolving the presented card and the automatic
    /// move to the next card.
    ///
    /// Defaults to **1.2 seconds**.
    pub advance_delay: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up with incoming server messages, events
    /// are dropped (with a warning logged) to avoid blocking the connection
    /// loop. The `Disconnected` event is always delivered regardless.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`OfferPatrolClient::shutdown`] is called, the background loop is
    /// given this much time to close the transport and emit a final
    /// `Disconnected` event before the task is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl OfferPatrolConfig {
    /// Create a configuration with the given identity and default values.
    pub fn new(identity: PlayerIdentity) -> Self {
        Self {
            identity,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            advance_delay: DEFAULT_ADVANCE_DELAY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the delay between a connection loss and the next attempt.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the delay before auto-advancing past an answered card.
    #[must_use]
    pub fn with_advance_delay(mut self, delay: Duration) -> Self {
        self.advance_delay = delay;
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the client handle and the connection loop.
struct Shared {
    connection: AtomicConnectionState,
    game: Mutex<GameState>,
}

impl Shared {
    fn new() -> Self {
        Self {
            connection: AtomicConnectionState::new(ConnectionState::Disconnected),
            game: Mutex::new(GameState::new()),
        }
    }
}

/// Internal commands delivered to the connection loop.
enum Command {
    /// Transmit one judgment to the server.
    Submit(ClientAction),
    /// Move the presented card forward (scheduled after feedback). Carries
    /// the round serial it was scheduled under; ignored once the card set
    /// has been replaced or cleared.
    AdvanceCard(u64),
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for the Offer Patrol game protocol.
///
/// Created via [`OfferPatrolClient::start`], which spawns the background
/// connection loop and returns this handle together with an event receiver.
///
/// All game state lives behind this handle; mutation happens exclusively in
/// the connection loop as inbound messages are dispatched. The handle's one
/// outbound entry point is [`submit`](Self::submit).
pub struct OfferPatrolClient {
    /// Sender half of the command channel to the connection loop.
    cmd_tx: mpsc::UnboundedSender<Command>,
    /// Shared state updated by the connection loop.
    shared: Arc<Shared>,
    /// Identity presented to the server.
    identity: PlayerIdentity,
    /// Handle to the background connection loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the loop to shut down gracefully.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
}

impl OfferPatrolClient {
    /// Start the connection loop and return a handle plus event receiver.
    ///
    /// The loop immediately dials `connector`; the first event on a healthy
    /// connection is [`OfferPatrolEvent::Connected`], typically followed by a
    /// `game_state` resync from the server.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        connector: impl Connect,
        config: OfferPatrolConfig,
    ) -> (Self, mpsc::Receiver<OfferPatrolEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<OfferPatrolEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let shared = Arc::new(Shared::new());
        let loop_shared = Arc::clone(&shared);
        let loop_cmd_tx = cmd_tx.clone();

        let task = tokio::spawn(connection_loop(
            connector,
            cmd_rx,
            loop_cmd_tx,
            event_tx,
            loop_shared,
            shutdown_rx,
            LoopConfig {
                reconnect_delay: config.reconnect_delay,
                advance_delay: config.advance_delay,
            },
        ));

        let client = Self {
            cmd_tx,
            shared,
            identity: config.identity,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    // ── Outbound action ─────────────────────────────────────────────

    /// Submit a judgment for a card.
    ///
    /// The single guarded outbound entry point. The action is dropped, and
    /// `false` returned, unless the client is connected, the card belongs to
    /// the current round, and no feedback exists for it yet. Dropped actions
    /// are not errors; the server is the source of truth, so nothing is
    /// queued or retried.
    pub async fn submit(&self, card_id: &str, action: PlayerAction) -> bool {
        if self.connection_state() != ConnectionState::Connected {
            debug!(card_id, "dropping action: not connected");
            return false;
        }
        {
            let game = self.shared.game.lock().await;
            if !game.can_submit(card_id) {
                debug!(card_id, "dropping action: card unknown or already answered");
                return false;
            }
        }
        self.cmd_tx
            .send(Command::Submit(ClientAction {
                action,
                card_id: card_id.to_string(),
            }))
            .is_ok()
    }

    /// Mark a card as a legitimate offer. See [`submit`](Self::submit).
    pub async fn approve(&self, card_id: &str) -> bool {
        self.submit(card_id, PlayerAction::Approve).await
    }

    /// Report a card as fraudulent. See [`submit`](Self::submit).
    pub async fn denounce(&self, card_id: &str) -> bool {
        self.submit(card_id, PlayerAction::Denounce).await
    }

    /// Shut down the client, closing the transport and stopping the loop.
    ///
    /// After calling this method, the event receiver will yield `None` once
    /// the connection loop exits.
    pub async fn shutdown(&mut self) {
        debug!("OfferPatrolClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the loop with a timeout. If it doesn't exit in time, abort it
        // so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("connection loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("connection loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("connection loop aborted: {join_err}");
                    }
                }
            }
        }

        self.shared.connection.store(ConnectionState::Disconnected);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Current connection lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.connection.load()
    }

    /// The identity this client presents to the server.
    pub fn identity(&self) -> &PlayerIdentity {
        &self.identity
    }

    /// The last server-declared cumulative score.
    pub async fn score(&self) -> i64 {
        self.shared.game.lock().await.score()
    }

    /// The currently presented card, if a round is in progress.
    pub async fn current_card(&self) -> Option<Card> {
        self.shared.game.lock().await.current_card().cloned()
    }

    /// Whole seconds until the round deadline; `None` outside a round.
    pub async fn seconds_remaining(&self) -> Option<i64> {
        let deadline = self.shared.game.lock().await.deadline()?;
        Some(remaining_seconds(deadline, Utc::now()))
    }

    /// Coherent copy of the full game state.
    pub async fn snapshot(&self) -> GameSnapshot {
        self.shared.game.lock().await.snapshot()
    }
}

impl std::fmt::Debug for OfferPatrolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfferPatrolClient")
            .field("connection_state", &self.connection_state())
            .field("player_id", &self.identity.id)
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for OfferPatrolClient {
    fn drop(&mut self) {
        // `Drop` is synchronous so we cannot await a graceful shutdown.
        // The only safe action is to abort the spawned task, which causes
        // the connection loop future to be dropped immediately. The
        // `shutdown_tx` oneshot is intentionally *not* sent here: sending it
        // would trigger a graceful path that calls async `transport.close()`,
        // but there is no executor context to drive it inside `Drop`.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Connection loop ─────────────────────────────────────────────────

/// Knobs the loop needs from the public config.
struct LoopConfig {
    reconnect_delay: Duration,
    advance_delay: Duration,
}

/// Why a driven connection ended.
enum Exit {
    /// Shutdown was requested (or the handle was dropped); stop for good.
    Shutdown,
    /// The connection was lost; reconnect after the configured delay.
    ConnectionLost(Option<String>),
}

/// Outer cycle: connect, drive until the connection dies, wait, repeat.
///
/// The cycle is strictly sequential, so a newly scheduled reconnect can never
/// race a still-pending previous attempt.
#[allow(clippy::too_many_arguments)]
async fn connection_loop(
    mut connector: impl Connect,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    event_tx: mpsc::Sender<OfferPatrolEvent>,
    shared: Arc<Shared>,
    mut shutdown_rx: oneshot::Receiver<()>,
    cfg: LoopConfig,
) {
    debug!("connection loop started");

    loop {
        shared.connection.store(ConnectionState::Connecting);
        match connector.connect().await {
            Ok(transport) => {
                // Anything still queued at this point targeted the previous
                // connection; user actions are never replayed.
                drain_stale_commands(&mut cmd_rx);
                shared.connection.store(ConnectionState::Connected);
                emit_event(&event_tx, OfferPatrolEvent::Connected).await;

                let exit = drive_connection(
                    transport,
                    &mut cmd_rx,
                    &cmd_tx,
                    &event_tx,
                    &shared,
                    &mut shutdown_rx,
                    &cfg,
                )
                .await;

                shared.connection.store(ConnectionState::Disconnected);
                match exit {
                    Exit::Shutdown => {
                        emit_disconnected(&event_tx, Some("client shut down".into())).await;
                        break;
                    }
                    Exit::ConnectionLost(reason) => {
                        emit_disconnected(&event_tx, reason).await;
                    }
                }
            }
            Err(e) => {
                warn!("connection attempt failed: {e}");
                shared.connection.store(ConnectionState::Disconnected);
                emit_disconnected(&event_tx, Some(format!("connect error: {e}"))).await;
            }
        }

        // Exactly one reconnect is scheduled per close, with a fixed delay
        // and no retry bound.
        tokio::select! {
            _ = tokio::time::sleep(cfg.reconnect_delay) => {}
            _ = &mut shutdown_rx => break,
        }
    }

    debug!("connection loop exited");
}

/// Drive one live connection until it closes, errors, or shutdown arrives.
///
/// All inbound frames, outbound commands, and the one-second countdown tick
/// are serialized through this `select!` and processed run-to-completion, so
/// the shared game state never sees interleaved mutation.
async fn drive_connection(
    mut transport: impl Transport,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    cmd_tx: &mpsc::UnboundedSender<Command>,
    event_tx: &mpsc::Sender<OfferPatrolEvent>,
    shared: &Shared,
    shutdown_rx: &mut oneshot::Receiver<()>,
    cfg: &LoopConfig,
) -> Exit {
    let mut tick = tokio::time::interval(COUNTDOWN_TICK);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // Branch 1: outgoing command from the client handle (or a
            // scheduled advance).
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Submit(action)) => {
                        match serde_json::to_string(&action) {
                            Ok(json) => {
                                debug!(card_id = %action.card_id, "sending judgment");
                                if let Err(e) = transport.send(json).await {
                                    error!("transport send error: {e}");
                                    return Exit::ConnectionLost(
                                        Some(format!("transport send error: {e}")),
                                    );
                                }
                            }
                            Err(e) => {
                                error!("failed to serialize action: {e}");
                                // Serialization errors are programming bugs; don't kill the loop.
                            }
                        }
                    }
                    Some(Command::AdvanceCard(round)) => {
                        let advanced = {
                            let mut game = shared.game.lock().await;
                            if game.round_serial() == round {
                                game.advance_card();
                                Some(game.current_index())
                            } else {
                                None
                            }
                        };
                        match advanced {
                            Some(index) => {
                                emit_event(event_tx, OfferPatrolEvent::CardAdvanced { index })
                                    .await;
                            }
                            None => {
                                debug!("ignoring advance scheduled against a previous round");
                            }
                        }
                    }
                    // Command channel closed — client handle dropped.
                    None => {
                        debug!("command channel closed, shutting down connection loop");
                        let _ = transport.close().await;
                        return Exit::Shutdown;
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                return Exit::Shutdown;
            }

            // Branch 3: incoming message from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        handle_frame(&text, cmd_tx, event_tx, shared, cfg).await;
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return Exit::ConnectionLost(
                            Some(format!("transport receive error: {e}")),
                        );
                    }
                    // Transport closed cleanly.
                    None => {
                        debug!("transport closed by server");
                        return Exit::ConnectionLost(None);
                    }
                }
            }

            // Branch 4: countdown tick while a deadline is set
            _ = tick.tick() => {
                let deadline = shared.game.lock().await.deadline();
                if let Some(deadline) = deadline {
                    let now = Utc::now();
                    emit_event(event_tx, OfferPatrolEvent::CountdownTick {
                        remaining_secs: remaining_seconds(deadline, now),
                        display_secs: display_seconds(deadline, now),
                        ending_soon: is_ending_soon(deadline, now),
                    }).await;
                }
            }
        }
    }
}

/// Parse one inbound frame, apply its dispatcher rule, and forward the event.
///
/// Malformed frames and unknown message types are dropped with a log line;
/// neither ever propagates.
async fn handle_frame(
    text: &str,
    cmd_tx: &mpsc::UnboundedSender<Command>,
    event_tx: &mpsc::Sender<OfferPatrolEvent>,
    shared: &Shared,
    cfg: &LoopConfig,
) {
    let msg = match serde_json::from_str::<ServerMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("failed to deserialize server message: {e} (raw: {text})");
            return;
        }
    };

    // Feedback on the presented card schedules exactly one advance after the
    // configured delay, so the player sees the verdict before moving on. The
    // timer carries the round serial; if the round is replaced or ended
    // before it fires, the advance is discarded instead of moving the fresh
    // round's card.
    if let Some(round) = update_state(shared, &msg).await {
        let tx = cmd_tx.clone();
        let delay = cfg.advance_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Command::AdvanceCard(round));
        });
    }

    if let Some(event) = OfferPatrolEvent::from_server(msg) {
        emit_event(event_tx, event).await;
    } else {
        debug!("ignoring unrecognized server message type");
    }
}

/// Apply exactly one state rule per message type.
///
/// Returns the current round serial when a feedback message resolved the
/// presented card (the cue to schedule a navigation advance valid for that
/// round only), `None` otherwise.
async fn update_state(shared: &Shared, msg: &ServerMessage) -> Option<u64> {
    match msg {
        ServerMessage::NewRound {
            cards,
            expires_at,
            leaderboard,
        }
        | ServerMessage::GameState {
            cards,
            expires_at,
            leaderboard,
        } => {
            let mut game = shared.game.lock().await;
            game.begin_round(cards.clone(), *expires_at, leaderboard.clone());
            debug!(cards = cards.len(), "state: round replaced");
            None
        }
        ServerMessage::LeaderboardUpdate { leaderboard } => {
            shared.game.lock().await.set_leaderboard(leaderboard.clone());
            None
        }
        ServerMessage::Feedback {
            card_id,
            correct,
            correct_label,
            score_change,
            new_total_score,
        } => {
            let mut game = shared.game.lock().await;
            let hit = game.apply_feedback(
                card_id,
                CardFeedback {
                    correct: *correct,
                    correct_label: *correct_label,
                    score_change: *score_change,
                    new_total_score: *new_total_score,
                },
            );
            debug!(card_id, correct, new_total_score, "state: feedback applied");
            hit.then(|| game.round_serial())
        }
        ServerMessage::RoundEnd { leaderboard } => {
            shared.game.lock().await.end_round(leaderboard.clone());
            debug!("state: round ended");
            None
        }
        // No state change for warnings or unrecognized types.
        ServerMessage::Error { .. } | ServerMessage::Unknown => None,
    }
}

/// Discard commands queued against a connection that no longer exists.
///
/// Called once per connect cycle, before the state flips to connected, so a
/// judgment accepted just before the old transport died is dropped rather
/// than replayed on the new connection.
fn drain_stale_commands(cmd_rx: &mut mpsc::UnboundedReceiver<Command>) {
    while let Ok(cmd) = cmd_rx.try_recv() {
        match cmd {
            Command::Submit(action) => {
                debug!(card_id = %action.card_id, "dropping action queued before reconnect");
            }
            Command::AdvanceCard(_) => {}
        }
    }
}

/// Emit an event to the event channel. If the channel is full, log a warning
/// and drop the event to avoid blocking the connection loop.
async fn emit_event(event_tx: &mpsc::Sender<OfferPatrolEvent>, event: OfferPatrolEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit a [`Disconnected`](OfferPatrolEvent::Disconnected) event.
///
/// Uses `send().await` (blocking) instead of `try_send` because consumers key
/// their "offline" UI off this event and it must never be silently dropped.
async fn emit_disconnected(event_tx: &mpsc::Sender<OfferPatrolEvent>, reason: Option<String>) {
    if event_tx
        .send(OfferPatrolEvent::Disconnected { reason })
        .await
        .is_err()
    {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::OfferPatrolError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    // ── Mock transport & connector ──────────────────────────────────

    /// A mock transport that records sent messages and replays scripted frames.
    struct MockTransport {
        /// Frames that `recv()` will yield in order. An explicit `None` entry
        /// signals a clean server-side close.
        incoming: VecDeque<Option<std::result::Result<String, OfferPatrolError>>>,
        /// Recorded outgoing messages.
        sent: Arc<StdMutex<Vec<String>>>,
        /// Whether `close()` was called.
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), OfferPatrolError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, OfferPatrolError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // All scripted frames delivered — hang so the connection
                // stays alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), OfferPatrolError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// A connector that yields scripted transports in order, then hangs.
    struct MockConnector {
        transports: VecDeque<MockTransport>,
    }

    #[async_trait]
    impl Connect for MockConnector {
        type Transport = MockTransport;

        async fn connect(&mut self) -> std::result::Result<MockTransport, OfferPatrolError> {
            match self.transports.pop_front() {
                Some(t) => Ok(t),
                // No further scripted connections — park forever so the test
                // observes no additional Connected events.
                None => std::future::pending().await,
            }
        }
    }

    type SentLog = Arc<StdMutex<Vec<String>>>;

    fn scripted_transport(
        incoming: Vec<Option<std::result::Result<String, OfferPatrolError>>>,
    ) -> (MockTransport, SentLog, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = MockTransport {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }

    fn identity() -> PlayerIdentity {
        PlayerIdentity {
            id: "player-1".into(),
            nickname: "Atento 🔎".into(),
        }
    }

    fn test_config() -> OfferPatrolConfig {
        OfferPatrolConfig::new(identity())
            .with_reconnect_delay(Duration::from_millis(20))
            .with_advance_delay(Duration::from_millis(20))
    }

    // ── JSON fixtures (shaped like real server output) ──────────────

    fn card_json(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "product": "tênis",
            "brand": "CorrePé",
            "priceBRL": 120.0,
            "originalPriceBRL": 450.0,
            "shippingInfo": "internacional rápido, sem rastreio",
            "description": "Tênis prime linha, garantia do vendedor",
            "photos": 1,
            "signals": ["preço 73% abaixo do original", "sem rastreio"],
            "label": "pirata",
            "difficulty": 2
        })
    }

    fn new_round_json(ids: &[&str], expires_in_secs: i64) -> String {
        let expires = Utc::now() + chrono::Duration::seconds(expires_in_secs);
        json!({
            "type": "new_round",
            "cards": ids.iter().map(|id| card_json(id)).collect::<Vec<_>>(),
            "expires_at": expires.to_rfc3339(),
        })
        .to_string()
    }

    fn feedback_json(card_id: &str, total: i64) -> String {
        json!({
            "type": "feedback",
            "card_id": card_id,
            "correct": true,
            "correct_label": "pirata",
            "score_change": 60,
            // The server's score store reports floats.
            "new_total_score": total as f64,
        })
        .to_string()
    }

    // ── Helpers ─────────────────────────────────────────────────────

    async fn recv_or_timeout(
        events: &mut mpsc::Receiver<OfferPatrolEvent>,
    ) -> OfferPatrolEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    /// Receive events until one matches `pred`, skipping countdown ticks etc.
    async fn recv_until(
        events: &mut mpsc::Receiver<OfferPatrolEvent>,
        pred: impl Fn(&OfferPatrolEvent) -> bool,
    ) -> OfferPatrolEvent {
        loop {
            let event = recv_or_timeout(events).await;
            if pred(&event) {
                return event;
            }
        }
    }

    // ── Config tests ────────────────────────────────────────────────

    #[tokio::test]
    async fn config_defaults() {
        let config = OfferPatrolConfig::new(identity());
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.advance_delay, Duration::from_millis(1200));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn config_builder_methods() {
        let config = OfferPatrolConfig::new(identity())
            .with_reconnect_delay(Duration::from_secs(2))
            .with_advance_delay(Duration::from_millis(500))
            .with_event_channel_capacity(0)
            .with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.advance_delay, Duration::from_millis(500));
        assert_eq!(config.event_channel_capacity, 1, "capacity clamps to 1");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    // ── Connection lifecycle ────────────────────────────────────────

    #[tokio::test]
    async fn connected_is_first_event() {
        let (transport, _sent, _closed) = scripted_transport(vec![]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };

        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

        let first = recv_or_timeout(&mut events).await;
        assert!(matches!(first, OfferPatrolEvent::Connected));
        assert_eq!(client.connection_state(), ConnectionState::Connected);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn close_schedules_one_reconnect() {
        // First connection closes immediately; second delivers a resync.
        let (first, _s1, _c1) = scripted_transport(vec![None]);
        let resync = json!({
            "type": "game_state",
            "cards": [card_json("c1")],
            "expires_at": (Utc::now() + chrono::Duration::seconds(30)).to_rfc3339(),
        })
        .to_string();
        let (second, _s2, _c2) = scripted_transport(vec![Some(Ok(resync))]);

        let connector = MockConnector {
            transports: VecDeque::from([first, second]),
        };
        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

        let ev = recv_or_timeout(&mut events).await;
        assert!(matches!(ev, OfferPatrolEvent::Connected));

        let ev = recv_or_timeout(&mut events).await;
        assert!(matches!(ev, OfferPatrolEvent::Disconnected { reason: None }));
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);

        // After the fixed delay the loop dials again and the server resyncs.
        let ev = recv_or_timeout(&mut events).await;
        assert!(matches!(ev, OfferPatrolEvent::Connected));
        let ev =
            recv_until(&mut events, |e| matches!(e, OfferPatrolEvent::RoundStarted { .. })).await;
        if let OfferPatrolEvent::RoundStarted { cards, resync, .. } = ev {
            assert!(resync, "game_state must flag itself as a resync");
            assert_eq!(cards.len(), 1);
        }

        // The resync fully replaced local state regardless of what was
        // mid-flight before the close.
        let snapshot = client.snapshot().await;
        assert_eq!(snapshot.cards.len(), 1);
        assert_eq!(snapshot.current_index, 0);
        assert!(snapshot.feedback.is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn transport_error_emits_disconnected_with_reason() {
        let (transport, _sent, _closed) = scripted_transport(vec![Some(Err(
            OfferPatrolError::TransportReceive("boom".into()),
        ))]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };

        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

        let _ = recv_or_timeout(&mut events).await; // Connected
        let ev = recv_or_timeout(&mut events).await;
        if let OfferPatrolEvent::Disconnected { reason } = ev {
            assert!(reason.unwrap().contains("boom"));
        } else {
            panic!("expected Disconnected, got {ev:?}");
        }

        client.shutdown().await;
    }

    // ── Round lifecycle & dispatch rules ────────────────────────────

    #[tokio::test]
    async fn new_round_replaces_state_and_resets_navigation() {
        let (transport, _sent, _closed) =
            scripted_transport(vec![Some(Ok(new_round_json(&["a", "b", "c"], 20)))]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };

        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());
        let _ = recv_or_timeout(&mut events).await; // Connected
        let ev = recv_or_timeout(&mut events).await;
        assert!(matches!(ev, OfferPatrolEvent::RoundStarted { resync: false, .. }));

        let snapshot = client.snapshot().await;
        assert_eq!(snapshot.cards.len(), 3);
        assert_eq!(snapshot.current_index, 0);
        assert!(snapshot.feedback.is_empty());
        assert!(snapshot.deadline.is_some());

        assert_eq!(client.current_card().await.unwrap().id, "a");
        let remaining = client.seconds_remaining().await.unwrap();
        assert!((15..=20).contains(&remaining), "got {remaining}");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn feedback_overwrites_score_and_advances_after_delay() {
        let (transport, sent, _closed) = scripted_transport(vec![
            Some(Ok(new_round_json(&["a", "b"], 30))),
            Some(Ok(feedback_json("a", 110))),
        ]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };

        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

        let ev = recv_until(&mut events, |e| {
            matches!(e, OfferPatrolEvent::Feedback { .. })
        })
        .await;
        if let OfferPatrolEvent::Feedback {
            card_id,
            new_total_score,
            ..
        } = ev
        {
            assert_eq!(card_id, "a");
            assert_eq!(new_total_score, 110, "float score must decode to i64");
        }

        assert_eq!(client.score().await, 110);
        assert!(client.snapshot().await.feedback.contains_key("a"));

        // The presented card was answered, so navigation advances after the
        // configured delay.
        let ev = recv_until(&mut events, |e| {
            matches!(e, OfferPatrolEvent::CardAdvanced { .. })
        })
        .await;
        assert!(matches!(ev, OfferPatrolEvent::CardAdvanced { index: 1 }));
        assert_eq!(client.current_card().await.unwrap().id, "b");

        // The client never sent anything on its own.
        assert!(sent.lock().unwrap().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn stale_advance_does_not_leak_into_new_round() {
        // Feedback schedules an advance, but the round is replaced before
        // the delay elapses; the timer must not move the fresh round's card.
        let (transport, _sent, _closed) = scripted_transport(vec![
            Some(Ok(new_round_json(&["a", "b"], 30))),
            Some(Ok(feedback_json("a", 60))),
            Some(Ok(new_round_json(&["c", "d"], 30))),
        ]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };
        let config = test_config().with_advance_delay(Duration::from_millis(50));

        let (mut client, mut events) = OfferPatrolClient::start(connector, config);

        // First round, then its replacement.
        let _ = recv_until(&mut events, |e| {
            matches!(e, OfferPatrolEvent::RoundStarted { .. })
        })
        .await;
        let _ = recv_until(&mut events, |e| {
            matches!(e, OfferPatrolEvent::RoundStarted { .. })
        })
        .await;

        // Wait well past the advance delay scheduled for the old round.
        tokio::time::sleep(Duration::from_millis(150)).await;

        let snapshot = client.snapshot().await;
        assert_eq!(snapshot.current_index, 0, "fresh round must start at card 0");
        assert_eq!(client.current_card().await.unwrap().id, "c");
        assert!(snapshot.feedback.is_empty());

        // And no advance event surfaced for the stale timer.
        while let Ok(ev) = events.try_recv() {
            assert!(
                !matches!(ev, OfferPatrolEvent::CardAdvanced { .. }),
                "stale advance must be discarded, got {ev:?}"
            );
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn queued_action_is_not_replayed_after_reconnect() {
        // First connection: a round begins, then the server closes.
        let (first, _s1, _c1) = scripted_transport(vec![
            Some(Ok(new_round_json(&["a", "b"], 30))),
            None,
        ]);
        let (second, second_sent, _c2) = scripted_transport(vec![]);
        let connector = MockConnector {
            transports: VecDeque::from([first, second]),
        };

        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

        let _ = recv_until(&mut events, |e| {
            matches!(e, OfferPatrolEvent::Disconnected { .. })
        })
        .await;

        // An action accepted just before the transport died is still sitting
        // in the command channel when the loop reconnects.
        client
            .cmd_tx
            .send(Command::Submit(ClientAction {
                action: PlayerAction::Approve,
                card_id: "a".into(),
            }))
            .expect("command channel open");

        let _ = recv_until(&mut events, |e| matches!(e, OfferPatrolEvent::Connected)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(
            second_sent.lock().unwrap().is_empty(),
            "actions from a dead connection must not be replayed"
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn round_end_clears_deadline_and_cards() {
        let round_end = json!({
            "type": "round_end",
            "leaderboard": [{ "nickname": "Veloz ⚡", "score": 200 }],
        })
        .to_string();
        let (transport, _sent, _closed) = scripted_transport(vec![
            Some(Ok(new_round_json(&["a"], 30))),
            Some(Ok(round_end)),
        ]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };

        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

        let ev = recv_until(&mut events, |e| {
            matches!(e, OfferPatrolEvent::RoundEnded { .. })
        })
        .await;
        if let OfferPatrolEvent::RoundEnded { leaderboard } = ev {
            assert_eq!(leaderboard.unwrap()[0].score, 200);
        }

        let snapshot = client.snapshot().await;
        assert!(snapshot.deadline.is_none());
        assert!(snapshot.cards.is_empty());
        assert_eq!(snapshot.leaderboard.len(), 1);
        assert!(client.seconds_remaining().await.is_none());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn leaderboard_update_touches_only_leaderboard() {
        let update = json!({
            "type": "leaderboard_update",
            "leaderboard": [
                { "nickname": "Sagaz 🦊", "score": 90 },
                { "nickname": "Atento 🔎", "score": 60 },
            ],
        })
        .to_string();
        let (transport, _sent, _closed) = scripted_transport(vec![
            Some(Ok(new_round_json(&["a"], 30))),
            Some(Ok(update)),
        ]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };

        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

        let ev = recv_until(&mut events, |e| {
            matches!(e, OfferPatrolEvent::LeaderboardUpdated { .. })
        })
        .await;
        if let OfferPatrolEvent::LeaderboardUpdated { leaderboard } = ev {
            // Server ordering is adopted verbatim.
            assert_eq!(leaderboard[0].nickname, "Sagaz 🦊");
        }

        let snapshot = client.snapshot().await;
        assert_eq!(snapshot.leaderboard.len(), 2);
        assert_eq!(snapshot.cards.len(), 1, "cards must be untouched");
        assert!(snapshot.deadline.is_some(), "deadline must be untouched");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn server_error_is_surfaced_without_state_change() {
        let error = json!({ "type": "error", "message": "Cooldown active." }).to_string();
        let (transport, _sent, _closed) = scripted_transport(vec![
            Some(Ok(new_round_json(&["a"], 30))),
            Some(Ok(error)),
        ]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };

        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

        let ev = recv_until(&mut events, |e| {
            matches!(e, OfferPatrolEvent::ServerWarning { .. })
        })
        .await;
        if let OfferPatrolEvent::ServerWarning { message } = ev {
            assert_eq!(message, "Cooldown active.");
        }

        let snapshot = client.snapshot().await;
        assert_eq!(snapshot.cards.len(), 1);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_and_malformed_messages_are_dropped() {
        let unknown = json!({ "type": "matchmaking_hint", "whatever": 1 }).to_string();
        let (transport, _sent, _closed) = scripted_transport(vec![
            Some(Ok(unknown)),
            Some(Ok("this is not json".to_string())),
            // A recognizable message afterwards proves the loop survived.
            Some(Ok(new_round_json(&["a"], 30))),
        ]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };

        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

        let _ = recv_or_timeout(&mut events).await; // Connected
        let ev = recv_or_timeout(&mut events).await;
        assert!(
            matches!(ev, OfferPatrolEvent::RoundStarted { .. }),
            "unknown/malformed frames must be invisible, got {ev:?}"
        );

        client.shutdown().await;
    }

    // ── Outbound action guards ──────────────────────────────────────

    #[tokio::test]
    async fn submit_sends_action_when_connected() {
        let (transport, sent, _closed) =
            scripted_transport(vec![Some(Ok(new_round_json(&["a", "b"], 30)))]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };

        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());
        let _ = recv_until(&mut events, |e| {
            matches!(e, OfferPatrolEvent::RoundStarted { .. })
        })
        .await;

        assert!(client.approve("a").await);

        // Give the loop a moment to process.
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            assert_eq!(messages.len(), 1);
            let action: ClientAction = serde_json::from_str(&messages[0]).unwrap();
            assert_eq!(action.action, PlayerAction::Approve);
            assert_eq!(action.card_id, "a");
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn submit_is_noop_while_disconnected() {
        // One transport that closes immediately; long reconnect delay keeps
        // the client disconnected while we probe.
        let (transport, sent, _closed) = scripted_transport(vec![None]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };
        let config = test_config().with_reconnect_delay(Duration::from_secs(30));

        let (mut client, mut events) = OfferPatrolClient::start(connector, config);
        let _ = recv_or_timeout(&mut events).await; // Connected
        let _ = recv_or_timeout(&mut events).await; // Disconnected

        assert!(!client.denounce("a").await);
        assert!(sent.lock().unwrap().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn submit_is_noop_for_answered_card() {
        let (transport, sent, _closed) = scripted_transport(vec![
            Some(Ok(new_round_json(&["a", "b"], 30))),
            Some(Ok(feedback_json("a", 60))),
        ]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };

        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());
        let _ = recv_until(&mut events, |e| {
            matches!(e, OfferPatrolEvent::Feedback { .. })
        })
        .await;

        // "a" already has feedback; resubmitting must drop silently.
        assert!(!client.approve("a").await);
        // A card outside the round drops too.
        assert!(!client.approve("zzz").await);
        // An unanswered round card still goes through.
        assert!(client.denounce("b").await);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sent.lock().unwrap().len(), 1);

        client.shutdown().await;
    }

    // ── Countdown ───────────────────────────────────────────────────

    #[tokio::test]
    async fn countdown_ticks_while_deadline_is_set() {
        let (transport, _sent, _closed) =
            scripted_transport(vec![Some(Ok(new_round_json(&["a"], 8)))]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };

        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

        let ev = recv_until(&mut events, |e| {
            matches!(e, OfferPatrolEvent::CountdownTick { .. })
        })
        .await;
        if let OfferPatrolEvent::CountdownTick {
            remaining_secs,
            display_secs,
            ending_soon,
        } = ev
        {
            assert!(remaining_secs <= 8);
            assert_eq!(display_secs, remaining_secs % 60);
            assert!(ending_soon, "8s deadline is inside the 10s threshold");
        }

        client.shutdown().await;
    }

    // ── Shutdown semantics ──────────────────────────────────────────

    #[tokio::test]
    async fn shutdown_closes_transport_and_emits_disconnected() {
        let (transport, _sent, closed) = scripted_transport(vec![]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };

        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());
        let _ = recv_or_timeout(&mut events).await; // Connected

        client.shutdown().await;

        let ev = recv_or_timeout(&mut events).await;
        if let OfferPatrolEvent::Disconnected { reason } = ev {
            assert_eq!(reason.as_deref(), Some("client shut down"));
        } else {
            panic!("expected Disconnected, got {ev:?}");
        }
        assert!(closed.load(Ordering::Relaxed));
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);

        // No reconnect after shutdown: the channel must close.
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (transport, _sent, _closed) = scripted_transport(vec![]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };

        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());
        let _ = recv_or_timeout(&mut events).await; // Connected

        client.shutdown().await;
        client.shutdown().await;
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (transport, _sent, _closed) = scripted_transport(vec![]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };

        let (client, mut events) = OfferPatrolClient::start(connector, test_config());
        let _ = recv_or_timeout(&mut events).await; // Connected

        drop(client);

        // The loop is aborted; the event channel closes without hanging.
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (transport, _sent, _closed) = scripted_transport(vec![]);
        let connector = MockConnector {
            transports: VecDeque::from([transport]),
        };

        let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());
        let _ = recv_or_timeout(&mut events).await; // Connected

        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("OfferPatrolClient"));
        assert!(debug_str.contains("player-1"));

        client.shutdown().await;
    }
}
