//! # Autoplay Demo
//!
//! Demonstrates a complete Offer Patrol client lifecycle:
//!
//! 1. Load (or create) a persistent player identity
//! 2. Connect to the game server via WebSocket, with automatic reconnection
//! 3. React to rounds, judge cards with a naive heuristic, watch feedback
//! 4. Shut down gracefully on Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! # Start an Offer Patrol server on localhost:8000, then:
//! cargo run --example play
//!
//! # Override the server URL:
//! OFFER_PATROL_URL=ws://my-server:8000/ws cargo run --example play
//! ```

use offer_patrol_client::{
    identity::{self, FileIdentityStore},
    transports::WebSocketConnector,
    Card, OfferPatrolClient, OfferPatrolConfig, OfferPatrolEvent,
};

/// Default server URL when `OFFER_PATROL_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8000/ws";

/// Where the player id persists between runs.
const IDENTITY_FILE: &str = ".offer_patrol_id";

/// A deliberately naive fraud heuristic: deep discounts and listings with
/// suspicion signals get denounced, everything else is approved. It does not
/// peek at `card.label` — that would defeat the game.
fn looks_fraudulent(card: &Card) -> bool {
    let deep_discount = card
        .original_price_brl
        .map(|orig| orig > 0.0 && card.price_brl / orig < 0.5)
        .unwrap_or(false);
    deep_discount || card.signals.len() >= 2
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Identity ────────────────────────────────────────────────────
    // The player id survives restarts so the server keeps our score; the
    // nickname is rerolled each run.
    let store = FileIdentityStore::new(IDENTITY_FILE);
    let player = identity::get_or_create(&store)?;
    tracing::info!("Playing as {} ({})", player.nickname, player.id);

    // ── Connect ─────────────────────────────────────────────────────
    let url = std::env::var("OFFER_PATROL_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    tracing::info!("Connecting to {url}");

    let connector = WebSocketConnector::new(&url, player.clone());

    // Start the client. This spawns a background task that owns the
    // connection (reconnecting forever) and emits events on `event_rx`.
    let (mut client, mut event_rx) =
        OfferPatrolClient::start(connector, OfferPatrolConfig::new(player));

    // ── Event loop ──────────────────────────────────────────────────
    // Use `tokio::select!` to listen for both game events and Ctrl+C.
    loop {
        tokio::select! {
            // Branch 1: Incoming event from the game (or transport layer).
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    // ── Connection lifecycle ─────────────────────────
                    OfferPatrolEvent::Connected => {
                        tracing::info!("Connected, awaiting round state…");
                    }

                    OfferPatrolEvent::Disconnected { reason } => {
                        // Not fatal — the client reconnects on its own.
                        tracing::warn!(
                            "Disconnected: {} (reconnecting…)",
                            reason.as_deref().unwrap_or("server closed")
                        );
                    }

                    // ── Round lifecycle ──────────────────────────────
                    OfferPatrolEvent::RoundStarted { cards, resync, .. } => {
                        tracing::info!(
                            "{} with {} card(s)",
                            if resync { "Round resynced" } else { "Round started" },
                            cards.len()
                        );
                        judge_current(&client).await;
                    }

                    OfferPatrolEvent::CardAdvanced { index } => {
                        tracing::info!("Moved on to card #{index}");
                        judge_current(&client).await;
                    }

                    OfferPatrolEvent::Feedback {
                        correct,
                        score_change,
                        new_total_score,
                        ..
                    } => {
                        tracing::info!(
                            "{} ({:+} → total {})",
                            if correct { "Acertou!" } else { "Errou." },
                            score_change,
                            new_total_score
                        );
                    }

                    OfferPatrolEvent::RoundEnded { leaderboard } => {
                        tracing::info!("Round over.");
                        if let Some(board) = leaderboard {
                            for (rank, entry) in board.iter().enumerate() {
                                tracing::info!(
                                    "  #{} {} — {}",
                                    rank + 1,
                                    entry.nickname,
                                    entry.score
                                );
                            }
                        }
                    }

                    OfferPatrolEvent::LeaderboardUpdated { leaderboard } => {
                        tracing::debug!("Leaderboard: {} player(s)", leaderboard.len());
                    }

                    OfferPatrolEvent::CountdownTick { display_secs, ending_soon, .. } => {
                        if ending_soon {
                            tracing::info!("⏱ {display_secs}s left!");
                        }
                    }

                    OfferPatrolEvent::ServerWarning { message } => {
                        tracing::warn!("Server says: {message}");
                    }
                }
            }

            // Branch 2: Ctrl+C — shut down gracefully.
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    let final_score = client.score().await;
    client.shutdown().await;
    tracing::info!("Final score: {final_score}. Goodbye!");
    Ok(())
}

/// Judge whatever card is currently presented, if any.
async fn judge_current(client: &OfferPatrolClient) {
    let Some(card) = client.current_card().await else {
        return;
    };
    let fraud = looks_fraudulent(&card);
    tracing::info!(
        "Judging {} «{} — {}» (R$ {:.2}): {}",
        card.id,
        card.brand,
        card.product,
        card.price_brl,
        if fraud { "pirata" } else { "legitimo" }
    );
    let accepted = if fraud {
        client.denounce(&card.id).await
    } else {
        client.approve(&card.id).await
    };
    if !accepted {
        tracing::debug!("Judgment for {} was dropped", card.id);
    }
}
