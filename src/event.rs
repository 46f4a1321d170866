//! Typed events emitted by the Offer Patrol client.
//!
//! [`OfferPatrolEvent`]s arrive on the bounded channel returned from
//! [`OfferPatrolClient::start`](crate::client::OfferPatrolClient::start).
//! Most map one-to-one onto inbound [`ServerMessage`]s; `Connected`,
//! `Disconnected`, `CardAdvanced` and `CountdownTick` are synthesized by the
//! connection loop.

use chrono::{DateTime, Utc};

use crate::protocol::{Card, LeaderboardEntry, ServerMessage, Verdict};

/// Events delivered to the consumer of an Offer Patrol client.
#[derive(Debug, Clone, PartialEq)]
pub enum OfferPatrolEvent {
    /// The transport connection opened (initial connect or reconnect).
    Connected,
    /// The transport connection closed; reconnection is already scheduled
    /// unless the client is shutting down.
    Disconnected {
        /// Human-readable close reason, when one is known.
        reason: Option<String>,
    },
    /// A round began or the server resynced the full round state.
    RoundStarted {
        cards: Vec<Card>,
        expires_at: DateTime<Utc>,
        /// `true` when this came from a `game_state` resync rather than a
        /// fresh `new_round`.
        resync: bool,
    },
    /// The leaderboard was replaced.
    LeaderboardUpdated { leaderboard: Vec<LeaderboardEntry> },
    /// The server answered one of this player's judgments.
    Feedback {
        card_id: String,
        correct: bool,
        correct_label: Verdict,
        score_change: i64,
        new_total_score: i64,
    },
    /// The round's input window closed.
    RoundEnded {
        /// Final leaderboard, when the server sent one.
        leaderboard: Option<Vec<LeaderboardEntry>>,
    },
    /// The presented card moved to a new index after an answered card.
    CardAdvanced { index: usize },
    /// One-second countdown pulse, emitted only while a deadline is set.
    CountdownTick {
        /// Whole seconds until the deadline, clamped at zero.
        remaining_secs: i64,
        /// Seconds component for display (`remaining mod 60`).
        display_secs: i64,
        /// Advisory flag: ten seconds or less remain.
        ending_soon: bool,
    },
    /// Non-fatal warning relayed from the server's `error` message.
    ServerWarning { message: String },
}

impl OfferPatrolEvent {
    /// Convert an inbound [`ServerMessage`] into the event the consumer sees.
    ///
    /// Returns `None` for [`ServerMessage::Unknown`], which is dropped by
    /// policy rather than surfaced.
    pub fn from_server(msg: ServerMessage) -> Option<Self> {
        match msg {
            ServerMessage::NewRound {
                cards, expires_at, ..
            } => Some(Self::RoundStarted {
                cards,
                expires_at,
                resync: false,
            }),
            ServerMessage::GameState {
                cards, expires_at, ..
            } => Some(Self::RoundStarted {
                cards,
                expires_at,
                resync: true,
            }),
            ServerMessage::LeaderboardUpdate { leaderboard } => {
                Some(Self::LeaderboardUpdated { leaderboard })
            }
            ServerMessage::Feedback {
                card_id,
                correct,
                correct_label,
                score_change,
                new_total_score,
            } => Some(Self::Feedback {
                card_id,
                correct,
                correct_label,
                score_change,
                new_total_score,
            }),
            ServerMessage::RoundEnd { leaderboard } => Some(Self::RoundEnded { leaderboard }),
            ServerMessage::Error { message } => Some(Self::ServerWarning { message }),
            ServerMessage::Unknown => None,
        }
    }
}
