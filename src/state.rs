//! Game state store: the single source of truth for round state.
//!
//! [`GameState`] holds the current card set, per-card feedback, the
//! authoritative cumulative score, the leaderboard, the round deadline, and
//! the navigation index of the presented card. Every mutation method maps
//! one-to-one onto a dispatcher rule in the connection loop; no other code
//! path writes to it, which keeps feedback and score from drifting apart
//! when a user action races an inbound message.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};

use crate::protocol::{Card, LeaderboardEntry, Verdict};

// ── Connection state ────────────────────────────────────────────────

/// Lifecycle state of the transport connection.
///
/// Owned exclusively by the connection loop; transitions are cyclic
/// (`Disconnected → Connecting → Connected → Disconnected → …`) with no
/// terminal state while the client runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Lock-free holder for [`ConnectionState`], readable from the client handle
/// without touching the game-state mutex.
#[derive(Debug)]
pub(crate) struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub(crate) fn load(&self) -> ConnectionState {
        match self.0.load(Ordering::Acquire) {
            x if x == ConnectionState::Connecting as u8 => ConnectionState::Connecting,
            x if x == ConnectionState::Connected as u8 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

// ── Feedback ────────────────────────────────────────────────────────

/// The server's verdict on one submitted judgment, kept per card id.
///
/// At most one entry exists per card per round; presence implies the card's
/// action has been sent and must not be sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardFeedback {
    pub correct: bool,
    pub correct_label: Verdict,
    pub score_change: i64,
    pub new_total_score: i64,
}

// ── Game state ──────────────────────────────────────────────────────

/// Mutable round state, shared behind `Arc<tokio::sync::Mutex<…>>` between
/// the client handle (reads) and the connection loop (writes).
#[derive(Debug, Default)]
pub struct GameState {
    cards: Vec<Card>,
    feedback: HashMap<String, CardFeedback>,
    score: i64,
    leaderboard: Vec<LeaderboardEntry>,
    deadline: Option<DateTime<Utc>>,
    current_index: usize,
    /// Bumped whenever the card set is replaced or cleared. Scheduled
    /// navigation advances carry the serial they were created under and are
    /// ignored once it goes stale.
    round_serial: u64,
}

/// Read-only copy of the full game state at one instant.
#[derive(Debug, Clone, Default)]
pub struct GameSnapshot {
    pub cards: Vec<Card>,
    pub feedback: HashMap<String, CardFeedback>,
    pub score: i64,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub deadline: Option<DateTime<Utc>>,
    pub current_index: usize,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Dispatcher rules ────────────────────────────────────────────

    /// Atomically replace the round: new card set, new deadline, feedback
    /// cleared, navigation reset. The leaderboard is adopted only when the
    /// message carried one; otherwise the previous board stays.
    pub fn begin_round(
        &mut self,
        cards: Vec<Card>,
        expires_at: DateTime<Utc>,
        leaderboard: Option<Vec<LeaderboardEntry>>,
    ) {
        self.cards = cards;
        self.deadline = Some(expires_at);
        self.feedback.clear();
        self.current_index = 0;
        self.round_serial = self.round_serial.wrapping_add(1);
        if let Some(board) = leaderboard {
            self.leaderboard = board;
        }
    }

    /// Replace the leaderboard; nothing else changes. Ordering is taken as
    /// the server sent it.
    pub fn set_leaderboard(&mut self, leaderboard: Vec<LeaderboardEntry>) {
        self.leaderboard = leaderboard;
    }

    /// Record the server's verdict for a card and adopt the authoritative
    /// cumulative score.
    ///
    /// Returns `true` when the verdict resolves the currently presented card,
    /// which is the cue to schedule a navigation advance.
    pub fn apply_feedback(&mut self, card_id: &str, feedback: CardFeedback) -> bool {
        self.feedback.insert(card_id.to_string(), feedback);
        self.score = feedback.new_total_score;
        self.current_card().is_some_and(|card| card.id == card_id)
    }

    /// Close the round: deadline and cards are cleared. The feedback map is
    /// left as-is since no cards remain to display.
    pub fn end_round(&mut self, leaderboard: Option<Vec<LeaderboardEntry>>) {
        self.deadline = None;
        self.cards.clear();
        self.current_index = 0;
        self.round_serial = self.round_serial.wrapping_add(1);
        if let Some(board) = leaderboard {
            self.leaderboard = board;
        }
    }

    // ── Round navigation ────────────────────────────────────────────

    /// Move the presented card forward by one, clamping at the last card.
    /// Never wraps, never advances past the end.
    pub fn advance_card(&mut self) {
        if self.current_index + 1 < self.cards.len() {
            self.current_index += 1;
        }
    }

    /// The currently presented card, if a round is in progress.
    pub fn current_card(&self) -> Option<&Card> {
        self.cards.get(self.current_index)
    }

    /// Zero-based index of the presented card.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Serial of the current round's card set. A scheduled advance is only
    /// valid while the serial it was created under still matches.
    pub fn round_serial(&self) -> u64 {
        self.round_serial
    }

    // ── Reads & guards ──────────────────────────────────────────────

    /// Whether a card has been answered, derived strictly from feedback
    /// presence.
    pub fn is_answered(&self, card_id: &str) -> bool {
        self.feedback.contains_key(card_id)
    }

    /// Guard for outbound actions: the card must belong to the current round
    /// and must not have been answered already.
    pub fn can_submit(&self, card_id: &str) -> bool {
        self.cards.iter().any(|card| card.id == card_id) && !self.is_answered(card_id)
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn feedback(&self, card_id: &str) -> Option<&CardFeedback> {
        self.feedback.get(card_id)
    }

    /// Last server-declared cumulative score. Never computed locally.
    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    /// Server-declared round deadline; `None` outside an active round.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Copy out the full state for consumers that need a coherent view.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            cards: self.cards.clone(),
            feedback: self.feedback.clone(),
            score: self.score,
            leaderboard: self.leaderboard.clone(),
            deadline: self.deadline,
            current_index: self.current_index,
        }
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
    use chrono::TimeZone;

    fn card(id: &str) -> Card {
        Card {
            id: id.to_string(),
            product: "camiseta".into(),
            brand: "Esportiva".into(),
            price_brl: 79.9,
            original_price_brl: Some(129.9),
            description: "Camiseta oficial de treino".into(),
            shipping_info: "Envio com rastreio, 5 dias".into(),
            photos: 3,
            signals: vec!["preço coerente".into()],
            difficulty: 1,
            label: Verdict::Legitimate,
        }
    }

    fn deadline() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_060, 0).single().unwrap()
    }

    fn verdict(total: i64) -> CardFeedback {
        CardFeedback {
            correct: true,
            correct_label: Verdict::Legitimate,
            score_change: 10,
            new_total_score: total,
        }
    }

    #[test]
    fn begin_round_resets_feedback_and_navigation() {
        let mut state = GameState::new();
        state.begin_round(vec![card("a"), card("b")], deadline(), None);
        assert!(state.apply_feedback("a", verdict(30)));
        state.advance_card();

        state.begin_round(vec![card("c"), card("d"), card("e")], deadline(), None);
        assert_eq!(state.current_index(), 0);
        assert!(!state.is_answered("a"));
        assert!(!state.is_answered("c"));
        assert_eq!(state.current_card().unwrap().id, "c");
    }

    #[test]
    fn begin_round_keeps_leaderboard_when_absent() {
        let mut state = GameState::new();
        state.set_leaderboard(vec![LeaderboardEntry {
            nickname: "Sagaz 🦊".into(),
            score: 120,
        }]);
        state.begin_round(vec![card("a")], deadline(), None);
        assert_eq!(state.leaderboard().len(), 1);

        state.begin_round(
            vec![card("b")],
            deadline(),
            Some(vec![
                LeaderboardEntry {
                    nickname: "Veloz ⚡".into(),
                    score: 200,
                },
                LeaderboardEntry {
                    nickname: "Sagaz 🦊".into(),
                    score: 120,
                },
            ]),
        );
        assert_eq!(state.leaderboard().len(), 2);
    }

    #[test]
    fn feedback_overwrites_score_with_server_value() {
        let mut state = GameState::new();
        state.begin_round(vec![card("a"), card("b")], deadline(), None);

        state.apply_feedback("a", verdict(110));
        assert_eq!(state.score(), 110);

        // A repeat for the same card overwrites with the server-declared value.
        state.apply_feedback("a", verdict(110));
        assert_eq!(state.score(), 110);

        state.apply_feedback("b", verdict(90));
        assert_eq!(state.score(), 90);
    }

    #[test]
    fn feedback_for_presented_card_signals_advance() {
        let mut state = GameState::new();
        state.begin_round(vec![card("a"), card("b")], deadline(), None);
        assert!(state.apply_feedback("a", verdict(10)));
        state.advance_card();
        assert!(!state.apply_feedback("a", verdict(10)));
        assert!(state.apply_feedback("b", verdict(20)));
    }

    #[test]
    fn answered_card_cannot_be_submitted_again() {
        let mut state = GameState::new();
        state.begin_round(vec![card("a")], deadline(), None);
        assert!(state.can_submit("a"));
        state.apply_feedback("a", verdict(10));
        assert!(!state.can_submit("a"));
    }

    #[test]
    fn unknown_card_cannot_be_submitted() {
        let mut state = GameState::new();
        state.begin_round(vec![card("a")], deadline(), None);
        assert!(!state.can_submit("zzz"));
    }

    #[test]
    fn advance_clamps_at_last_card() {
        let mut state = GameState::new();
        state.begin_round(vec![card("a"), card("b")], deadline(), None);
        state.advance_card();
        assert_eq!(state.current_index(), 1);
        state.advance_card();
        assert_eq!(state.current_index(), 1, "index must clamp, not wrap");
    }

    #[test]
    fn end_round_clears_deadline_and_cards_but_not_feedback() {
        let mut state = GameState::new();
        state.begin_round(vec![card("a")], deadline(), None);
        state.apply_feedback("a", verdict(40));

        state.end_round(None);
        assert!(state.deadline().is_none());
        assert!(state.cards().is_empty());
        assert!(state.current_card().is_none());
        assert!(state.is_answered("a"));
        assert_eq!(state.score(), 40);
    }

    #[test]
    fn end_round_adopts_final_leaderboard() {
        let mut state = GameState::new();
        state.begin_round(vec![card("a")], deadline(), None);
        state.end_round(Some(vec![LeaderboardEntry {
            nickname: "Preciso 🎯".into(),
            score: 300,
        }]));
        assert_eq!(state.leaderboard().len(), 1);
        assert_eq!(state.leaderboard()[0].score, 300);
    }

    #[test]
    fn round_serial_changes_when_cards_are_replaced_or_cleared() {
        let mut state = GameState::new();
        let initial = state.round_serial();

        state.begin_round(vec![card("a")], deadline(), None);
        let first = state.round_serial();
        assert_ne!(first, initial);

        // Advancing and feedback do not invalidate the round.
        state.apply_feedback("a", verdict(10));
        state.advance_card();
        assert_eq!(state.round_serial(), first);

        state.begin_round(vec![card("b")], deadline(), None);
        let second = state.round_serial();
        assert_ne!(second, first);

        state.end_round(None);
        assert_ne!(state.round_serial(), second);
    }

    #[test]
    fn connection_state_round_trips_through_atomic() {
        let holder = AtomicConnectionState::new(ConnectionState::Disconnected);
        assert_eq!(holder.load(), ConnectionState::Disconnected);
        holder.store(ConnectionState::Connecting);
        assert_eq!(holder.load(), ConnectionState::Connecting);
        holder.store(ConnectionState::Connected);
        assert_eq!(holder.load(), ConnectionState::Connected);
    }
}
