#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end client tests against a scripted mock transport.
//!
//! Frames are shaped the way the real backend emits them (naive ISO
//! timestamps, float cumulative scores) to exercise the lenient decode paths
//! along with the full connect / play / reconnect lifecycle.

mod common;

use std::time::Duration;

use common::{
    error_json, feedback_json, game_state_json, leaderboard_update_json, new_round_json,
    round_end_json, test_identity, MockConnector, MockTransport,
};
use offer_patrol_client::protocol::{ClientAction, PlayerAction, Verdict};
use offer_patrol_client::{
    ConnectionState, OfferPatrolClient, OfferPatrolConfig, OfferPatrolError, OfferPatrolEvent,
};
use tokio::sync::mpsc;

fn test_config() -> OfferPatrolConfig {
    OfferPatrolConfig::new(test_identity())
        .with_reconnect_delay(Duration::from_millis(20))
        .with_advance_delay(Duration::from_millis(20))
}

async fn recv_or_timeout(events: &mut mpsc::Receiver<OfferPatrolEvent>) -> OfferPatrolEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

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

// ── Full round flow ─────────────────────────────────────────────────

#[tokio::test]
async fn full_round_flow() {
    // The server side is played step by step so the client's guarded submit
    // cannot race later frames.
    let (transport, sent, _closed) =
        MockTransport::new(vec![Some(Ok(game_state_json(&["c1", "c2"], 45)))]);
    let server = transport.server_script();
    let connector = MockConnector::new(vec![transport]);

    let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

    // Connected, then the server's resync replaces local state.
    let ev = recv_or_timeout(&mut events).await;
    assert!(matches!(ev, OfferPatrolEvent::Connected));

    let ev = recv_or_timeout(&mut events).await;
    if let OfferPatrolEvent::RoundStarted { cards, resync, .. } = ev {
        assert!(resync);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].id, "c1");
        // camelCase wire fields landed on the snake_case struct.
        assert!((cards[0].price_brl - 89.9).abs() < f64::EPSILON);
        assert_eq!(cards[0].label, Verdict::Legitimate);
    } else {
        panic!("expected RoundStarted, got {ev:?}");
    }

    // The naive-format deadline parsed as UTC.
    let remaining = client.seconds_remaining().await.unwrap();
    assert!((40..=45).contains(&remaining), "got {remaining}");

    // Submit a judgment for the presented card.
    assert!(client.denounce("c1").await);

    // The server answers the judgment.
    server.send(feedback_json("c1", true, 60, 60.0));

    // Feedback lands: score adopted verbatim, card resolved.
    let ev = recv_until(&mut events, |e| matches!(e, OfferPatrolEvent::Feedback { .. })).await;
    if let OfferPatrolEvent::Feedback {
        card_id,
        correct,
        new_total_score,
        ..
    } = ev
    {
        assert_eq!(card_id, "c1");
        assert!(correct);
        assert_eq!(new_total_score, 60, "float wire score decodes to i64");
    }
    assert_eq!(client.score().await, 60);

    // Navigation auto-advances to the next card after the delay.
    let ev = recv_until(&mut events, |e| {
        matches!(e, OfferPatrolEvent::CardAdvanced { .. })
    })
    .await;
    assert!(matches!(ev, OfferPatrolEvent::CardAdvanced { index: 1 }));
    assert_eq!(client.current_card().await.unwrap().id, "c2");

    // Round end clears the board and carries the final standings.
    server.send(round_end_json(&[("Vigilante 🛡️", 60), ("Esperto 🦈", 40)]));
    let ev = recv_until(&mut events, |e| {
        matches!(e, OfferPatrolEvent::RoundEnded { .. })
    })
    .await;
    if let OfferPatrolEvent::RoundEnded { leaderboard } = ev {
        let board = leaderboard.unwrap();
        assert_eq!(board[0].nickname, "Vigilante 🛡️");
        assert_eq!(board[0].score, 60);
    }
    assert!(client.seconds_remaining().await.is_none());
    assert!(client.current_card().await.is_none());

    // Exactly one outbound message was sent, wire-shaped.
    {
        let messages = sent.lock().unwrap();
        assert_eq!(messages.len(), 1);
        let action: ClientAction = serde_json::from_str(&messages[0]).unwrap();
        assert_eq!(action.action, PlayerAction::Denounce);
        assert_eq!(action.card_id, "c1");
    }

    client.shutdown().await;
}

// ── Reconnection ────────────────────────────────────────────────────

#[tokio::test]
async fn reconnect_resync_replaces_stale_state() {
    // First session: a round begins, then the connection drops mid-round.
    let (first, _s1, _c1) = MockTransport::new(vec![
        Some(Ok(new_round_json(&["old1", "old2", "old3"], 60))),
        Some(Err(OfferPatrolError::TransportReceive(
            "connection reset".into(),
        ))),
    ]);
    // Second session: the server resyncs a different round.
    let (second, _s2, _c2) = MockTransport::new(vec![Some(Ok(game_state_json(&["fresh"], 30)))]);

    let connector = MockConnector::new(vec![first, second]);
    let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

    let _ = recv_until(&mut events, |e| {
        matches!(e, OfferPatrolEvent::RoundStarted { .. })
    })
    .await;
    assert_eq!(client.snapshot().await.cards.len(), 3);

    let ev = recv_until(&mut events, |e| {
        matches!(e, OfferPatrolEvent::Disconnected { .. })
    })
    .await;
    if let OfferPatrolEvent::Disconnected { reason } = ev {
        assert!(reason.unwrap().contains("connection reset"));
    }

    // Identity is stable across the reconnect; the server recognizes the
    // same player and resyncs.
    assert_eq!(client.identity().id, test_identity().id);

    let ev = recv_until(&mut events, |e| {
        matches!(e, OfferPatrolEvent::RoundStarted { .. })
    })
    .await;
    if let OfferPatrolEvent::RoundStarted { cards, resync, .. } = ev {
        assert!(resync);
        assert_eq!(cards[0].id, "fresh");
    }

    // Local state is the resync, wholesale — nothing from the old round.
    let snapshot = client.snapshot().await;
    assert_eq!(snapshot.cards.len(), 1);
    assert_eq!(snapshot.current_index, 0);
    assert!(snapshot.feedback.is_empty());
    assert_eq!(snapshot.leaderboard.len(), 1);
    assert_eq!(client.connection_state(), ConnectionState::Connected);

    client.shutdown().await;
}

// ── Server authority ────────────────────────────────────────────────

#[tokio::test]
async fn cumulative_score_is_adopted_never_computed() {
    // The server's totals deliberately disagree with any local sum: the
    // client must adopt each declared total verbatim.
    let (connector, _sent, _closed) = MockConnector::single(vec![
        Some(Ok(new_round_json(&["a", "b"], 60))),
        Some(Ok(feedback_json("a", true, 60, 1000.0))),
        Some(Ok(feedback_json("b", false, -25, 7.0))),
    ]);

    let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

    let _ = recv_until(&mut events, |e| {
        matches!(e, OfferPatrolEvent::Feedback { card_id, .. } if card_id == "a")
    })
    .await;
    assert_eq!(client.score().await, 1000);

    let _ = recv_until(&mut events, |e| {
        matches!(e, OfferPatrolEvent::Feedback { card_id, .. } if card_id == "b")
    })
    .await;
    assert_eq!(client.score().await, 7);

    client.shutdown().await;
}

#[tokio::test]
async fn leaderboard_ordering_is_adopted_verbatim() {
    // Deliberately not sorted by score — the client must not reorder.
    let (connector, _sent, _closed) = MockConnector::single(vec![Some(Ok(
        leaderboard_update_json(&[("Certeiro 🎯", 10), ("Preciso ⚡", 500)]),
    ))]);

    let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

    let ev = recv_until(&mut events, |e| {
        matches!(e, OfferPatrolEvent::LeaderboardUpdated { .. })
    })
    .await;
    if let OfferPatrolEvent::LeaderboardUpdated { leaderboard } = ev {
        assert_eq!(leaderboard[0].nickname, "Certeiro 🎯");
        assert_eq!(leaderboard[1].score, 500);
    }

    client.shutdown().await;
}

// ── Guarded submission ──────────────────────────────────────────────

#[tokio::test]
async fn submit_outside_round_is_dropped() {
    let (connector, sent, _closed) = MockConnector::single(vec![
        Some(Ok(new_round_json(&["a"], 60))),
        Some(Ok(feedback_json("a", true, 60, 60.0))),
    ]);

    let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

    let _ = recv_until(&mut events, |e| matches!(e, OfferPatrolEvent::Feedback { .. })).await;

    // Already answered, and never part of the round: both drop.
    assert!(!client.approve("a").await);
    assert!(!client.approve("ghost").await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sent.lock().unwrap().is_empty());

    client.shutdown().await;
}

// ── Robustness ──────────────────────────────────────────────────────

#[tokio::test]
async fn warnings_and_noise_do_not_disturb_the_round() {
    let (connector, _sent, _closed) = MockConnector::single(vec![
        Some(Ok(new_round_json(&["a"], 60))),
        Some(Ok(error_json("Ação em cooldown."))),
        Some(Ok(r#"{"type":"season_reset","flag":true}"#.to_string())),
        Some(Ok("garbage {{{".to_string())),
        Some(Ok(feedback_json("a", true, 60, 60.0))),
    ]);

    let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());

    let ev = recv_until(&mut events, |e| {
        matches!(e, OfferPatrolEvent::ServerWarning { .. })
    })
    .await;
    if let OfferPatrolEvent::ServerWarning { message } = ev {
        assert_eq!(message, "Ação em cooldown.");
    }

    // The unknown type and the malformed frame vanish; the feedback after
    // them still arrives and the round is intact.
    let _ = recv_until(&mut events, |e| matches!(e, OfferPatrolEvent::Feedback { .. })).await;
    assert_eq!(client.snapshot().await.cards.len(), 1);
    assert_eq!(client.score().await, 60);

    client.shutdown().await;
}

#[tokio::test]
async fn shutdown_yields_final_disconnected_then_closes_channel() {
    let (connector, _sent, closed) = MockConnector::single(vec![]);

    let (mut client, mut events) = OfferPatrolClient::start(connector, test_config());
    let _ = recv_or_timeout(&mut events).await; // Connected

    client.shutdown().await;

    let ev = recv_or_timeout(&mut events).await;
    assert!(matches!(ev, OfferPatrolEvent::Disconnected { .. }));
    assert!(closed.load(std::sync::atomic::Ordering::Relaxed));
    assert!(events.recv().await.is_none(), "no reconnect after shutdown");
}
