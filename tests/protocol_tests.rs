#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Protocol serialization tests for the Offer Patrol Client.
//!
//! Verifies round-trip serialization of every protocol type plus JSON
//! fixtures that match real server output byte-for-byte quirks: camelCase
//! card fields, Portuguese label strings, naive ISO deadlines, and float
//! cumulative scores.

mod common;

use chrono::{Datelike, TimeZone, Timelike, Utc};
use common::card_json;
use offer_patrol_client::protocol::{
    Card, ClientAction, LeaderboardEntry, PlayerAction, ServerMessage, Verdict,
};
use serde_json::json;

// ════════════════════════════════════════════════════════════════════
// Helper
// ════════════════════════════════════════════════════════════════════

/// Serialize `val` to JSON, then deserialize back to `T` and return it.
fn round_trip<T: serde::Serialize + serde::de::DeserializeOwned>(val: &T) -> T {
    let json = serde_json::to_string(val).expect("serialize");
    serde_json::from_str(&json).expect("deserialize")
}

fn sample_card(id: &str) -> Card {
    serde_json::from_value(card_json(id, "pirata")).expect("card fixture")
}

// ════════════════════════════════════════════════════════════════════
// Outbound: ClientAction
// ════════════════════════════════════════════════════════════════════

#[test]
fn client_action_wire_shape() {
    let action = ClientAction {
        action: PlayerAction::Approve,
        card_id: "card-7".into(),
    };
    let value = serde_json::to_value(&action).expect("serialize");
    assert_eq!(value, json!({ "action": "approve", "card_id": "card-7" }));
}

#[test]
fn client_action_denounce_is_lowercase() {
    let action = ClientAction {
        action: PlayerAction::Denounce,
        card_id: "c".into(),
    };
    let json = serde_json::to_string(&action).expect("serialize");
    assert!(json.contains(r#""action":"denounce""#));
    assert_eq!(round_trip(&action), action);
}

// ════════════════════════════════════════════════════════════════════
// Card & Verdict
// ════════════════════════════════════════════════════════════════════

#[test]
fn card_decodes_camel_case_fields() {
    let card = sample_card("abc");
    assert_eq!(card.id, "abc");
    assert!((card.price_brl - 89.9).abs() < f64::EPSILON);
    assert_eq!(card.original_price_brl, Some(349.9));
    assert_eq!(card.shipping_info, "envio internacional, 40 dias");
    assert_eq!(card.photos, 2);
    assert_eq!(card.signals.len(), 2);
    assert_eq!(card.difficulty, 3);
    assert_eq!(card.label, Verdict::Fraudulent);
}

#[test]
fn card_serializes_camel_case_fields() {
    let card = sample_card("abc");
    let value = serde_json::to_value(&card).expect("serialize");
    assert!(value.get("priceBRL").is_some());
    assert!(value.get("originalPriceBRL").is_some());
    assert!(value.get("shippingInfo").is_some());
    assert!(value.get("price_brl").is_none());
}

#[test]
fn card_tolerates_missing_optional_fields() {
    // Legitimate cards often have no slashed original price and no signals.
    let card: Card = serde_json::from_value(json!({
        "id": "plain",
        "product": "boné",
        "brand": "AbaReta",
        "priceBRL": 79.0,
        "description": "Boné oficial, nota fiscal",
        "shippingInfo": "envio nacional",
        "photos": 5,
        "label": "legitimo",
        "difficulty": 1
    }))
    .expect("deserialize");
    assert_eq!(card.original_price_brl, None);
    assert!(card.signals.is_empty());
    assert_eq!(card.label, Verdict::Legitimate);
}

#[test]
fn verdict_uses_portuguese_wire_strings() {
    assert_eq!(
        serde_json::to_string(&Verdict::Legitimate).unwrap(),
        r#""legitimo""#
    );
    assert_eq!(
        serde_json::to_string(&Verdict::Fraudulent).unwrap(),
        r#""pirata""#
    );
    let v: Verdict = serde_json::from_str(r#""pirata""#).unwrap();
    assert_eq!(v, Verdict::Fraudulent);
}

// ════════════════════════════════════════════════════════════════════
// ServerMessage variants
// ════════════════════════════════════════════════════════════════════

#[test]
fn new_round_round_trip() {
    let msg = ServerMessage::NewRound {
        cards: vec![sample_card("a"), sample_card("b")],
        expires_at: Utc.with_ymd_and_hms(2026, 8, 28, 12, 30, 45).unwrap(),
        leaderboard: None,
    };
    let deser = round_trip(&msg);
    if let ServerMessage::NewRound {
        cards, expires_at, ..
    } = deser
    {
        assert_eq!(cards.len(), 2);
        assert_eq!(expires_at.minute(), 30);
    } else {
        panic!("expected NewRound");
    }
}

#[test]
fn game_state_round_trip_with_leaderboard() {
    let msg = ServerMessage::GameState {
        cards: vec![sample_card("a")],
        expires_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        leaderboard: Some(vec![LeaderboardEntry {
            nickname: "Sagaz 🦊".into(),
            score: 120,
        }]),
    };
    let deser = round_trip(&msg);
    if let ServerMessage::GameState { leaderboard, .. } = deser {
        assert_eq!(leaderboard.unwrap()[0].score, 120);
    } else {
        panic!("expected GameState");
    }
}

#[test]
fn feedback_round_trip() {
    let msg = ServerMessage::Feedback {
        card_id: "c1".into(),
        correct: false,
        correct_label: Verdict::Legitimate,
        score_change: -25,
        new_total_score: 35,
    };
    assert_eq!(round_trip(&msg), msg);
}

#[test]
fn round_end_without_leaderboard_round_trip() {
    let msg = ServerMessage::RoundEnd { leaderboard: None };
    assert_eq!(round_trip(&msg), msg);
    // And the field is genuinely absent on the wire.
    let value = serde_json::to_value(&msg).unwrap();
    assert!(value.get("leaderboard").is_none());
}

#[test]
fn error_round_trip() {
    let msg = ServerMessage::Error {
        message: "Nenhuma rodada ativa.".into(),
    };
    assert_eq!(round_trip(&msg), msg);
}

// ════════════════════════════════════════════════════════════════════
// Fixtures matching real server output
// ════════════════════════════════════════════════════════════════════

#[test]
fn new_round_fixture_with_naive_timestamp() {
    // The backend emits `utcnow().isoformat()` — no offset suffix.
    let raw = json!({
        "type": "new_round",
        "cards": [card_json("c1", "pirata")],
        "expires_at": "2026-08-28T15:04:05.123456",
    })
    .to_string();

    let msg: ServerMessage = serde_json::from_str(&raw).expect("deserialize");
    if let ServerMessage::NewRound { expires_at, .. } = msg {
        assert_eq!(expires_at.year(), 2026);
        assert_eq!(expires_at.hour(), 15);
        assert_eq!(expires_at.second(), 5);
        assert_eq!(expires_at.timezone(), Utc);
    } else {
        panic!("expected NewRound");
    }
}

#[test]
fn expires_at_accepts_rfc3339_with_offset() {
    let raw = json!({
        "type": "new_round",
        "cards": [],
        "expires_at": "2026-08-28T12:00:00-03:00",
    })
    .to_string();

    let msg: ServerMessage = serde_json::from_str(&raw).expect("deserialize");
    if let ServerMessage::NewRound { expires_at, .. } = msg {
        // -03:00 normalizes to UTC.
        assert_eq!(expires_at.hour(), 15);
    } else {
        panic!("expected NewRound");
    }
}

#[test]
fn expires_at_accepts_epoch_seconds_and_millis() {
    for (repr, expected_year) in [("1782000000", 2026), ("1782000000000", 2026)] {
        let raw = format!(r#"{{"type":"new_round","cards":[],"expires_at":{repr}}}"#);
        let msg: ServerMessage = serde_json::from_str(&raw).expect("deserialize");
        if let ServerMessage::NewRound { expires_at, .. } = msg {
            assert_eq!(expires_at.year(), expected_year, "repr {repr}");
        } else {
            panic!("expected NewRound");
        }
    }
}

#[test]
fn feedback_fixture_with_float_total_score() {
    // The score store reports floats (e.g. "60.0"); must decode to i64.
    let raw = json!({
        "type": "feedback",
        "card_id": "c1",
        "correct": true,
        "correct_label": "pirata",
        "score_change": 60,
        "new_total_score": 60.0,
    })
    .to_string();

    let msg: ServerMessage = serde_json::from_str(&raw).expect("deserialize");
    if let ServerMessage::Feedback {
        new_total_score, ..
    } = msg
    {
        assert_eq!(new_total_score, 60);
    } else {
        panic!("expected Feedback");
    }
}

#[test]
fn round_end_fixture_with_final_leaderboard() {
    let raw = json!({
        "type": "round_end",
        "leaderboard": [
            { "nickname": "Implacavel 🦅", "score": 145 },
            { "nickname": "Veloz ⚡", "score": 90 },
        ],
    })
    .to_string();

    let msg: ServerMessage = serde_json::from_str(&raw).expect("deserialize");
    if let ServerMessage::RoundEnd { leaderboard } = msg {
        let board = leaderboard.unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].nickname, "Implacavel 🦅");
    } else {
        panic!("expected RoundEnd");
    }
}

#[test]
fn unknown_message_type_deserializes_to_unknown() {
    let raw = json!({ "type": "matchmaking_hint", "ttl": 30 }).to_string();
    let msg: ServerMessage = serde_json::from_str(&raw).expect("deserialize");
    assert_eq!(msg, ServerMessage::Unknown);
}

#[test]
fn missing_required_field_is_an_error() {
    // feedback without card_id must fail loudly at the decode layer (the
    // dispatcher then drops the frame).
    let raw = json!({ "type": "feedback", "correct": true }).to_string();
    assert!(serde_json::from_str::<ServerMessage>(&raw).is_err());
}
