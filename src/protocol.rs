//! Wire-compatible protocol types for the Offer Patrol game protocol.
//!
//! Every type in this module produces and accepts the exact JSON the game
//! server speaks. Two deliberate leniencies match observed server output:
//!
//! - `expires_at` may arrive as an ISO 8601 string **with or without** a UTC
//!   offset, or as an epoch number (seconds or milliseconds). All forms decode
//!   to [`chrono::DateTime<Utc>`].
//! - `new_total_score` may arrive as a JSON float (the server's score store
//!   reports floats); it decodes to `i64` by truncation.
//!
//! Unknown message types deserialize to [`ServerMessage::Unknown`] so the
//! protocol can grow without breaking older clients.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ── Enums ───────────────────────────────────────────────────────────

/// Ground-truth classification of an offer card.
///
/// The server tags cards with the reference deployment's Portuguese labels:
/// `"legitimo"` for genuine offers and `"pirata"` for counterfeit ones.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Verdict {
    /// A genuine offer (`"legitimo"`).
    #[serde(rename = "legitimo")]
    Legitimate,
    /// A counterfeit offer (`"pirata"`).
    #[serde(rename = "pirata")]
    Fraudulent,
}

/// The player's judgment on a card, sent to the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerAction {
    /// Mark the offer as legitimate.
    Approve,
    /// Report the offer as fraudulent.
    Denounce,
}

// ── Structs ─────────────────────────────────────────────────────────

/// One offer listing the player must judge.
///
/// Created wholesale when a round begins and immutable thereafter. Note that
/// `label` carries the ground truth from round start; presentation layers must
/// not reveal it before the matching [`ServerMessage::Feedback`] arrives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Card {
    /// Server-assigned card id (UUID string).
    pub id: String,
    /// Product category (e.g. shirt, sneakers, cap).
    pub product: String,
    /// Brand shown on the listing.
    pub brand: String,
    /// Asking price in BRL.
    #[serde(rename = "priceBRL")]
    pub price_brl: f64,
    /// Original (pre-discount) price, when the listing shows one.
    #[serde(rename = "originalPriceBRL", default)]
    pub original_price_brl: Option<f64>,
    /// Free-form listing description.
    pub description: String,
    /// Shipping details shown on the listing.
    #[serde(rename = "shippingInfo")]
    pub shipping_info: String,
    /// Number of photos on the listing (the protocol carries a count, not URLs).
    pub photos: u32,
    /// Textual clues pointing at the card's own content.
    #[serde(default)]
    pub signals: Vec<String>,
    /// Difficulty tier, 1 (easy) to 3 (hard).
    pub difficulty: u8,
    /// Ground-truth label.
    pub label: Verdict,
}

/// One row of the server-ordered leaderboard.
///
/// The ordering is server-defined (descending score in the reference
/// deployment); clients must not re-sort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub nickname: String,
    pub score: i64,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
///
/// The outbound protocol has exactly one shape: a judgment on one card.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientAction {
    /// The player's judgment.
    pub action: PlayerAction,
    /// Id of the card being judged.
    pub card_id: String,
}

/// Message types sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A fresh round is starting: the card set is replaced wholesale.
    NewRound {
        cards: Vec<Card>,
        #[serde(
            serialize_with = "serialize_timestamp",
            deserialize_with = "deserialize_timestamp"
        )]
        expires_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        leaderboard: Option<Vec<LeaderboardEntry>>,
    },
    /// Full resync of the current round, sent on (re)connect mid-round.
    /// Identical in shape and effect to [`NewRound`](ServerMessage::NewRound).
    GameState {
        cards: Vec<Card>,
        #[serde(
            serialize_with = "serialize_timestamp",
            deserialize_with = "deserialize_timestamp"
        )]
        expires_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        leaderboard: Option<Vec<LeaderboardEntry>>,
    },
    /// Replacement leaderboard; no other state is affected.
    LeaderboardUpdate { leaderboard: Vec<LeaderboardEntry> },
    /// Verdict on a single submitted judgment.
    Feedback {
        card_id: String,
        correct: bool,
        correct_label: Verdict,
        score_change: i64,
        /// Authoritative cumulative score; overwrites any local value.
        #[serde(deserialize_with = "deserialize_lenient_i64")]
        new_total_score: i64,
    },
    /// The round's input window has closed. Carries the final leaderboard
    /// when the server includes one.
    RoundEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        leaderboard: Option<Vec<LeaderboardEntry>>,
    },
    /// Non-fatal server-side complaint (round inactive, cooldown, …).
    Error { message: String },
    /// Any message type this client does not recognize. Ignored on receipt.
    #[serde(other)]
    Unknown,
}

// ── Lenient field decoding ──────────────────────────────────────────

/// Accepted wire shapes for `expires_at`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampRepr {
    Epoch(f64),
    Text(String),
}

/// Decode a deadline from any of the server's timestamp spellings.
///
/// The reference server emits `datetime.utcnow().isoformat()` — an ISO 8601
/// string with **no** offset — so naive timestamps are interpreted as UTC.
/// Epoch numbers are taken as milliseconds when implausibly large for seconds.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match TimestampRepr::deserialize(deserializer)? {
        TimestampRepr::Epoch(n) => {
            let millis = if n.abs() >= 1e12 { n } else { n * 1000.0 };
            Utc.timestamp_millis_opt(millis as i64)
                .single()
                .ok_or_else(|| serde::de::Error::custom("epoch timestamp out of range"))
        }
        TimestampRepr::Text(s) => parse_iso_utc(&s).map_err(serde::de::Error::custom),
    }
}

fn serialize_timestamp<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&ts.to_rfc3339())
}

/// Parse an ISO 8601 timestamp, tolerating a missing UTC offset.
fn parse_iso_utc(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| format!("unparseable timestamp {s:?}: {e}"))
}

/// Accepted wire shapes for integer score fields.
#[derive(Deserialize)]
#[serde(untagged)]
enum LenientInt {
    Int(i64),
    Float(f64),
}

/// Decode an integer that the server may spell as a float.
fn deserialize_lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match LenientInt::deserialize(deserializer)? {
        LenientInt::Int(n) => n,
        LenientInt::Float(f) => f as i64,
    })
}
