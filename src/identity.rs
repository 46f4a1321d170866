//! Player identity: a persisted opaque id plus a per-session nickname.
//!
//! The id is generated once per device and survives restarts through an
//! [`IdentityStore`]; the nickname is decorative, rebuilt from fixed
//! vocabularies on every call, and not required to be stable.

use std::path::PathBuf;
use std::sync::Mutex;

use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::error::Result;

/// Adjectives used to build session nicknames.
const ADJECTIVES: &[&str] = &[
    "Atento", "Esperto", "Sagaz", "Veloz", "Astuto", "Vigilante", "Preciso", "Implacavel",
    "Certeiro", "Perspicaz",
];

/// Emoji markers appended to session nicknames.
const MARKERS: &[&str] = &["🕵️", "🦈", "🦅", "🔎", "⚡", "🦊", "🛡️", "🎯"];

/// A stable player identity presented to the game server.
///
/// Immutable for the lifetime of a session. The `id` half persists across
/// sessions; the `nickname` half may change between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    /// Opaque persisted id (UUID string).
    pub id: String,
    /// Display nickname, adjective + marker.
    pub nickname: String,
}

/// Persistence seam for the player id.
///
/// Exactly one record is kept: the opaque id string. Implementations decide
/// where it lives (a file on desktop, memory in tests).
pub trait IdentityStore {
    /// Read the previously persisted id, if any.
    fn load(&self) -> Result<Option<String>>;
    /// Persist the id. Called at most once per device.
    fn save(&self, id: &str) -> Result<()>;
}

/// Return the persisted identity, creating and persisting one on first run.
///
/// The id is recalled from `store` when present; otherwise a fresh UUIDv4 is
/// generated and written through `store` before returning. The nickname is
/// always drawn fresh from the vocabularies.
///
/// # Errors
///
/// Propagates storage failures from the [`IdentityStore`].
pub fn get_or_create(store: &dyn IdentityStore) -> Result<PlayerIdentity> {
    let id = match store.load()? {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4().to_string();
            store.save(&id)?;
            id
        }
    };
    Ok(PlayerIdentity {
        id,
        nickname: generate_nickname(),
    })
}

/// Build a nickname from one random adjective and one random marker.
pub fn generate_nickname() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Atento");
    let marker = MARKERS.choose(&mut rng).copied().unwrap_or("🔎");
    format!("{adjective} {marker}")
}

// ── Stores ──────────────────────────────────────────────────────────

/// File-backed [`IdentityStore`]: one plain-text file holding the id.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    /// Create a store backed by the given file path. The file is created on
    /// the first [`save`](IdentityStore::save).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let id = contents.trim();
                Ok(if id.is_empty() {
                    None
                } else {
                    Some(id.to_string())
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, id)?;
        Ok(())
    }
}

/// In-memory [`IdentityStore`] for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    inner: Mutex<Option<String>>,
}

impl MemoryIdentityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.inner.lock().ok().and_then(|guard| guard.clone()))
    }

    fn save(&self, id: &str) -> Result<()> {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(id.to_string());
        }
        Ok(())
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

    #[test]
    fn first_call_generates_and_persists_id() {
        let store = MemoryIdentityStore::new();
        let identity = get_or_create(&store).unwrap();
        assert!(!identity.id.is_empty());
        assert_eq!(store.load().unwrap().as_deref(), Some(identity.id.as_str()));
    }

    #[test]
    fn second_call_recalls_same_id() {
        let store = MemoryIdentityStore::new();
        let first = get_or_create(&store).unwrap();
        let second = get_or_create(&store).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn generated_id_is_a_uuid() {
        let store = MemoryIdentityStore::new();
        let identity = get_or_create(&store).unwrap();
        assert!(Uuid::parse_str(&identity.id).is_ok());
    }

    #[test]
    fn nickname_comes_from_vocabularies() {
        let nickname = generate_nickname();
        let (adjective, marker) = nickname.split_once(' ').unwrap();
        assert!(ADJECTIVES.contains(&adjective));
        assert!(MARKERS.contains(&marker));
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path().join("player_id"));

        assert!(store.load().unwrap().is_none());
        let identity = get_or_create(&store).unwrap();
        let recalled = get_or_create(&store).unwrap();
        assert_eq!(identity.id, recalled.id);
    }

    #[test]
    fn file_store_ignores_blank_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player_id");
        std::fs::write(&path, "  \n").unwrap();

        let store = FileIdentityStore::new(path);
        assert!(store.load().unwrap().is_none());
    }
}
