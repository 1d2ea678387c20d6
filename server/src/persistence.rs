//! Best-effort durability for the running game.
//!
//! The in-memory game is always the source of truth. After each accepted
//! action the authority hands [`PersistOp`]s to a background task which
//! applies them to a [`SnapshotStore`]; a failure is logged and the game
//! carries on.

use crate::error::GameError;
use crate::game::GameSnapshot;
use crate::roster::Player;
use log::{debug, error, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(e: PoisonError<T>) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<StoreError> for GameError {
    fn from(e: StoreError) -> Self {
        GameError::Persistence(e.to_string())
    }
}

pub trait SnapshotStore: Send + Sync {
    fn save_snapshot(&self, snapshot: &GameSnapshot) -> Result<(), StoreError>;
    fn load_snapshot(&self) -> Result<Option<GameSnapshot>, StoreError>;
    fn upsert_player(&self, player: &Player) -> Result<(), StoreError>;
    fn list_players(&self) -> Result<Vec<Player>, StoreError>;
    fn clear_all(&self) -> Result<(), StoreError>;
}

/// One unit of persistence work emitted after an accepted action.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOp {
    SaveSnapshot(GameSnapshot),
    UpsertPlayer(Player),
    ClearAll,
}

impl PersistOp {
    pub fn apply(&self, store: &dyn SnapshotStore) -> Result<(), StoreError> {
        match self {
            PersistOp::SaveSnapshot(snapshot) => store.save_snapshot(snapshot),
            PersistOp::UpsertPlayer(player) => store.upsert_player(player),
            PersistOp::ClearAll => store.clear_all(),
        }
    }

    /// Applies the op, logging instead of failing.
    pub fn apply_logged(&self, store: &dyn SnapshotStore) {
        if let Err(e) = self.apply(store) {
            let err = GameError::from(e);
            error!("{:?} while applying {}: {}", err.kind(), self.name(), err);
        }
    }

    fn name(&self) -> &'static str {
        match self {
            PersistOp::SaveSnapshot(_) => "snapshot save",
            PersistOp::UpsertPlayer(_) => "player upsert",
            PersistOp::ClearAll => "clear",
        }
    }
}

/// Reads whatever the store holds. Unreadable data means a fresh game.
pub fn load_saved_game(store: &dyn SnapshotStore) -> (Option<GameSnapshot>, Vec<Player>) {
    let snapshot = store.load_snapshot().unwrap_or_else(|e| {
        warn!("Ignoring unreadable snapshot: {}", e);
        None
    });
    let players = store.list_players().unwrap_or_else(|e| {
        warn!("Ignoring unreadable player records: {}", e);
        Vec::new()
    });
    (snapshot, players)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<GameSnapshot>>,
    players: Mutex<Vec<Player>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn save_snapshot(&self, snapshot: &GameSnapshot) -> Result<(), StoreError> {
        *self.snapshot.lock()? = Some(snapshot.clone());
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<GameSnapshot>, StoreError> {
        Ok(self.snapshot.lock()?.clone())
    }

    fn upsert_player(&self, player: &Player) -> Result<(), StoreError> {
        let mut players = self.players.lock()?;
        upsert(&mut players, player);
        Ok(())
    }

    fn list_players(&self) -> Result<Vec<Player>, StoreError> {
        Ok(self.players.lock()?.clone())
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        *self.snapshot.lock()? = None;
        self.players.lock()?.clear();
        Ok(())
    }
}

fn upsert(players: &mut Vec<Player>, player: &Player) {
    match players.iter_mut().find(|p| p.id == player.id) {
        Some(existing) => *existing = player.clone(),
        None => players.push(player.clone()),
    }
}

/// Keeps `game.json` and `players.json` in a directory.
///
/// Files are written to a temporary sibling and renamed into place, so a
/// crash mid-write leaves the previous version intact.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    // serializes read-modify-write of players.json
    lock: Mutex<()>,
}

impl JsonFileStore {
    const SNAPSHOT_FILE: &'static str = "game.json";
    const PLAYERS_FILE: &'static str = "players.json";

    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!("Using JSON store at {}", dir.display());
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_players(&self) -> Result<Vec<Player>, StoreError> {
        match Self::read_optional(&self.path(Self::PLAYERS_FILE))? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn remove_if_present(path: &Path) -> Result<(), StoreError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl SnapshotStore for JsonFileStore {
    fn save_snapshot(&self, snapshot: &GameSnapshot) -> Result<(), StoreError> {
        let _guard = self.lock.lock()?;
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        Self::write_atomic(&self.path(Self::SNAPSHOT_FILE), &bytes)
    }

    fn load_snapshot(&self) -> Result<Option<GameSnapshot>, StoreError> {
        let _guard = self.lock.lock()?;
        match Self::read_optional(&self.path(Self::SNAPSHOT_FILE))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn upsert_player(&self, player: &Player) -> Result<(), StoreError> {
        let _guard = self.lock.lock()?;
        let mut players = self.read_players()?;
        upsert(&mut players, player);
        let bytes = serde_json::to_vec_pretty(&players)?;
        Self::write_atomic(&self.path(Self::PLAYERS_FILE), &bytes)
    }

    fn list_players(&self) -> Result<Vec<Player>, StoreError> {
        let _guard = self.lock.lock()?;
        self.read_players()
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock()?;
        Self::remove_if_present(&self.path(Self::SNAPSHOT_FILE))?;
        Self::remove_if_present(&self.path(Self::PLAYERS_FILE))
    }
}
