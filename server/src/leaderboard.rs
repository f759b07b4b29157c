//! Fastest completed runs, persisted with bincode.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("leaderboard I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("leaderboard encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player: String,
    pub millis: u64,
}

#[derive(Debug, Clone)]
pub struct Leaderboard {
    entries: Vec<LeaderboardEntry>,
    capacity: usize,
    path: Option<PathBuf>,
}

impl Leaderboard {
    /// In-memory board holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            path: None,
        }
    }

    /// Board backed by `path`. A missing file starts an empty board; an
    /// unreadable one is logged and replaced on the next save.
    pub fn open(path: &Path, capacity: usize) -> Self {
        let mut board = Self {
            entries: Vec::new(),
            capacity,
            path: Some(path.to_path_buf()),
        };

        if path.exists() {
            match board.load() {
                Ok(()) => info!("Loaded {} leaderboard entries", board.entries.len()),
                Err(e) => warn!("Ignoring leaderboard at {}: {}", path.display(), e),
            }
        }
        board
    }

    fn load(&mut self) -> Result<(), LeaderboardError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = fs::read(path)?;
        let mut entries: Vec<LeaderboardEntry> = bincode::deserialize(&bytes)?;
        entries.sort_by_key(|e| e.millis);
        entries.truncate(self.capacity);
        self.entries = entries;
        Ok(())
    }

    pub fn save(&self) -> Result<(), LeaderboardError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = bincode::serialize(&self.entries)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Records a completed run. Returns the 1-based rank when the time made
    /// the board.
    pub fn record_finish(&mut self, player: &str, millis: u64) -> Option<usize> {
        if self.capacity == 0 {
            return None;
        }

        // Equal times keep their arrival order.
        let position = self.entries.partition_point(|e| e.millis <= millis);
        if position >= self.capacity {
            return None;
        }

        self.entries.insert(
            position,
            LeaderboardEntry {
                player: player.to_string(),
                millis,
            },
        );
        self.entries.truncate(self.capacity);

        if let Err(e) = self.save() {
            warn!("Failed to save leaderboard: {}", e);
        }
        Some(position + 1)
    }

    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    pub fn top(&self, n: usize) -> &[LeaderboardEntry] {
        &self.entries[..n.min(self.entries.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_stay_sorted_and_capped() {
        let mut board = Leaderboard::new(3);
        assert_eq!(board.record_finish("a", 5_000), Some(1));
        assert_eq!(board.record_finish("b", 3_000), Some(1));
        assert_eq!(board.record_finish("c", 4_000), Some(2));
        assert_eq!(board.record_finish("d", 9_000), None);
        assert_eq!(board.record_finish("e", 1_000), Some(1));

        let names: Vec<&str> = board.entries().iter().map(|e| e.player.as_str()).collect();
        assert_eq!(names, vec!["e", "b", "c"]);
        assert_eq!(board.top(1)[0].player, "e");
        assert_eq!(board.top(50).len(), 3);
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let mut board = Leaderboard::new(10);
        board.record_finish("first", 1_000);
        assert_eq!(board.record_finish("second", 1_000), Some(2));
    }

    #[test]
    fn test_zero_capacity_records_nothing() {
        let mut board = Leaderboard::new(0);
        assert_eq!(board.record_finish("a", 1), None);
        assert!(board.entries().is_empty());
    }

    #[test]
    fn test_persisted_board_reloads() {
        let path = std::env::temp_dir().join(format!(
            "speedrun-leaderboard-{}.bin",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);

        let mut board = Leaderboard::open(&path, 10);
        board.record_finish("alice", 61_005);
        board.record_finish("bob", 59_000);

        let reloaded = Leaderboard::open(&path, 10);
        assert_eq!(reloaded.entries(), board.entries());
        assert_eq!(reloaded.entries()[0].player, "bob");

        let _ = fs::remove_file(&path);
    }
}
