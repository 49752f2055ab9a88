//! Per-keypair poll checkpoint ("mark").
//!
//! ## Hold-the-mark rule
//!
//! An incremental receive (an existing mark, `fetch_all == false`) polls
//! with `since = mark` and then writes the mark back unchanged. The mark does
//! not advance to "now", so repeated receives keep returning everything the
//! relay still holds since that point. Only a first-ever receive or an
//! explicit fetch-all moves the mark, and then to the current time.
//!
//! Concurrent receives for the same keypair are not coordinated; the last
//! writer wins.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{RelayboxError, Result};

pub const MARK_EXTENSION: &str = "mark";

/// Last poll position, in unix seconds as understood by the relay's `since`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub since: u64,
}

/// Key-value persistence for checkpoints, keyed by keypair name.
pub trait CheckpointStore {
    fn get(&self, keypair: &str) -> Result<Option<Checkpoint>>;
    fn put(&mut self, keypair: &str, checkpoint: Checkpoint) -> Result<()>;
}

/// One JSON record per keypair at `<dir>/<name>.mark`.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Fails unless `dir` is an existing directory this process can create
    /// files in. Checked by writing a scratch file, since mode bits alone
    /// say nothing about the effective user.
    pub fn open(dir: &Path) -> Result<Self> {
        let metadata = fs::metadata(dir).map_err(|e| {
            RelayboxError::Checkpoint(format!("{}: {}", dir.display(), e))
        })?;
        if !metadata.is_dir() {
            return Err(RelayboxError::Checkpoint(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let scratch = dir.join(format!(".{}.{}.tmp", MARK_EXTENSION, std::process::id()));
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&scratch)
            .map_err(|e| {
                RelayboxError::Checkpoint(format!("{} is not writable: {}", dir.display(), e))
            })?;
        fs::remove_file(&scratch).map_err(|e| {
            RelayboxError::Checkpoint(format!("{}: {}", scratch.display(), e))
        })?;

        Ok(FileCheckpointStore {
            dir: dir.to_path_buf(),
        })
    }

    pub fn path_for(&self, keypair: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", keypair, MARK_EXTENSION))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn get(&self, keypair: &str) -> Result<Option<Checkpoint>> {
        let path = self.path_for(keypair);
        match fs::read(&path) {
            Ok(contents) => {
                let checkpoint = serde_json::from_slice(&contents).map_err(|e| {
                    RelayboxError::Checkpoint(format!("{}: {}", path.display(), e))
                })?;
                Ok(Some(checkpoint))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RelayboxError::Checkpoint(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn put(&mut self, keypair: &str, checkpoint: Checkpoint) -> Result<()> {
        let path = self.path_for(keypair);
        let json = serde_json::to_vec(&checkpoint)?;
        fs::write(&path, json)
            .map_err(|e| RelayboxError::Checkpoint(format!("{}: {}", path.display(), e)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    records: HashMap<String, Checkpoint>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn get(&self, keypair: &str) -> Result<Option<Checkpoint>> {
        Ok(self.records.get(keypair).copied())
    }

    fn put(&mut self, keypair: &str, checkpoint: Checkpoint) -> Result<()> {
        self.records.insert(keypair.to_string(), checkpoint);
        Ok(())
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Reads and commits checkpoints following the hold-the-mark rule.
pub struct MarkTracker<S> {
    store: S,
    clock: fn() -> u64,
}

impl<S: CheckpointStore> MarkTracker<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, unix_now)
    }

    pub fn with_clock(store: S, clock: fn() -> u64) -> Self {
        MarkTracker { store, clock }
    }

    pub fn load_checkpoint(&self, keypair: &str) -> Result<Option<u64>> {
        Ok(self.store.get(keypair)?.map(|c| c.since))
    }

    /// The `since` filter for this receive: none on a first receive or a
    /// fetch-all. The stored mark is read either way, so a damaged record
    /// fails here rather than after the poll.
    pub fn poll_since(&self, keypair: &str, fetch_all: bool) -> Result<Option<u64>> {
        let mark = self.load_checkpoint(keypair)?;
        Ok(if fetch_all { None } else { mark })
    }

    /// Record the receive. An existing mark is re-written with its own value
    /// unless `fetch_all` is set; otherwise the mark is set to now.
    pub fn commit_checkpoint(&mut self, keypair: &str, fetch_all: bool) -> Result<Checkpoint> {
        let previous = if fetch_all {
            None
        } else {
            self.store.get(keypair)?
        };
        let checkpoint = match previous {
            Some(previous) => {
                debug!("Holding mark for {} at {}", keypair, previous.since);
                previous
            }
            _ => {
                let now = (self.clock)();
                debug!("Setting mark for {} to {}", keypair, now);
                Checkpoint { since: now }
            }
        };
        self.store.put(keypair, checkpoint)?;
        Ok(checkpoint)
    }
}
