// CYBERTWIN CHECKPOINT MANAGER
// SNAPSHOTS THE LIVE HANDLE INTO A MANAGER-OWNED DIRECTORY AND EXPANDS A SNAPSHOT
// INTO A REPLICATION SET: ONE (CHECKPOINT, SEED) PAIR PER STOCHASTIC REPLICATION.
//
// CAPTURE BORROWS THE HANDLE EXCLUSIVELY, SO NO STEP CAN LAND BETWEEN REQUEST AND
// SNAPSHOT. EVERY CAPTURE GETS ITS OWN FILE; FILES ARE REMOVED ON discard OR DROP.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::engine::{Checkpoint, EngineError, SimHandle};

// A CHECKPOINT AND THE SEED ITS TWIN IS STARTED WITH. None = ENGINE DEFAULT SEED.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replica {
    pub checkpoint: Checkpoint,
    pub seed: Option<u64>,
}

pub struct CheckpointManager {
    dir: PathBuf,
    captured: u64,
    held: Vec<PathBuf>,
}

fn file_tag(tag: &str) -> String {
    tag.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl CheckpointManager {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, EngineError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, captured: 0, held: Vec::new() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn held(&self) -> usize {
        self.held.len()
    }

    pub fn capture(&mut self, handle: &mut dyn SimHandle, tag: &str) -> Result<Checkpoint, EngineError> {
        self.captured += 1;
        let path = self.dir.join(format!(
            "{}_{}_{:04}.state.json.gz",
            std::process::id(),
            file_tag(tag),
            self.captured
        ));
        let checkpoint = handle.save_snapshot(&path)?;
        self.held.push(path);
        info!("CHECKPOINT {} AT t={}", checkpoint.path().display(), checkpoint.time());
        Ok(checkpoint)
    }

    // SHARED BY THE LIVE LOOP AND EVERY TWIN. NEEDS NO MANAGER, ONLY THE CHECKPOINT.
    // THE CALLER OWNS RESETTING ANY PER-ENTITY HISTORY (WaitMeter) AFTERWARDS
    pub fn restore(checkpoint: &Checkpoint, handle: &mut dyn SimHandle) -> Result<(), EngineError> {
        handle.load_snapshot(checkpoint)
    }

    // NO SEEDS: ONE REPLICA ON THE ENGINE DEFAULT SEED (THE "CURRENT STATE")
    pub fn replicate(&self, checkpoint: &Checkpoint, seeds: &[u64]) -> Vec<Replica> {
        if seeds.is_empty() {
            return vec![Replica { checkpoint: checkpoint.clone(), seed: None }];
        }
        seeds.iter()
            .map(|&seed| Replica { checkpoint: checkpoint.clone(), seed: Some(seed) })
            .collect()
    }

    pub fn discard(&mut self, checkpoint: &Checkpoint) {
        let path = checkpoint.path();
        self.held.retain(|p| p != path);
        if let Err(e) = std::fs::remove_file(path) {
            warn!("CHECKPOINT REMOVE FAILED {}: {}", path.display(), e);
        }
    }
}

impl Drop for CheckpointManager {
    fn drop(&mut self) {
        for path in self.held.drain(..) {
            let _ = std::fs::remove_file(&path);
        }
        debug!("CHECKPOINT DIR {} RELEASED", self.dir.display());
    }
}
