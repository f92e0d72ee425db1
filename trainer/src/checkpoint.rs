//! Selection and persistence of policy checkpoints.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;

use crate::{TrainErr, agent::Policy, error::Result};

/// Below any attainable success rate, so the first evaluated epoch always qualifies.
pub const NO_BEST: f64 = -1.0;

/// The best aggregated success rate seen so far.
///
/// Owned by the coordinator and threaded through `CheckpointPolicy::advance` every epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestTracker {
    best: f64,
}

impl Default for BestTracker {
    fn default() -> Self {
        Self { best: NO_BEST }
    }
}

impl BestTracker {
    /// Creates a tracker starting at `sentinel`, which must lie below the metric's minimum.
    pub fn new(sentinel: f64) -> Self {
        Self { best: sentinel }
    }

    pub fn best(&self) -> f64 {
        self.best
    }
}

/// A named checkpoint location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Overwritten on every improvement.
    Best,
    /// Overwritten whenever a new best is found.
    Latest,
    /// Written every few epochs, never overwritten.
    Periodic(usize),
}

impl Slot {
    pub fn file_name(&self) -> String {
        match self {
            Slot::Best => "policy_best.ckpt".into(),
            Slot::Latest => "policy_latest.ckpt".into(),
            Slot::Periodic(epoch) => format!("policy_{epoch}.ckpt"),
        }
    }
}

/// The slots to write at the end of an epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointPlan {
    pub best: bool,
    pub latest: bool,
    pub periodic: Option<usize>,
}

impl CheckpointPlan {
    pub fn is_empty(&self) -> bool {
        !self.best && !self.latest && self.periodic.is_none()
    }

    /// The requested slots, in write order.
    pub fn slots(&self) -> impl Iterator<Item = Slot> {
        [
            self.best.then_some(Slot::Best),
            self.latest.then_some(Slot::Latest),
            self.periodic.map(Slot::Periodic),
        ]
        .into_iter()
        .flatten()
    }
}

/// Decides, once per epoch, whether the policy improved and which slots to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointPolicy {
    interval: usize,
    enabled: bool,
}

impl CheckpointPolicy {
    /// Creates a new `CheckpointPolicy`.
    ///
    /// # Arguments
    /// * `interval` - Epochs between periodic checkpoints, 0 disables them.
    /// * `enabled` - Whether a checkpoint directory is configured at all.
    pub fn new(interval: usize, enabled: bool) -> Self {
        Self { interval, enabled }
    }

    /// Runs the per-epoch transition.
    ///
    /// The tracker is raised whenever `success_rate` ties or beats it, even if nothing
    /// gets written because checkpointing is disabled.
    ///
    /// # Arguments
    /// * `tracker` - The best success rate before this epoch.
    /// * `success_rate` - This epoch's aggregated success rate.
    /// * `epoch` - The index of the epoch that just completed.
    ///
    /// # Returns
    /// The updated tracker and the slots to write.
    pub fn advance(
        &self,
        tracker: BestTracker,
        success_rate: f64,
        epoch: usize,
    ) -> (BestTracker, CheckpointPlan) {
        let improved = success_rate >= tracker.best;
        let tracker = if improved {
            BestTracker { best: success_rate }
        } else {
            tracker
        };

        if !self.enabled {
            return (tracker, CheckpointPlan::default());
        }

        let periodic = (self.interval > 0 && epoch % self.interval == 0).then_some(epoch);
        let plan = CheckpointPlan {
            best: improved,
            latest: improved,
            periodic,
        };

        (tracker, plan)
    }
}

/// The directory holding the checkpoint slots.
#[derive(Debug, Clone)]
pub struct CheckpointSlots {
    dir: PathBuf,
}

impl CheckpointSlots {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, slot: Slot) -> PathBuf {
        self.dir.join(slot.file_name())
    }

    /// Saves `policy` into every slot of `plan`.
    ///
    /// Each slot is saved to a sibling temporary file first and renamed into place, a
    /// slot is never left holding a partial save.
    ///
    /// # Returns
    /// The paths that were written.
    ///
    /// # Errors
    /// `TrainErr::Checkpoint` on the first failed save or rename.
    pub fn write<P: Policy>(&self, policy: &P, plan: &CheckpointPlan) -> Result<Vec<PathBuf>> {
        if plan.is_empty() {
            return Ok(Vec::new());
        }

        fs::create_dir_all(&self.dir).map_err(|source| TrainErr::Checkpoint {
            path: self.dir.clone(),
            source,
        })?;

        plan.slots()
            .map(|slot| -> Result<PathBuf> {
                let path = self.path(slot);
                save_atomically(policy, &path)?;
                info!("saving policy to {}", path.display());
                Ok(path)
            })
            .collect()
    }
}

fn save_atomically<P: Policy>(policy: &P, path: &Path) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    policy.save(&tmp).map_err(|source| TrainErr::Checkpoint {
        path: tmp.clone(),
        source,
    })?;

    fs::rename(&tmp, path).map_err(|source| TrainErr::Checkpoint {
        path: path.to_path_buf(),
        source,
    })
}
