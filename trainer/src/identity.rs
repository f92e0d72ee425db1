use comms::Collective;

/// Where this process sits in the worker pool, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerIdentity {
    rank: usize,
    world_size: usize,
}

impl WorkerIdentity {
    /// The rank that owns every side effect of the run (logs, checkpoints, snapshots).
    pub const COORDINATOR: usize = 0;

    /// Creates a new `WorkerIdentity`.
    ///
    /// # Arguments
    /// * `rank` - This worker's rank, must be below `world_size`.
    /// * `world_size` - The amount of workers, at least one.
    ///
    /// # Returns
    /// `None` if the pair is not a valid position in a pool.
    pub fn new(rank: usize, world_size: usize) -> Option<Self> {
        (rank < world_size).then_some(Self { rank, world_size })
    }

    /// Reads the identity off a collective group member.
    pub fn of<C: Collective>(collective: &C) -> Self {
        Self {
            rank: collective.rank(),
            world_size: collective.world_size(),
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// Whether this worker performs the run's I/O.
    pub fn is_coordinator(&self) -> bool {
        self.rank == Self::COORDINATOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rank_zero_coordinates() {
        assert!(WorkerIdentity::new(0, 3).unwrap().is_coordinator());
        assert!(!WorkerIdentity::new(2, 3).unwrap().is_coordinator());
    }

    #[test]
    fn rank_must_fit_in_the_pool() {
        assert!(WorkerIdentity::new(3, 3).is_none());
        assert!(WorkerIdentity::new(0, 0).is_none());
    }

    #[test]
    fn solo_group_is_a_single_coordinator() {
        let identity = WorkerIdentity::of(&comms::Solo::new());
        assert_eq!(identity, WorkerIdentity::new(0, 1).unwrap());
    }
}
