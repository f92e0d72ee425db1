//! Per-worker seeding and the check that workers really explore differently.

use std::io;

use comms::Collective;
use log::{debug, warn};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{TrainErr, error::Result, identity::WorkerIdentity};

/// Distance between the seeds of two consecutive ranks.
pub const RANK_SEED_STRIDE: u64 = 1_000_000;

/// Derives the seed of a worker from the run's base seed.
///
/// `None` stays `None`: the worker seeds from the operating system.
pub fn rank_seed(base: Option<u64>, rank: usize) -> Option<u64> {
    base.map(|seed| seed.wrapping_add(RANK_SEED_STRIDE.wrapping_mul(rank as u64)))
}

/// Owns a worker's root random generator and checks it against the coordinator's.
///
/// Every other generator of the worker (environments, exploration noise, replay sampling)
/// is forked from this one, so a successful check covers all of them.
#[derive(Debug, Clone)]
pub struct SeedDecorrelator {
    identity: WorkerIdentity,
    seed: Option<u64>,
    rng: StdRng,
}

impl SeedDecorrelator {
    /// Creates a new `SeedDecorrelator`.
    ///
    /// # Arguments
    /// * `base_seed` - The run's seed, or `None` to seed every worker from the operating system.
    /// * `identity` - This worker's place in the pool.
    pub fn new(base_seed: Option<u64>, identity: WorkerIdentity) -> Self {
        Self::from_rank_seed(rank_seed(base_seed, identity.rank()), identity)
    }

    /// Creates a `SeedDecorrelator` from an already derived per-worker seed.
    pub fn from_rank_seed(seed: Option<u64>, identity: WorkerIdentity) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        debug!(rank = identity.rank(); "seeded worker with {seed:?}");
        Self { identity, seed, rng }
    }

    /// The seed of this worker, `None` when it came from the operating system.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Splits off a child generator for one of the worker's collaborators.
    pub fn fork(&mut self) -> StdRng {
        StdRng::seed_from_u64(self.rng.random())
    }

    /// Verifies this worker's generator does not mirror the coordinator's.
    ///
    /// Every worker draws a uniform value and the coordinator's draw is broadcast. A
    /// non-coordinator worker whose own draw equals it fails. This is a collective call.
    ///
    /// # Errors
    /// `TrainErr::SeedCorrelation` on the colliding worker, `TrainErr::Comms` if the
    /// broadcast fails.
    pub async fn check<C: Collective>(&mut self, collective: &mut C) -> Result<()> {
        let local: f64 = self.rng.random();
        let root = collective
            .broadcast(&[local], WorkerIdentity::COORDINATOR)
            .await
            .map_err(TrainErr::Comms)?;

        let Some(&root) = root.first() else {
            return Err(TrainErr::Comms(io::Error::new(
                io::ErrorKind::InvalidData,
                "empty seed broadcast",
            )));
        };

        if !self.identity.is_coordinator() && root == local {
            let rank = self.identity.rank();
            warn!(rank = rank; "random draw {local} matches the coordinator's");
            return Err(TrainErr::SeedCorrelation { rank, value: local });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    /// A two worker group seen from rank 1, whose broadcasts echo the local value back.
    struct Mirror;

    impl Collective for Mirror {
        fn rank(&self) -> usize {
            1
        }

        fn world_size(&self) -> usize {
            2
        }

        async fn allreduce(&mut self, local: &[f64]) -> io::Result<Vec<f64>> {
            Ok(local.iter().map(|x| x * 2.0).collect())
        }

        async fn broadcast(&mut self, value: &[f64], _root: usize) -> io::Result<Vec<f64>> {
            Ok(value.to_vec())
        }

        async fn shutdown(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn rank_seeds_are_distinct() {
        let seeds: HashSet<_> = (0..1000).map(|rank| rank_seed(Some(42), rank)).collect();
        assert_eq!(seeds.len(), 1000);
        assert_eq!(rank_seed(Some(42), 3), Some(3_000_042));
        assert_eq!(rank_seed(None, 3), None);
    }

    #[test]
    fn forks_are_reproducible() {
        let identity = WorkerIdentity::new(1, 2).unwrap();
        let mut a = SeedDecorrelator::new(Some(7), identity);
        let mut b = SeedDecorrelator::new(Some(7), identity);

        assert_eq!(a.seed(), Some(1_000_007));
        assert_eq!(a.fork().random::<u64>(), b.fork().random::<u64>());
    }

    #[tokio::test]
    async fn mirrored_draw_is_a_correlation() {
        let identity = WorkerIdentity::new(1, 2).unwrap();
        let mut seeds = SeedDecorrelator::new(Some(0), identity);

        let err = seeds.check(&mut Mirror).await.unwrap_err();
        assert!(matches!(err, TrainErr::SeedCorrelation { rank: 1, .. }));
    }

    #[tokio::test]
    async fn coordinator_never_collides_with_itself() {
        let identity = WorkerIdentity::new(0, 1).unwrap();
        let mut seeds = SeedDecorrelator::new(Some(0), identity);
        seeds.check(&mut comms::Solo::new()).await.unwrap();
    }

    #[tokio::test]
    async fn decorrelated_group_passes() {
        let members = comms::local_group(3).unwrap();
        let handles: Vec<_> = members
            .into_iter()
            .map(|mut member| {
                tokio::spawn(async move {
                    let identity = WorkerIdentity::of(&member);
                    let mut seeds = SeedDecorrelator::new(Some(5), identity);
                    seeds.check(&mut member).await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn shared_seed_fails_on_the_follower_only() {
        let members = comms::local_group(2).unwrap();
        let handles: Vec<_> = members
            .into_iter()
            .map(|mut member| {
                tokio::spawn(async move {
                    let identity = WorkerIdentity::of(&member);
                    let mut seeds = SeedDecorrelator::from_rank_seed(Some(9), identity);
                    seeds.check(&mut member).await
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(TrainErr::SeedCorrelation { rank: 1, .. })
        ));
    }
}
