use std::path::PathBuf;

use comms::Collective;
use log::{debug, info, warn};

use crate::{
    TrainErr,
    agent::{Policy, RolloutWorker},
    checkpoint::{BestTracker, CheckpointPlan, CheckpointPolicy, CheckpointSlots},
    config::RunConfig,
    error::Result,
    identity::WorkerIdentity,
    logger::TabularLogger,
    metrics,
    seeding::SeedDecorrelator,
};

/// What happened during one epoch, as seen by this worker.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    /// The evaluator's success rate averaged over every worker.
    pub success_rate: f64,
    /// The slots this worker wrote, always empty away from the coordinator.
    pub plan: CheckpointPlan,
    pub written: Vec<PathBuf>,
    /// The aggregated metrics table of the epoch.
    pub records: Vec<(String, f64)>,
}

/// The outcome of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainSummary {
    pub epochs_run: usize,
    /// Only tracked by the coordinator, the sentinel elsewhere.
    pub best_success_rate: f64,
    pub reports: Vec<EpochReport>,
}

/// The trained policy together with the run's summary.
#[derive(Debug)]
pub struct Trained<P> {
    pub policy: P,
    pub summary: TrainSummary,
}

/// Drives the epoch, cycle and batch hierarchy of a worker.
///
/// Every worker of the pool runs its own loop in lockstep with the others: each metric
/// reduction and the seed check are collective calls that every worker issues in the
/// same order, whatever its rank. Only the coordinator prints, tracks the best success
/// rate and writes checkpoints.
pub struct TrainingLoop<P, R, E, C> {
    config: RunConfig,
    policy: P,
    rollout_worker: R,
    evaluator: E,
    collective: C,
    seeds: SeedDecorrelator,
    logger: TabularLogger,
    checkpoints: CheckpointPolicy,
    slots: Option<CheckpointSlots>,
    is_coordinator: bool,
}

impl<P, R, E, C> TrainingLoop<P, R, E, C>
where
    P: Policy,
    R: RolloutWorker<P>,
    E: RolloutWorker<P>,
    C: Collective,
{
    /// Creates a new `TrainingLoop`.
    ///
    /// # Arguments
    /// * `config` - The shape of the run.
    /// * `policy` - This worker's policy replica.
    /// * `rollout_worker` - Collects exploratory training episodes.
    /// * `evaluator` - Collects greedy episodes to measure the success rate.
    /// * `collective` - This worker's handle on the pool.
    /// * `seeds` - This worker's root generator.
    /// * `logger` - The metrics table, only flushed by the coordinator.
    pub fn new(
        config: RunConfig,
        policy: P,
        rollout_worker: R,
        evaluator: E,
        collective: C,
        seeds: SeedDecorrelator,
        logger: TabularLogger,
    ) -> Self {
        let is_coordinator = WorkerIdentity::of(&collective).is_coordinator();
        let checkpoints = CheckpointPolicy::new(
            config.policy_save_interval,
            config.save_path.is_some(),
        );
        let slots = config.save_path.clone().map(CheckpointSlots::new);

        Self {
            config,
            policy,
            rollout_worker,
            evaluator,
            collective,
            seeds,
            logger,
            checkpoints,
            slots,
            is_coordinator,
        }
    }

    /// Trains for the configured amount of epochs.
    ///
    /// # Returns
    /// The trained policy and a summary of every epoch.
    ///
    /// # Errors
    /// The first failure of any collaborator, collective call, checkpoint write or seed
    /// check. Nothing is retried.
    pub async fn run(mut self) -> Result<Trained<P>> {
        if self.policy.uses_bc_loss() {
            let path = self.config.demo_file.clone().ok_or_else(|| {
                TrainErr::Config("bc_loss is enabled but no demonstration file was given".into())
            })?;

            self.policy
                .init_demo_buffer(&path)
                .map_err(|e| TrainErr::collaborator("loading demonstrations", e))?;
        }

        let mut tracker = BestTracker::default();
        let mut reports = Vec::with_capacity(self.config.n_epochs);

        for epoch in 0..self.config.n_epochs {
            let (next, report) = self.run_epoch(epoch, tracker).await?;
            tracker = next;
            reports.push(report);
        }

        if let Err(e) = self.collective.shutdown().await {
            warn!("could not leave the worker group cleanly: {e}");
        }

        Ok(Trained {
            policy: self.policy,
            summary: TrainSummary {
                epochs_run: reports.len(),
                best_success_rate: tracker.best(),
                reports,
            },
        })
    }

    async fn run_epoch(
        &mut self,
        epoch: usize,
        tracker: BestTracker,
    ) -> Result<(BestTracker, EpochReport)> {
        self.train_epoch()?;
        self.evaluate()?;

        self.logger.record("epoch", epoch as f64);
        let logs = [
            self.evaluator.logs("test"),
            self.rollout_worker.logs("train"),
            self.policy.logs(),
        ];
        for (key, value) in logs.into_iter().flatten() {
            let mean = metrics::average(&mut self.collective, value).await?;
            self.logger.record(key, mean);
        }

        let records = if self.is_coordinator {
            self.logger.dump()?
        } else {
            self.logger.take()
        };

        let success_rate =
            metrics::average(&mut self.collective, self.evaluator.current_success_rate()).await?;

        let (tracker, plan, written) = if self.is_coordinator {
            let (tracker, plan) = self.checkpoints.advance(tracker, success_rate, epoch);
            let written = match &self.slots {
                Some(slots) => slots.write(&self.policy, &plan)?,
                None => Vec::new(),
            };
            info!("best success rate so far {}", tracker.best());
            (tracker, plan, written)
        } else {
            (tracker, CheckpointPlan::default(), Vec::new())
        };

        self.seeds.check(&mut self.collective).await?;

        Ok((
            tracker,
            EpochReport {
                epoch,
                success_rate,
                plan,
                written,
                records,
            },
        ))
    }

    fn train_epoch(&mut self) -> Result<()> {
        self.rollout_worker.clear_history();

        for cycle in 0..self.config.n_cycles {
            let episode = self
                .rollout_worker
                .generate_rollouts(&self.policy)
                .map_err(|e| TrainErr::collaborator("rollout generation", e))?;

            self.policy
                .store_episode(episode)
                .map_err(|e| TrainErr::collaborator("storing episodes", e))?;

            for _ in 0..self.config.n_batches {
                self.policy
                    .train()
                    .map_err(|e| TrainErr::collaborator("optimization", e))?;
            }

            self.policy.update_target_net();
            debug!("finished cycle {cycle}");
        }

        Ok(())
    }

    fn evaluate(&mut self) -> Result<()> {
        self.evaluator.clear_history();

        for _ in 0..self.config.n_test_rollouts {
            self.evaluator
                .generate_rollouts(&self.policy)
                .map_err(|e| TrainErr::collaborator("evaluation", e))?;
        }

        Ok(())
    }
}

