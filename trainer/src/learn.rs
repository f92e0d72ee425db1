//! Sets up every collaborator of a worker and runs its training loop.

use std::{fmt, fs, path::PathBuf};

use comms::Collective;
use log::{debug, info, warn};
use rand::rngs::StdRng;

use crate::{
    TrainErr,
    agent::{Environment, Policy, RolloutWorker},
    config::{EnvOverrides, Overrides, Params, ParamsBuilder, RolloutParams, RunConfig},
    error::Result,
    identity::WorkerIdentity,
    logger::TabularLogger,
    seeding::SeedDecorrelator,
    training::{Trained, TrainingLoop},
};

/// Builds the collaborators of a training run.
pub trait Components {
    type Env: Environment;
    type Policy: Policy;
    type Worker: RolloutWorker<Self::Policy>;
    type Error: fmt::Display;

    /// Instantiates the environment registered as `env_id`.
    ///
    /// # Errors
    /// Unknown identifiers must fail, they become configuration errors.
    fn make_env(&self, env_id: &str, rng: StdRng) -> std::result::Result<Self::Env, Self::Error>;

    /// The parameters that differ from the defaults for `env_id`.
    fn env_overrides(&self, env_id: &str) -> Option<EnvOverrides>;

    fn make_policy(
        &self,
        params: &Params,
        rng: StdRng,
    ) -> std::result::Result<Self::Policy, Self::Error>;

    fn make_rollout_worker(
        &self,
        env: Self::Env,
        params: &RolloutParams,
        rng: StdRng,
    ) -> std::result::Result<Self::Worker, Self::Error>;
}

/// The launcher's choices for a run.
#[derive(Debug, Clone, Default)]
pub struct LearnArgs {
    pub env: String,
    /// The evaluator's environment, the training one when `None`.
    pub eval_env: Option<String>,
    pub total_timesteps: usize,
    pub seed: Option<u64>,
    pub policy_save_interval: usize,
    pub overrides: Overrides,
    pub demo_file: Option<PathBuf>,
    pub load_path: Option<PathBuf>,
    pub save_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

/// Trains a policy on this worker, in lockstep with the rest of the pool.
///
/// Every worker of the pool must call this with the same arguments, only the
/// collective handle differs.
///
/// # Arguments
/// * `components` - Builds the environments, the policy and the rollout workers.
/// * `collective` - This worker's handle on the pool.
/// * `args` - The run's settings.
///
/// # Errors
/// `TrainErr::Config` for anything rejected before training starts, otherwise the
/// first failure of the training loop.
pub async fn learn<K, C>(components: &K, collective: C, args: LearnArgs) -> Result<Trained<K::Policy>>
where
    K: Components,
    C: Collective,
{
    let identity = WorkerIdentity::of(&collective);
    let mut seeds = SeedDecorrelator::new(args.seed, identity);

    let env = components
        .make_env(&args.env, seeds.fork())
        .map_err(|e| TrainErr::Config(format!("environment {}: {e}", args.env)))?;

    let eval_env_id = args.eval_env.as_deref().unwrap_or(&args.env);
    let eval_env = components
        .make_env(eval_env_id, seeds.fork())
        .map_err(|e| TrainErr::Config(format!("environment {eval_env_id}: {e}")))?;

    let params = ParamsBuilder::new(Params::default())
        .env_overrides(components.env_overrides(env.id()))
        .overrides(Overrides {
            bc_loss: args
                .demo_file
                .is_some()
                .then_some(true)
                .or(args.overrides.bc_loss),
            ..args.overrides.clone()
        })
        .environment(env.id(), env.horizon(), env.num_envs())
        .build()?;

    let config = RunConfig::new(
        &params,
        args.total_timesteps,
        args.policy_save_interval,
        args.save_path.clone(),
        args.demo_file.clone(),
    )?;

    if identity.is_coordinator() {
        if let Some(dir) = &args.log_dir {
            fs::create_dir_all(dir)?;
            params.write_snapshot(&dir.join("params.json"))?;
        }
    }

    debug!(rank = identity.rank(); "resolved parameters {params:?}");

    if identity.is_coordinator() && identity.world_size() == 1 {
        warn!(
            "training with a single worker, the reference results were obtained with many parallel workers"
        );
    }

    let mut policy = components
        .make_policy(&params, seeds.fork())
        .map_err(|e| TrainErr::collaborator("building the policy", e))?;

    if let Some(path) = &args.load_path {
        policy
            .load(path)
            .map_err(|e| TrainErr::collaborator("restoring the policy", e))?;
        info!(rank = identity.rank(); "restored policy from {}", path.display());
    }

    let rollout_worker = components
        .make_rollout_worker(env, &params.rollout_params(), seeds.fork())
        .map_err(|e| TrainErr::collaborator("building the rollout worker", e))?;

    let evaluator = components
        .make_rollout_worker(eval_env, &params.eval_params(), seeds.fork())
        .map_err(|e| TrainErr::collaborator("building the evaluator", e))?;

    let logger = match &args.log_dir {
        Some(dir) if identity.is_coordinator() => TabularLogger::with_csv(dir)?,
        _ => TabularLogger::new(),
    };

    if identity.is_coordinator() {
        info!(
            "training {} for {} epochs on {} worker(s)",
            params.env_name,
            config.n_epochs,
            identity.world_size()
        );
    }

    TrainingLoop::new(
        config,
        policy,
        rollout_worker,
        evaluator,
        collective,
        seeds,
        logger,
    )
    .run()
    .await
}
