use std::path::PathBuf;

use super::params::Params;
use crate::{TrainErr, error::Result};

/// The shape of a training run, fixed once it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub n_epochs: usize,
    pub n_cycles: usize,
    pub n_batches: usize,
    pub n_test_rollouts: usize,
    /// Epochs between periodic checkpoints, 0 disables them.
    pub policy_save_interval: usize,
    pub save_path: Option<PathBuf>,
    /// Demonstrations for the behavior cloning loss.
    pub demo_file: Option<PathBuf>,
}

impl RunConfig {
    /// Splits a timestep budget into epochs.
    ///
    /// Every epoch runs `n_cycles` rollouts of `rollout_batch_size` episodes of `T` steps.
    ///
    /// # Arguments
    /// * `params` - The resolved run parameters.
    /// * `total_timesteps` - The environment step budget, across the whole run.
    /// * `policy_save_interval` - Epochs between periodic checkpoints.
    /// * `save_path` - The checkpoint directory, `None` disables checkpoints.
    /// * `demo_file` - Demonstrations, required when `params.bc_loss` is set.
    ///
    /// # Errors
    /// `TrainErr::Config` if the budget does not cover a single epoch or the behavior
    /// cloning loss has nothing to clone.
    pub fn new(
        params: &Params,
        total_timesteps: usize,
        policy_save_interval: usize,
        save_path: Option<PathBuf>,
        demo_file: Option<PathBuf>,
    ) -> Result<Self> {
        let per_epoch = params
            .n_cycles
            .saturating_mul(params.horizon)
            .saturating_mul(params.rollout_batch_size);
        let n_epochs = total_timesteps
            .checked_div(params.n_cycles)
            .and_then(|t| t.checked_div(params.horizon))
            .and_then(|t| t.checked_div(params.rollout_batch_size))
            .unwrap_or(0);

        if n_epochs == 0 {
            return Err(TrainErr::Config(format!(
                "a budget of {total_timesteps} timesteps does not cover one epoch of {per_epoch}"
            )));
        }

        if params.bc_loss && demo_file.is_none() {
            return Err(TrainErr::Config(
                "bc_loss is enabled but no demonstration file was given".into(),
            ));
        }

        Ok(Self {
            n_epochs,
            n_cycles: params.n_cycles,
            n_batches: params.n_batches,
            n_test_rollouts: params.n_test_rollouts,
            policy_save_interval,
            save_path,
            demo_file,
        })
    }
}
