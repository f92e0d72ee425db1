use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{TrainErr, error::Result};

/// How stored episodes are relabeled with hindsight goals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayStrategy {
    /// Replace the goal with a state reached later in the same episode.
    #[default]
    Future,
    /// Keep the original goals.
    None,
}

impl fmt::Display for ReplayStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayStrategy::Future => f.write_str("future"),
            ReplayStrategy::None => f.write_str("none"),
        }
    }
}

impl FromStr for ReplayStrategy {
    type Err = TrainErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "future" => Ok(Self::Future),
            "none" => Ok(Self::None),
            other => Err(TrainErr::Config(format!("unknown replay strategy {other:?}"))),
        }
    }
}

/// Every tunable of a training run, fully resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Params {
    pub env_name: String,
    /// Steps per episode.
    #[serde(rename = "T")]
    pub horizon: usize,
    pub n_cycles: usize,
    pub n_batches: usize,
    pub batch_size: usize,
    pub n_test_rollouts: usize,
    pub rollout_batch_size: usize,
    pub buffer_size: usize,
    pub polyak: f64,
    pub q_lr: f64,
    pub random_eps: f64,
    pub noise_eps: f64,
    pub replay_strategy: ReplayStrategy,
    pub replay_k: usize,
    pub test_with_polyak: bool,
    pub clip_return: bool,
    pub bc_loss: bool,
    pub q_filter: bool,
    pub num_demo: usize,
    pub demo_batch_size: usize,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            env_name: String::new(),
            horizon: 50,
            n_cycles: 50,
            n_batches: 40,
            batch_size: 256,
            n_test_rollouts: 10,
            rollout_batch_size: 2,
            buffer_size: 1_000_000,
            polyak: 0.95,
            q_lr: 0.001,
            random_eps: 0.3,
            noise_eps: 0.2,
            replay_strategy: ReplayStrategy::Future,
            replay_k: 4,
            test_with_polyak: false,
            clip_return: true,
            bc_loss: false,
            q_filter: false,
            num_demo: 100,
            demo_batch_size: 128,
        }
    }
}

/// Exploration and bookkeeping settings of a rollout worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RolloutParams {
    /// Act greedily, without exploration noise.
    pub exploit: bool,
    pub use_target_net: bool,
    /// Start episodes from demonstration states when available.
    pub use_demo_states: bool,
    /// Track the value estimates of the actions taken.
    pub compute_q: bool,
    pub horizon: usize,
    pub rollout_batch_size: usize,
    pub gamma: f64,
    pub noise_eps: f64,
    pub random_eps: f64,
}

#[derive(Serialize)]
struct Snapshot<'a> {
    #[serde(flatten)]
    params: &'a Params,
    gamma: f64,
}

impl Params {
    /// The discount factor, so that rewards a full episode away still count.
    pub fn gamma(&self) -> f64 {
        1. - 1. / self.horizon as f64
    }

    /// Probability that a sampled transition gets a hindsight goal.
    pub fn future_p(&self) -> f64 {
        match self.replay_strategy {
            ReplayStrategy::Future => 1. - 1. / (1. + self.replay_k as f64),
            ReplayStrategy::None => 0.,
        }
    }

    /// Rejects values no run could make progress with.
    ///
    /// # Errors
    /// `TrainErr::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, rule: &str| {
            Err(TrainErr::Config(format!("{field} must be {rule}")))
        };

        if self.n_cycles == 0 {
            return invalid("n_cycles", "at least 1");
        }
        if self.horizon == 0 {
            return invalid("T", "at least 1");
        }
        if self.batch_size == 0 {
            return invalid("batch_size", "at least 1");
        }
        if self.rollout_batch_size == 0 {
            return invalid("rollout_batch_size", "at least 1");
        }
        if !(0. ..=1.).contains(&self.polyak) {
            return invalid("polyak", "within [0, 1]");
        }
        if !(0. ..=1.).contains(&self.random_eps) {
            return invalid("random_eps", "within [0, 1]");
        }
        if !(self.noise_eps >= 0.) {
            return invalid("noise_eps", "non negative");
        }

        Ok(())
    }

    /// Settings of the worker collecting training data.
    pub fn rollout_params(&self) -> RolloutParams {
        RolloutParams {
            exploit: false,
            use_target_net: false,
            use_demo_states: true,
            compute_q: false,
            ..self.shared_rollout_params()
        }
    }

    /// Settings of the worker measuring the success rate.
    pub fn eval_params(&self) -> RolloutParams {
        RolloutParams {
            exploit: true,
            use_target_net: self.test_with_polyak,
            use_demo_states: false,
            compute_q: true,
            ..self.shared_rollout_params()
        }
    }

    fn shared_rollout_params(&self) -> RolloutParams {
        RolloutParams {
            exploit: false,
            use_target_net: false,
            use_demo_states: false,
            compute_q: false,
            horizon: self.horizon,
            rollout_batch_size: self.rollout_batch_size,
            gamma: self.gamma(),
            noise_eps: self.noise_eps,
            random_eps: self.random_eps,
        }
    }

    /// Writes the parameters, derived values included, as pretty JSON.
    pub fn write_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            params: self,
            gamma: self.gamma(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
