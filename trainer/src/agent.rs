//! The collaborators driven by the training loop.
//!
//! The loop never looks inside them: it only needs to collect episodes, feed them to the
//! policy, ask for optimization steps and read back named metrics.

use std::{fmt, io, path::Path};

/// A named metric as reported by a collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Scalar(f64),
    Series(Vec<f64>),
}

impl MetricValue {
    /// The readings this worker contributes to the cross-worker average.
    pub fn into_values(self) -> Vec<f64> {
        match self {
            MetricValue::Scalar(x) => vec![x],
            MetricValue::Series(xs) => xs,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<usize> for MetricValue {
    fn from(value: usize) -> Self {
        Self::Scalar(value as f64)
    }
}

impl From<Vec<f64>> for MetricValue {
    fn from(value: Vec<f64>) -> Self {
        Self::Series(value)
    }
}

/// Metrics in the order they should show up in the log table.
pub type Logs = Vec<(String, MetricValue)>;

/// A (possibly vectorized) simulation environment.
pub trait Environment {
    /// The registry identifier of the environment.
    fn id(&self) -> &str;

    /// How many sub-environments are stepped together, one episode each per rollout.
    fn num_envs(&self) -> usize;

    /// The maximum amount of steps of an episode.
    fn horizon(&self) -> usize;
}

/// The learning algorithm, its replay buffer and its networks.
pub trait Policy {
    /// A batch of episodes, one per sub-environment.
    type Episode;
    type Error: fmt::Display;

    /// Adds a batch of episodes to the replay buffer.
    fn store_episode(&mut self, episode: Self::Episode) -> Result<(), Self::Error>;

    /// Runs a single optimization step.
    fn train(&mut self) -> Result<(), Self::Error>;

    /// Moves the target networks towards the online ones.
    fn update_target_net(&mut self);

    /// Optimization statistics since the last call.
    fn logs(&self) -> Logs;

    /// Whether the behavior cloning auxiliary loss is enabled.
    fn uses_bc_loss(&self) -> bool;

    /// Loads demonstration episodes used by the behavior cloning loss.
    fn init_demo_buffer(&mut self, path: &Path) -> Result<(), Self::Error>;

    /// Writes the policy's state to `path`.
    fn save(&self, path: &Path) -> io::Result<()>;

    /// Restores a state previously written by `save`.
    fn load(&mut self, path: &Path) -> Result<(), Self::Error>;
}

/// Collects episodes by running a policy against its own environment instance.
///
/// The training loop holds two of these: one exploring to gather training data and an
/// evaluator acting greedily to measure the success rate.
pub trait RolloutWorker<P: Policy> {
    type Error: fmt::Display;

    /// Forgets the rolling success and value histories.
    fn clear_history(&mut self);

    /// Runs one episode per sub-environment with the current policy.
    fn generate_rollouts(&mut self, policy: &P) -> Result<P::Episode, Self::Error>;

    /// Rollout statistics, keys are namespaced as `{prefix}/{name}`.
    fn logs(&self, prefix: &str) -> Logs;

    /// The success rate over the rolling history.
    fn current_success_rate(&self) -> f64;
}
