//! A goal reaching task small enough to train in seconds.
//!
//! Agents live on a line of cells and must end their episode on a goal cell. The sparse
//! reward makes it a good fit for hindsight relabeling: a failed episode still shows how
//! to reach every cell it visited.

mod env;
mod error;
mod policy;
mod rollout;

use rand::rngs::StdRng;
use trainer::{Components, EnvOverrides, Params, RolloutParams};

pub use env::{LineReach, LineSpec, N_ACTIONS, lookup, reward};
pub use error::SimErr;
pub use policy::{Episode, TabularPolicy};
pub use rollout::{HISTORY_LEN, LineRollout};

/// Builds the collaborators of a `LineReach` run.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineReachTask;

impl Components for LineReachTask {
    type Env = LineReach;
    type Policy = TabularPolicy;
    type Worker = LineRollout;
    type Error = SimErr;

    fn make_env(&self, env_id: &str, rng: StdRng) -> Result<LineReach, SimErr> {
        let spec = lookup(env_id).ok_or_else(|| SimErr::UnknownEnv(env_id.into()))?;
        Ok(LineReach::new(spec, rng))
    }

    fn env_overrides(&self, env_id: &str) -> Option<EnvOverrides> {
        lookup(env_id).map(|spec| spec.overrides())
    }

    fn make_policy(&self, params: &Params, rng: StdRng) -> Result<TabularPolicy, SimErr> {
        let spec =
            lookup(&params.env_name).ok_or_else(|| SimErr::UnknownEnv(params.env_name.clone()))?;
        Ok(TabularPolicy::new(spec.cells, params, rng))
    }

    fn make_rollout_worker(
        &self,
        env: LineReach,
        params: &RolloutParams,
        rng: StdRng,
    ) -> Result<LineRollout, SimErr> {
        Ok(LineRollout::new(env, *params, rng))
    }
}
