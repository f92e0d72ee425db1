use serde::{Deserialize, Serialize};

use super::params::{Params, ReplayStrategy};
use crate::error::Result;

/// Copies every `Some` field of `$layer` over the matching field of `$params`.
macro_rules! overlay {
    ($params:expr, $layer:expr, [$($field:ident),* $(,)?]) => {
        $(
            if let Some(value) = $layer.$field.clone() {
                $params.$field = value;
            }
        )*
    };
}

/// Tunables an environment may set differently from the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvOverrides {
    pub n_cycles: Option<usize>,
    pub n_batches: Option<usize>,
    pub batch_size: Option<usize>,
    pub n_test_rollouts: Option<usize>,
    pub buffer_size: Option<usize>,
    pub polyak: Option<f64>,
    pub q_lr: Option<f64>,
    pub random_eps: Option<f64>,
    pub noise_eps: Option<f64>,
    pub replay_k: Option<usize>,
}

/// Launcher-level choices, these win over everything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overrides {
    pub n_cycles: Option<usize>,
    pub n_batches: Option<usize>,
    pub batch_size: Option<usize>,
    pub n_test_rollouts: Option<usize>,
    pub replay_strategy: Option<ReplayStrategy>,
    pub replay_k: Option<usize>,
    pub clip_return: Option<bool>,
    pub test_with_polyak: Option<bool>,
    pub bc_loss: Option<bool>,
    pub q_filter: Option<bool>,
    pub num_demo: Option<usize>,
}

/// Resolves `Params` from a base and up to two override layers.
///
/// For every field the final overrides win over the environment overrides, which win
/// over the base. Values the environment dictates (its name, horizon and amount of
/// sub-environments) are applied last and cannot be overridden.
#[derive(Debug, Clone)]
pub struct ParamsBuilder {
    base: Params,
    env: Option<EnvOverrides>,
    overrides: Overrides,
    env_name: Option<String>,
    horizon: Option<usize>,
    rollout_batch_size: Option<usize>,
}

impl ParamsBuilder {
    pub fn new(base: Params) -> Self {
        Self {
            base,
            env: None,
            overrides: Overrides::default(),
            env_name: None,
            horizon: None,
            rollout_batch_size: None,
        }
    }

    pub fn env_overrides(mut self, env: Option<EnvOverrides>) -> Self {
        self.env = env;
        self
    }

    pub fn overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Pins the values read off the environment instance.
    pub fn environment(mut self, name: impl Into<String>, horizon: usize, num_envs: usize) -> Self {
        self.env_name = Some(name.into());
        self.horizon = Some(horizon);
        self.rollout_batch_size = Some(num_envs);
        self
    }

    /// Merges the layers and validates the result.
    ///
    /// # Errors
    /// `TrainErr::Config` if the merged parameters are invalid.
    pub fn build(self) -> Result<Params> {
        let mut params = self.base;

        if let Some(env) = &self.env {
            overlay!(
                params,
                env,
                [
                    n_cycles,
                    n_batches,
                    batch_size,
                    n_test_rollouts,
                    buffer_size,
                    polyak,
                    q_lr,
                    random_eps,
                    noise_eps,
                    replay_k,
                ]
            );
        }

        overlay!(
            params,
            self.overrides,
            [
                n_cycles,
                n_batches,
                batch_size,
                n_test_rollouts,
                replay_strategy,
                replay_k,
                clip_return,
                test_with_polyak,
                bc_loss,
                q_filter,
                num_demo,
            ]
        );

        overlay!(params, self, [env_name, horizon, rollout_batch_size]);

        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrainErr;

    #[test]
    fn base_passes_through() {
        let params = ParamsBuilder::new(Params::default()).build().unwrap();
        assert_eq!(params, Params::default());
    }

    #[test]
    fn later_layers_win_field_by_field() {
        let env = EnvOverrides {
            n_cycles: Some(10),
            n_batches: Some(5),
            ..Default::default()
        };
        let overrides = Overrides {
            n_cycles: Some(3),
            replay_strategy: Some(ReplayStrategy::None),
            ..Default::default()
        };

        let params = ParamsBuilder::new(Params::default())
            .env_overrides(Some(env))
            .overrides(overrides)
            .build()
            .unwrap();

        assert_eq!(params.n_cycles, 3);
        assert_eq!(params.n_batches, 5);
        assert_eq!(params.replay_strategy, ReplayStrategy::None);
        assert_eq!(params.batch_size, Params::default().batch_size);
    }

    #[test]
    fn environment_values_are_pinned() {
        let params = ParamsBuilder::new(Params::default())
            .environment("LineReach-v0", 10, 2)
            .build()
            .unwrap();

        assert_eq!(params.env_name, "LineReach-v0");
        assert_eq!(params.horizon, 10);
        assert_eq!(params.rollout_batch_size, 2);
    }

    #[test]
    fn invalid_merge_is_rejected() {
        let env = EnvOverrides {
            random_eps: Some(2.0),
            ..Default::default()
        };
        let err = ParamsBuilder::new(Params::default())
            .env_overrides(Some(env))
            .build()
            .unwrap_err();

        assert!(matches!(err, TrainErr::Config(_)));
    }
}
