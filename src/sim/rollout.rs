use std::collections::VecDeque;

use rand::{Rng, rngs::StdRng};
use trainer::{Environment, Logs, MetricValue, RolloutParams, RolloutWorker};

use super::{
    env::LineReach,
    error::SimErr,
    policy::{Episode, TabularPolicy},
};

/// Rollouts remembered by the success and value statistics.
pub const HISTORY_LEN: usize = 100;

/// Chance of starting an agent from a demonstration state, when allowed.
const DEMO_START_P: f64 = 0.5;

/// Runs a policy against its own `LineReach` instance.
#[derive(Debug)]
pub struct LineRollout {
    env: LineReach,
    params: RolloutParams,
    rng: StdRng,
    success_history: VecDeque<f64>,
    q_history: VecDeque<f64>,
    n_episodes: usize,
}

impl LineRollout {
    pub fn new(env: LineReach, params: RolloutParams, rng: StdRng) -> Self {
        Self {
            env,
            params,
            rng,
            success_history: VecDeque::with_capacity(HISTORY_LEN),
            q_history: VecDeque::with_capacity(HISTORY_LEN),
            n_episodes: 0,
        }
    }

    fn reset(&mut self, policy: &TabularPolicy) {
        self.env.reset();
        if !self.params.use_demo_states {
            return;
        }

        for idx in 0..self.env.num_envs() {
            if self.rng.random::<f64>() >= DEMO_START_P {
                continue;
            }
            if let Some((start, goal)) = policy.demo_state(&mut self.rng) {
                self.env.reset_to(idx, start, goal);
            }
        }
    }
}

fn push_bounded(history: &mut VecDeque<f64>, value: f64) {
    if history.len() == HISTORY_LEN {
        history.pop_front();
    }
    history.push_back(value);
}

fn mean(values: &VecDeque<f64>) -> f64 {
    if values.is_empty() {
        return 0.;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

impl RolloutWorker<TabularPolicy> for LineRollout {
    type Error = SimErr;

    fn clear_history(&mut self) {
        self.success_history.clear();
        self.q_history.clear();
    }

    fn generate_rollouts(&mut self, policy: &TabularPolicy) -> Result<Vec<Episode>, SimErr> {
        self.reset(policy);

        let goals = self.env.goals().to_vec();
        let mut episodes: Vec<_> = self
            .env
            .positions()
            .iter()
            .zip(&goals)
            .map(|(&start, &goal)| Episode {
                goal,
                obs: vec![start],
                actions: Vec::with_capacity(self.params.horizon),
            })
            .collect();

        let mut q_sum = 0.;
        let mut actions = vec![0; episodes.len()];
        for _ in 0..self.params.horizon {
            for (action, (&cell, &goal)) in actions
                .iter_mut()
                .zip(self.env.positions().iter().zip(&goals))
            {
                let (chosen, q) = policy.act(cell, goal, &self.params, &mut self.rng);
                *action = chosen;
                q_sum += q;
            }

            self.env.step(&actions);

            for (episode, (&action, &cell)) in episodes
                .iter_mut()
                .zip(actions.iter().zip(self.env.positions()))
            {
                episode.actions.push(action);
                episode.obs.push(cell);
            }
        }

        let successes = episodes
            .iter()
            .filter(|e| e.final_cell() == Some(e.goal))
            .count();
        push_bounded(
            &mut self.success_history,
            successes as f64 / episodes.len() as f64,
        );

        if self.params.compute_q {
            let steps = (episodes.len() * self.params.horizon).max(1);
            push_bounded(&mut self.q_history, q_sum / steps as f64);
        }

        self.n_episodes += episodes.len();
        Ok(episodes)
    }

    fn logs(&self, prefix: &str) -> Logs {
        let mut logs = vec![(
            format!("{prefix}/success_rate"),
            MetricValue::from(mean(&self.success_history)),
        )];
        if self.params.compute_q {
            logs.push((
                format!("{prefix}/mean_Q"),
                MetricValue::from(mean(&self.q_history)),
            ));
        }
        logs.push((format!("{prefix}/episode"), MetricValue::from(self.n_episodes)));
        logs
    }

    fn current_success_rate(&self) -> f64 {
        mean(&self.success_history)
    }
}
