use std::{
    collections::VecDeque,
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::Path,
};

use log::debug;
use rand::{Rng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use trainer::{Logs, MetricValue, Params, Policy, RolloutParams};

use super::{
    env::{N_ACTIONS, reward},
    error::SimErr,
};

/// One agent's trajectory: `obs` holds the initial cell and the cell after every action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub goal: usize,
    pub obs: Vec<usize>,
    pub actions: Vec<usize>,
}

impl Episode {
    pub fn final_cell(&self) -> Option<usize> {
        self.obs.last().copied()
    }

    fn check(&self, cells: usize) -> Result<(), SimErr> {
        if self.obs.len() != self.actions.len() + 1 {
            return Err(SimErr::Shape(format!(
                "{} observations for {} actions",
                self.obs.len(),
                self.actions.len()
            )));
        }
        if self.actions.is_empty() {
            return Err(SimErr::Shape("episode without actions".into()));
        }
        if self.goal >= cells || self.obs.iter().any(|&o| o >= cells) {
            return Err(SimErr::Shape(format!("cell out of a line of {cells}")));
        }
        if self.actions.iter().any(|&a| a >= N_ACTIONS) {
            return Err(SimErr::Shape("unknown action".into()));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct Tables {
    cells: usize,
    q: Vec<f64>,
    target: Vec<f64>,
}

/// The hyperparameters the tabular learner uses.
#[derive(Debug, Clone, Copy)]
struct Hyper {
    gamma: f64,
    polyak: f64,
    lr: f64,
    batch_size: usize,
    future_p: f64,
    clip_return: bool,
    bc_loss: bool,
    q_filter: bool,
    demo_batch_size: usize,
    num_demo: usize,
    episode_capacity: usize,
}

/// Goal-conditioned tabular Q-learning over hindsight-relabeled episodes.
///
/// The online and target tables are indexed by `(cell, goal, action)`.
#[derive(Debug)]
pub struct TabularPolicy {
    cells: usize,
    q: Vec<f64>,
    target: Vec<f64>,
    buffer: VecDeque<Episode>,
    demos: Vec<Episode>,
    hyper: Hyper,
    rng: StdRng,
    q_loss: f64,
    bc_loss: f64,
}

impl TabularPolicy {
    /// Creates a new `TabularPolicy` for a line of `cells` cells.
    ///
    /// # Arguments
    /// * `cells` - The amount of cells, and so of goals.
    /// * `params` - The run's parameters.
    /// * `rng` - Samples training batches.
    pub fn new(cells: usize, params: &Params, rng: StdRng) -> Self {
        let size = cells * cells * N_ACTIONS;
        let worst = -1. / (1. - params.gamma());
        let hyper = Hyper {
            gamma: params.gamma(),
            polyak: params.polyak,
            lr: params.q_lr,
            batch_size: params.batch_size,
            future_p: params.future_p(),
            clip_return: params.clip_return,
            bc_loss: params.bc_loss,
            q_filter: params.q_filter,
            demo_batch_size: params.demo_batch_size,
            num_demo: params.num_demo,
            episode_capacity: (params.buffer_size / params.horizon).max(1),
        };

        Self {
            cells,
            q: vec![worst; size],
            target: vec![worst; size],
            buffer: VecDeque::new(),
            demos: Vec::new(),
            hyper,
            rng,
            q_loss: 0.,
            bc_loss: 0.,
        }
    }

    fn index(&self, cell: usize, goal: usize) -> usize {
        (cell * self.cells + goal) * N_ACTIONS
    }

    /// The action values of `cell` when aiming for `goal`.
    pub fn values(&self, cell: usize, goal: usize, use_target_net: bool) -> &[f64] {
        let table = if use_target_net { &self.target } else { &self.q };
        let i = self.index(cell, goal);
        &table[i..i + N_ACTIONS]
    }

    /// Picks an action for an agent.
    ///
    /// Exploring workers act uniformly at random with probability `random_eps`, and
    /// otherwise act greedily on values perturbed by up to `noise_eps`.
    ///
    /// # Returns
    /// The action and its unperturbed value.
    pub fn act(
        &self,
        cell: usize,
        goal: usize,
        params: &RolloutParams,
        rng: &mut StdRng,
    ) -> (usize, f64) {
        let values = self.values(cell, goal, params.use_target_net);

        if !params.exploit && rng.random::<f64>() < params.random_eps {
            let action = rng.random_range(0..N_ACTIONS);
            return (action, values[action]);
        }

        let mut best = 0;
        let mut best_value = f64::NEG_INFINITY;
        for (action, &value) in values.iter().enumerate() {
            let noisy = if params.exploit {
                value
            } else {
                value + params.noise_eps * rng.random_range(-1.0..1.0)
            };
            if noisy > best_value {
                best = action;
                best_value = noisy;
            }
        }

        (best, values[best])
    }

    /// A random demonstration's start cell and goal.
    pub fn demo_state(&self, rng: &mut StdRng) -> Option<(usize, usize)> {
        if self.demos.is_empty() {
            return None;
        }
        let demo = &self.demos[rng.random_range(0..self.demos.len())];
        Some((demo.obs[0], demo.goal))
    }

    pub fn stored_episodes(&self) -> usize {
        self.buffer.len()
    }

    /// Samples a transition and relabels its goal with a later cell of the same episode.
    fn sample(&mut self, from_demos: bool) -> (usize, usize, usize, usize) {
        let count = if from_demos { self.demos.len() } else { self.buffer.len() };
        let idx = self.rng.random_range(0..count);
        let episode = if from_demos { &self.demos[idx] } else { &self.buffer[idx] };

        let horizon = episode.actions.len();
        let t = self.rng.random_range(0..horizon);
        let goal = if self.rng.random::<f64>() < self.hyper.future_p {
            episode.obs[self.rng.random_range(t + 1..=horizon)]
        } else {
            episode.goal
        };

        (episode.obs[t], episode.actions[t], episode.obs[t + 1], goal)
    }

    fn td_step(&mut self) -> f64 {
        let (cell, action, next, goal) = self.sample(false);

        let next_value = self
            .values(next, goal, true)
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let mut target = reward(next, goal) + self.hyper.gamma * next_value;
        if self.hyper.clip_return {
            target = target.clamp(-1. / (1. - self.hyper.gamma), 0.);
        }

        let i = self.index(cell, goal) + action;
        let td = target - self.q[i];
        self.q[i] += self.hyper.lr * td;
        td * td
    }

    /// Nudges the value of a demonstrated action up to the best value of its state.
    fn bc_step(&mut self) -> f64 {
        let (cell, action, _, goal) = self.sample(true);
        let i = self.index(cell, goal);

        let greedy = argmax(&self.q[i..i + N_ACTIONS]);
        if greedy == action {
            return 0.;
        }

        if self.hyper.q_filter && self.target[i + action] < self.target[i + greedy] {
            return 0.;
        }

        let gap = self.q[i + greedy] - self.q[i + action];
        self.q[i + action] += self.hyper.lr * gap;
        1.
    }
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_v), (i, &v)| {
            if v > best_v { (i, v) } else { (best, best_v) }
        })
        .0
}

impl Policy for TabularPolicy {
    type Episode = Vec<Episode>;
    type Error = SimErr;

    fn store_episode(&mut self, episodes: Vec<Episode>) -> Result<(), SimErr> {
        for episode in episodes {
            episode.check(self.cells)?;
            if self.buffer.len() == self.hyper.episode_capacity {
                self.buffer.pop_front();
            }
            self.buffer.push_back(episode);
        }
        Ok(())
    }

    fn train(&mut self) -> Result<(), SimErr> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let batch = self.hyper.batch_size;
        self.q_loss = (0..batch).map(|_| self.td_step()).sum::<f64>() / batch as f64;

        if self.hyper.bc_loss && !self.demos.is_empty() {
            let batch = self.hyper.demo_batch_size.max(1);
            self.bc_loss = (0..batch).map(|_| self.bc_step()).sum::<f64>() / batch as f64;
        }

        Ok(())
    }

    fn update_target_net(&mut self) {
        let polyak = self.hyper.polyak;
        for (target, q) in self.target.iter_mut().zip(&self.q) {
            *target = polyak * *target + (1. - polyak) * q;
        }
    }

    fn logs(&self) -> Logs {
        let mut logs = vec![
            ("stats/buffer_episodes".into(), MetricValue::from(self.buffer.len())),
            ("stats/q_loss".into(), MetricValue::from(self.q_loss)),
        ];
        if self.hyper.bc_loss {
            logs.push(("stats/bc_loss".into(), MetricValue::from(self.bc_loss)));
        }
        logs
    }

    fn uses_bc_loss(&self) -> bool {
        self.hyper.bc_loss
    }

    fn init_demo_buffer(&mut self, path: &Path) -> Result<(), SimErr> {
        let reader = BufReader::new(File::open(path)?);
        let mut demos: Vec<Episode> = serde_json::from_reader(reader)?;
        demos.truncate(self.hyper.num_demo);

        for demo in &demos {
            demo.check(self.cells)?;
        }

        debug!("loaded {} demonstrations from {}", demos.len(), path.display());
        self.demos = demos;
        Ok(())
    }

    fn save(&self, path: &Path) -> io::Result<()> {
        let tables = Tables {
            cells: self.cells,
            q: self.q.clone(),
            target: self.target.clone(),
        };
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &tables).map_err(io::Error::other)?;
        writer.flush()
    }

    fn load(&mut self, path: &Path) -> Result<(), SimErr> {
        let reader = BufReader::new(File::open(path)?);
        let tables: Tables = serde_json::from_reader(reader)?;

        let size = self.cells * self.cells * N_ACTIONS;
        if tables.cells != self.cells || tables.q.len() != size || tables.target.len() != size {
            return Err(SimErr::Shape(format!(
                "checkpoint is for a line of {} cells, expected {}",
                tables.cells, self.cells
            )));
        }

        self.q = tables.q;
        self.target = tables.target;
        Ok(())
    }
}
