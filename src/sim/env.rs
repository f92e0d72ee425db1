use rand::{Rng, rngs::StdRng};
use trainer::{EnvOverrides, Environment};

/// Move one cell left, stay, or move one cell right.
pub const N_ACTIONS: usize = 3;

/// A registered variant of the line reaching task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSpec {
    pub id: &'static str,
    pub cells: usize,
    pub horizon: usize,
    pub num_envs: usize,
    n_cycles: usize,
    n_batches: usize,
    batch_size: usize,
    q_lr: f64,
}

const REGISTRY: [LineSpec; 2] = [
    LineSpec {
        id: "LineReach-v0",
        cells: 8,
        horizon: 10,
        num_envs: 2,
        n_cycles: 10,
        n_batches: 10,
        batch_size: 64,
        q_lr: 0.5,
    },
    LineSpec {
        id: "LineReach-v1",
        cells: 16,
        horizon: 20,
        num_envs: 2,
        n_cycles: 20,
        n_batches: 20,
        batch_size: 128,
        q_lr: 0.5,
    },
];

/// Finds the variant registered as `id`.
pub fn lookup(id: &str) -> Option<LineSpec> {
    REGISTRY.iter().find(|spec| spec.id == id).copied()
}

impl LineSpec {
    /// The tunables this variant trains best with.
    pub fn overrides(&self) -> EnvOverrides {
        EnvOverrides {
            n_cycles: Some(self.n_cycles),
            n_batches: Some(self.n_batches),
            batch_size: Some(self.batch_size),
            q_lr: Some(self.q_lr),
            ..Default::default()
        }
    }
}

/// The reward of reaching `achieved` when aiming for `goal`.
pub fn reward(achieved: usize, goal: usize) -> f64 {
    if achieved == goal { 0. } else { -1. }
}

/// A batch of agents on a line of cells, each trying to end its episode on its goal cell.
#[derive(Debug, Clone)]
pub struct LineReach {
    spec: LineSpec,
    rng: StdRng,
    positions: Vec<usize>,
    goals: Vec<usize>,
}

impl LineReach {
    pub fn new(spec: LineSpec, rng: StdRng) -> Self {
        Self {
            spec,
            rng,
            positions: vec![0; spec.num_envs],
            goals: vec![0; spec.num_envs],
        }
    }

    pub fn spec(&self) -> &LineSpec {
        &self.spec
    }

    /// Places every agent on a random cell with a different random goal.
    pub fn reset(&mut self) {
        let cells = self.spec.cells;
        for (pos, goal) in self.positions.iter_mut().zip(&mut self.goals) {
            *pos = self.rng.random_range(0..cells);
            *goal = (*pos + self.rng.random_range(1..cells)) % cells;
        }
    }

    /// Restarts sub-environment `idx` from a given position and goal.
    pub fn reset_to(&mut self, idx: usize, position: usize, goal: usize) {
        self.positions[idx] = position.min(self.spec.cells - 1);
        self.goals[idx] = goal.min(self.spec.cells - 1);
    }

    /// Applies one action per sub-environment, agents stop at both ends of the line.
    pub fn step(&mut self, actions: &[usize]) {
        let last = self.spec.cells - 1;
        for (pos, &action) in self.positions.iter_mut().zip(actions) {
            *pos = match action {
                0 => pos.saturating_sub(1),
                2 => (*pos + 1).min(last),
                _ => *pos,
            };
        }
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn goals(&self) -> &[usize] {
        &self.goals
    }
}

impl Environment for LineReach {
    fn id(&self) -> &str {
        self.spec.id
    }

    fn num_envs(&self) -> usize {
        self.spec.num_envs
    }

    fn horizon(&self) -> usize {
        self.spec.horizon
    }
}
