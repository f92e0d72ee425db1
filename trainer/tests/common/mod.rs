#![allow(dead_code)]

use std::{
    fs,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use rand::rngs::StdRng;
use trainer::{
    Components, EnvOverrides, Environment, Logs, MetricValue, Params, Policy, RolloutParams,
    RolloutWorker, RunConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Rollout,
    Eval,
    Store,
    Train,
    UpdateTarget,
}

pub type Journal = Arc<Mutex<Vec<Event>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn note(journal: &Journal, event: Event) {
    journal.lock().unwrap().push(event);
}

/// Counts its optimization steps and saves the count.
#[derive(Debug)]
pub struct FakePolicy {
    pub journal: Journal,
    pub trains: usize,
    pub fail_train_at: Option<usize>,
    pub bc_loss: bool,
    pub demo: Option<PathBuf>,
}

impl FakePolicy {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            trains: 0,
            fail_train_at: None,
            bc_loss: false,
            demo: None,
        }
    }
}

impl Policy for FakePolicy {
    type Episode = usize;
    type Error = String;

    fn store_episode(&mut self, _episode: usize) -> Result<(), String> {
        note(&self.journal, Event::Store);
        Ok(())
    }

    fn train(&mut self) -> Result<(), String> {
        if self.fail_train_at == Some(self.trains) {
            return Err("loss diverged".into());
        }
        self.trains += 1;
        note(&self.journal, Event::Train);
        Ok(())
    }

    fn update_target_net(&mut self) {
        note(&self.journal, Event::UpdateTarget);
    }

    fn logs(&self) -> Logs {
        vec![("stats/trains".into(), MetricValue::from(self.trains))]
    }

    fn uses_bc_loss(&self) -> bool {
        self.bc_loss
    }

    fn init_demo_buffer(&mut self, path: &Path) -> Result<(), String> {
        self.demo = Some(path.to_path_buf());
        Ok(())
    }

    fn save(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.trains.to_string())
    }

    fn load(&mut self, path: &Path) -> Result<(), String> {
        let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
        self.trains = text.trim().parse().map_err(|e| format!("{e}"))?;
        Ok(())
    }
}

/// Replays a scripted success rate per epoch, an epoch starts at every history reset.
pub struct FakeWorker {
    pub journal: Journal,
    pub event: Event,
    pub rates: Vec<f64>,
    pub epoch: Option<usize>,
    pub episodes: usize,
}

impl FakeWorker {
    pub fn new(journal: Journal, event: Event, rates: Vec<f64>) -> Self {
        Self {
            journal,
            event,
            rates,
            epoch: None,
            episodes: 0,
        }
    }
}

impl RolloutWorker<FakePolicy> for FakeWorker {
    type Error = String;

    fn clear_history(&mut self) {
        self.epoch = Some(self.epoch.map_or(0, |e| e + 1));
    }

    fn generate_rollouts(&mut self, _policy: &FakePolicy) -> Result<usize, String> {
        note(&self.journal, self.event);
        self.episodes += 1;
        Ok(self.episodes)
    }

    fn logs(&self, prefix: &str) -> Logs {
        vec![
            (
                format!("{prefix}/success_rate"),
                MetricValue::from(self.current_success_rate()),
            ),
            (format!("{prefix}/episode"), MetricValue::from(self.episodes)),
        ]
    }

    fn current_success_rate(&self) -> f64 {
        let epoch = self.epoch.unwrap_or(0);
        self.rates.get(epoch).copied().unwrap_or(0.0)
    }
}

pub fn run_config(n_epochs: usize, n_cycles: usize, interval: usize, save_path: Option<PathBuf>) -> RunConfig {
    RunConfig {
        n_epochs,
        n_cycles,
        n_batches: 3,
        n_test_rollouts: 2,
        policy_save_interval: interval,
        save_path,
        demo_file: None,
    }
}

pub struct FakeEnv {
    pub id: String,
}

impl Environment for FakeEnv {
    fn id(&self) -> &str {
        &self.id
    }

    fn num_envs(&self) -> usize {
        2
    }

    fn horizon(&self) -> usize {
        5
    }
}

/// Builds fake collaborators for the single registered environment `Fake-v0`.
pub struct FakeComponents {
    pub journal: Journal,
    pub rate: f64,
}

impl Components for FakeComponents {
    type Env = FakeEnv;
    type Policy = FakePolicy;
    type Worker = FakeWorker;
    type Error = String;

    fn make_env(&self, env_id: &str, _rng: StdRng) -> Result<FakeEnv, String> {
        match env_id {
            "Fake-v0" => Ok(FakeEnv { id: env_id.into() }),
            other => Err(format!("unknown environment {other}")),
        }
    }

    fn env_overrides(&self, _env_id: &str) -> Option<EnvOverrides> {
        Some(EnvOverrides {
            n_cycles: Some(2),
            n_batches: Some(1),
            n_test_rollouts: Some(1),
            ..Default::default()
        })
    }

    fn make_policy(&self, params: &Params, _rng: StdRng) -> Result<FakePolicy, String> {
        let mut policy = FakePolicy::new(self.journal.clone());
        policy.bc_loss = params.bc_loss;
        Ok(policy)
    }

    fn make_rollout_worker(
        &self,
        _env: FakeEnv,
        params: &RolloutParams,
        _rng: StdRng,
    ) -> Result<FakeWorker, String> {
        let event = if params.exploit { Event::Eval } else { Event::Rollout };
        Ok(FakeWorker::new(self.journal.clone(), event, vec![self.rate; 16]))
    }
}
