pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod identity;
pub mod learn;
pub mod logger;
pub mod metrics;
pub mod seeding;
pub mod training;

pub use agent::{Environment, Logs, MetricValue, Policy, RolloutWorker};
pub use checkpoint::{BestTracker, CheckpointPlan, CheckpointPolicy, CheckpointSlots, Slot};
pub use config::{EnvOverrides, Overrides, Params, ParamsBuilder, ReplayStrategy, RolloutParams, RunConfig};
pub use error::{Result, TrainErr};
pub use identity::WorkerIdentity;
pub use learn::{Components, LearnArgs, learn};
pub use logger::TabularLogger;
pub use seeding::SeedDecorrelator;
pub use training::{EpochReport, TrainSummary, Trained, TrainingLoop};
