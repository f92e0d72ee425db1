use std::{error::Error, fmt, io, path::PathBuf};

/// The trainer module's result type.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// Failures that end a training run.
///
/// None of them is retried, a training run is a batch job and every error is fatal.
#[derive(Debug)]
pub enum TrainErr {
    /// Rejected configuration, detected before any training starts.
    Config(String),
    /// A collective call failed, the group can no longer make progress.
    Comms(io::Error),
    /// The environment, the rollout workers or the policy failed.
    Collaborator { stage: &'static str, msg: String },
    /// Two ranks drew the same random value, their seeds are correlated.
    SeedCorrelation { rank: usize, value: f64 },
    /// Writing a checkpoint slot failed.
    Checkpoint { path: PathBuf, source: io::Error },
    /// Any other filesystem failure (logs, parameter snapshots).
    Io(io::Error),
    /// Encoding or decoding a JSON document failed.
    Serde(serde_json::Error),
}

impl TrainErr {
    /// Wraps a collaborator failure with the stage of the loop where it happened.
    pub fn collaborator(stage: &'static str, err: impl fmt::Display) -> Self {
        Self::Collaborator {
            stage,
            msg: err.to_string(),
        }
    }
}

impl fmt::Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Config(msg) => write!(f, "invalid configuration: {msg}"),
            TrainErr::Comms(e) => write!(f, "collective communication failed: {e}"),
            TrainErr::Collaborator { stage, msg } => write!(f, "{stage} failed: {msg}"),
            TrainErr::SeedCorrelation { rank, value } => write!(
                f,
                "rank {rank} drew the same random value as rank 0 ({value}), workers are not decorrelated"
            ),
            TrainErr::Checkpoint { path, source } => {
                write!(f, "could not write checkpoint {}: {source}", path.display())
            }
            TrainErr::Io(e) => write!(f, "io error: {e}"),
            TrainErr::Serde(e) => write!(f, "serialization error: {e}"),
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Comms(e) | TrainErr::Io(e) => Some(e),
            TrainErr::Checkpoint { source, .. } => Some(source),
            TrainErr::Serde(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for TrainErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}
