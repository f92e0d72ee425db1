use std::{error::Error, fmt, io};

/// Failures of the simulated task.
#[derive(Debug)]
pub enum SimErr {
    UnknownEnv(String),
    /// An episode does not fit the environment it is used with.
    Shape(String),
    Io(io::Error),
    Serde(serde_json::Error),
}

impl fmt::Display for SimErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimErr::UnknownEnv(id) => write!(f, "no environment registered as {id:?}"),
            SimErr::Shape(detail) => write!(f, "malformed episode: {detail}"),
            SimErr::Io(e) => write!(f, "io error: {e}"),
            SimErr::Serde(e) => write!(f, "serialization error: {e}"),
        }
    }
}

impl Error for SimErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SimErr::Io(e) => Some(e),
            SimErr::Serde(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SimErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for SimErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}
