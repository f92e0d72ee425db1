//! Run parameters and their layering.

mod builder;
mod params;
mod run;

pub use builder::{EnvOverrides, Overrides, ParamsBuilder};
pub use params::{Params, ReplayStrategy, RolloutParams};
pub use run::RunConfig;
