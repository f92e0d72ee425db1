//! Cross-worker reduction of logged metrics.

use std::io;

use comms::Collective;

use crate::{TrainErr, agent::MetricValue, error::Result};

/// Summary statistics of a metric over every worker's readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub mean: f64,
    pub std: f64,
    pub count: f64,
}

/// Computes the global moments of the readings held by every worker.
///
/// A worker with no readings contributes a single zero, so every worker always takes part
/// in the average. Every worker must call this the same amount of times in the same order.
///
/// # Arguments
/// * `collective` - The worker group.
/// * `local` - This worker's readings.
///
/// # Returns
/// The mean, standard deviation and reading count over the concatenation of all workers'
/// readings, identical on every worker.
pub async fn moments<C: Collective>(collective: &mut C, local: &[f64]) -> Result<Moments> {
    let local = if local.is_empty() { &[0.][..] } else { local };

    let totals = collective
        .allreduce(&[local.iter().sum(), local.len() as f64])
        .await
        .map_err(TrainErr::Comms)?;

    let [sum, count] = totals[..] else {
        return Err(reduced_len(totals.len(), 2));
    };

    let mean = sum / count;
    let sq_dev: f64 = local.iter().map(|x| (x - mean).powi(2)).sum();

    let totals = collective
        .allreduce(&[sq_dev])
        .await
        .map_err(TrainErr::Comms)?;

    let [sq_dev] = totals[..] else {
        return Err(reduced_len(totals.len(), 1));
    };

    Ok(Moments {
        mean,
        std: (sq_dev / count).sqrt(),
        count,
    })
}

/// The global mean of a metric, see `moments`.
pub async fn average<C: Collective>(collective: &mut C, value: impl Into<MetricValue>) -> Result<f64> {
    let values = value.into().into_values();
    Ok(moments(collective, &values).await?.mean)
}

fn reduced_len(got: usize, expected: usize) -> TrainErr {
    TrainErr::Comms(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("reduction returned {got} values, expected {expected}"),
    ))
}
