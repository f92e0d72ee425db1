use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, bail};
use clap::Parser;
use comms::{Collective, Solo};
use her_orchestra::sim::{LineReachTask, TabularPolicy};
use log::info;
use trainer::{LearnArgs, Overrides, ReplayStrategy, Trained};

/// Trains a goal reaching policy with hindsight experience replay on a pool of workers.
#[derive(Parser, Debug)]
#[command(name = "her-orchestra", version, about)]
struct Cli {
    /// The environment to train on.
    #[arg(long, default_value = "LineReach-v0")]
    env: String,

    /// The evaluation environment, the training one by default.
    #[arg(long)]
    eval_env: Option<String>,

    /// Environment steps to spend across the whole run.
    #[arg(long, default_value_t = 500_000)]
    total_timesteps: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Epochs between numbered checkpoints, 0 keeps only the best and latest ones.
    #[arg(long, default_value_t = 5)]
    policy_save_interval: usize,

    /// `future` relabels goals with hindsight, `none` keeps them.
    #[arg(long, default_value = "future")]
    replay_strategy: ReplayStrategy,

    /// Whether returns are clipped to their attainable range.
    #[arg(long, default_value_t = 1)]
    clip_return: u8,

    /// Demonstrations enabling the behavior cloning loss.
    #[arg(long)]
    demo_file: Option<PathBuf>,

    /// A checkpoint to start from.
    #[arg(long)]
    load_path: Option<PathBuf>,

    /// Where checkpoints are written, none are without it.
    #[arg(long)]
    save_path: Option<PathBuf>,

    #[arg(long, default_value = "./logs")]
    log_dir: PathBuf,

    /// Workers to run inside this process.
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// This process' rank in a multi-process pool.
    #[arg(long, env = "HER_RANK")]
    rank: Option<usize>,

    /// The amount of processes in the pool.
    #[arg(long, env = "HER_WORLD_SIZE")]
    world_size: Option<usize>,

    /// The address rank 0 listens on.
    #[arg(long, env = "HER_COORDINATOR", default_value = "127.0.0.1:29500")]
    coordinator: SocketAddr,
}

impl Cli {
    fn learn_args(&self) -> LearnArgs {
        LearnArgs {
            env: self.env.clone(),
            eval_env: self.eval_env.clone(),
            total_timesteps: self.total_timesteps,
            seed: Some(self.seed),
            policy_save_interval: self.policy_save_interval,
            overrides: Overrides {
                replay_strategy: Some(self.replay_strategy),
                clip_return: Some(self.clip_return != 0),
                ..Default::default()
            },
            demo_file: self.demo_file.clone(),
            load_path: self.load_path.clone(),
            save_path: self.save_path.clone(),
            log_dir: Some(self.log_dir.clone()),
        }
    }
}

async fn train<C: Collective>(collective: C, args: LearnArgs) -> anyhow::Result<Trained<TabularPolicy>> {
    let rank = collective.rank();
    trainer::learn(&LineReachTask, collective, args)
        .await
        .with_context(|| format!("training failed on rank {rank}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let args = cli.learn_args();

    let trained = match (cli.rank, cli.world_size) {
        (Some(rank), Some(world_size)) => {
            let member = comms::rendezvous(cli.coordinator, rank, world_size)
                .await
                .with_context(|| format!("could not join the pool at {}", cli.coordinator))?;
            train(member, args).await?
        }
        (None, None) if cli.workers > 1 => {
            let members = comms::local_group(cli.workers)?;
            let handles: Vec<_> = members
                .into_iter()
                .map(|member| tokio::spawn(train(member, args.clone())))
                .collect();

            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                results.push(handle.await?);
            }

            let mut results = results.into_iter();
            let Some(coordinator) = results.next() else {
                bail!("no worker was started");
            };
            for result in results {
                result?;
            }
            coordinator?
        }
        (None, None) => train(Solo::new(), args).await?,
        _ => bail!("--rank and --world-size must be given together"),
    };

    let summary = trained.summary;
    info!(
        "trained for {} epochs, best success rate {}",
        summary.epochs_run, summary.best_success_rate
    );

    Ok(())
}
