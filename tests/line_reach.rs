use std::fs;

use comms::{Collective, Solo};
use her_orchestra::sim::LineReachTask;
use trainer::{LearnArgs, Overrides, ReplayStrategy, TrainErr, learn};

fn args(dir: &std::path::Path) -> LearnArgs {
    LearnArgs {
        env: "LineReach-v0".into(),
        // 3 epochs of 10 cycles, 2 agents and 10 steps.
        total_timesteps: 600,
        seed: Some(0),
        policy_save_interval: 2,
        save_path: Some(dir.join("ckpt")),
        log_dir: Some(dir.join("logs")),
        ..Default::default()
    }
}

#[tokio::test]
async fn single_worker_run_leaves_its_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let trained = learn(&LineReachTask, Solo::new(), args(dir.path())).await.unwrap();

    let summary = trained.summary;
    assert_eq!(summary.epochs_run, 3);
    assert!((0. ..=1.).contains(&summary.best_success_rate));

    let ckpt = dir.path().join("ckpt");
    for name in ["policy_best.ckpt", "policy_latest.ckpt", "policy_0.ckpt", "policy_2.ckpt"] {
        assert!(ckpt.join(name).exists(), "missing {name}");
    }
    assert!(!ckpt.join("policy_1.ckpt").exists());

    let logs = dir.path().join("logs");
    let params: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(logs.join("params.json")).unwrap()).unwrap();
    assert_eq!(params["n_cycles"], 10);
    assert_eq!(params["T"], 10);

    let progress = fs::read_to_string(logs.join("progress.csv")).unwrap();
    let header = progress.lines().next().unwrap();
    assert!(header.starts_with("epoch,test/success_rate,test/mean_Q,test/episode"));
    assert_eq!(progress.lines().count(), 4);
}

#[tokio::test]
async fn same_seed_same_run() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    let a = learn(&LineReachTask, Solo::new(), args(first.path())).await.unwrap();
    let b = learn(&LineReachTask, Solo::new(), args(second.path())).await.unwrap();

    let rates = |t: &trainer::Trained<_>| -> Vec<f64> {
        t.summary.reports.iter().map(|r| r.success_rate).collect()
    };
    assert_eq!(rates(&a), rates(&b));
}

#[tokio::test]
async fn restarts_from_a_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    learn(&LineReachTask, Solo::new(), args(dir.path())).await.unwrap();

    let resumed = tempfile::tempdir().unwrap();
    let args = LearnArgs {
        load_path: Some(dir.path().join("ckpt").join("policy_best.ckpt")),
        overrides: Overrides {
            replay_strategy: Some(ReplayStrategy::None),
            ..Default::default()
        },
        ..args(resumed.path())
    };

    let trained = learn(&LineReachTask, Solo::new(), args).await.unwrap();
    assert_eq!(trained.summary.epochs_run, 3);
}

#[tokio::test]
async fn unknown_environment_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let args = LearnArgs {
        env: "LineReach-v7".into(),
        ..args(dir.path())
    };

    let err = learn(&LineReachTask, Solo::new(), args).await.unwrap_err();
    assert!(matches!(err, TrainErr::Config(_)));
}

#[tokio::test]
async fn workers_agree_on_every_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let members = comms::local_group(2).unwrap();

    let handles: Vec<_> = members
        .into_iter()
        .map(|member| {
            let args = args(dir.path());
            tokio::spawn(async move {
                let rank = member.rank();
                (rank, learn(&LineReachTask, member, args).await)
            })
        })
        .collect();

    let mut summaries = Vec::new();
    for handle in handles {
        let (rank, result) = handle.await.unwrap();
        summaries.push((rank, result.unwrap().summary));
    }
    summaries.sort_by_key(|(rank, _)| *rank);

    let (_, coordinator) = &summaries[0];
    let (_, follower) = &summaries[1];
    for (a, b) in coordinator.reports.iter().zip(&follower.reports) {
        assert_eq!(a.success_rate, b.success_rate);
        assert_eq!(a.records, b.records);
    }
    assert!(follower.reports.iter().all(|r| r.written.is_empty()));
    assert!(coordinator.reports[0].written.len() >= 2);
}
