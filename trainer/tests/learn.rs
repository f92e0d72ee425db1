mod common;

use std::fs;

use comms::Solo;
use common::{FakeComponents, journal};
use trainer::{LearnArgs, Overrides, TrainErr, learn};

fn args(log_dir: &std::path::Path) -> LearnArgs {
    LearnArgs {
        env: "Fake-v0".into(),
        // 3 epochs of 2 cycles, 2 sub-environments and 5 steps.
        total_timesteps: 60,
        seed: Some(0),
        log_dir: Some(log_dir.to_path_buf()),
        ..Default::default()
    }
}

#[tokio::test]
async fn runs_the_budgeted_epochs() {
    let dir = tempfile::tempdir().unwrap();
    let components = FakeComponents {
        journal: journal(),
        rate: 0.5,
    };

    let trained = learn(&components, Solo::new(), args(dir.path())).await.unwrap();

    assert_eq!(trained.summary.epochs_run, 3);
    assert_eq!(trained.summary.best_success_rate, 0.5);
    // 2 cycles of 1 batch per epoch.
    assert_eq!(trained.policy.trains, 6);

    let progress = fs::read_to_string(dir.path().join("progress.csv")).unwrap();
    assert_eq!(progress.lines().count(), 4);
}

#[tokio::test]
async fn writes_the_resolved_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let components = FakeComponents {
        journal: journal(),
        rate: 0.0,
    };
    let args = LearnArgs {
        overrides: Overrides {
            n_batches: Some(2),
            ..Default::default()
        },
        ..args(dir.path())
    };

    learn(&components, Solo::new(), args).await.unwrap();

    let text = fs::read_to_string(dir.path().join("params.json")).unwrap();
    let params: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(params["env_name"], "Fake-v0");
    assert_eq!(params["n_cycles"], 2);
    assert_eq!(params["n_batches"], 2);
    assert_eq!(params["rollout_batch_size"], 2);
    assert_eq!(params["T"], 5);
    assert_eq!(params["bc_loss"], false);
}

#[tokio::test]
async fn unknown_environment_fails_before_training() {
    let dir = tempfile::tempdir().unwrap();
    let journal = journal();
    let components = FakeComponents {
        journal: journal.clone(),
        rate: 0.0,
    };
    let args = LearnArgs {
        env: "Missing-v3".into(),
        ..args(dir.path())
    };

    let err = learn(&components, Solo::new(), args).await.unwrap_err();

    assert!(matches!(err, TrainErr::Config(_)));
    assert!(journal.lock().unwrap().is_empty());
    assert!(!dir.path().join("params.json").exists());
}

#[tokio::test]
async fn tiny_budget_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let components = FakeComponents {
        journal: journal(),
        rate: 0.0,
    };
    let args = LearnArgs {
        total_timesteps: 19,
        ..args(dir.path())
    };

    let err = learn(&components, Solo::new(), args).await.unwrap_err();
    assert!(matches!(err, TrainErr::Config(_)));
}

#[tokio::test]
async fn demonstrations_enable_behavior_cloning() {
    let dir = tempfile::tempdir().unwrap();
    let demo = dir.path().join("demo.json");
    let components = FakeComponents {
        journal: journal(),
        rate: 0.0,
    };
    let args = LearnArgs {
        demo_file: Some(demo.clone()),
        ..args(dir.path())
    };

    let trained = learn(&components, Solo::new(), args).await.unwrap();

    assert!(trained.policy.bc_loss);
    assert_eq!(trained.policy.demo, Some(demo));
}

#[tokio::test]
async fn restores_and_checkpoints_the_policy() {
    let dir = tempfile::tempdir().unwrap();
    let ckpt = dir.path().join("ckpt");
    let restore = dir.path().join("restore.ckpt");
    fs::write(&restore, "100").unwrap();

    let components = FakeComponents {
        journal: journal(),
        rate: 1.0,
    };
    let args = LearnArgs {
        load_path: Some(restore),
        save_path: Some(ckpt.clone()),
        policy_save_interval: 2,
        ..args(dir.path())
    };

    let trained = learn(&components, Solo::new(), args).await.unwrap();

    assert_eq!(trained.policy.trains, 106);
    assert_eq!(fs::read_to_string(ckpt.join("policy_best.ckpt")).unwrap(), "106");
    assert_eq!(fs::read_to_string(ckpt.join("policy_0.ckpt")).unwrap(), "102");
    assert_eq!(fs::read_to_string(ckpt.join("policy_2.ckpt")).unwrap(), "106");
    assert!(!ckpt.join("policy_1.ckpt").exists());
}
