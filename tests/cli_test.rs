use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

#[test]
fn no_arguments_prints_usage() {
    Command::cargo_bin("aeguard")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn missing_artifacts_fail_gracefully() {
    let empty = tempfile::tempdir().unwrap();

    Command::cargo_bin("aeguard")
        .unwrap()
        .args(["train", "--data-dir"])
        .arg(empty.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("required artifacts not found"));
}

#[test]
fn header_only_test_table_fails_with_a_message() {
    let data_dir = tempfile::tempdir().unwrap();
    let checkpoints = tempfile::tempdir().unwrap();

    std::fs::write(
        data_dir.path().join("train_normal.csv"),
        "a,b\n0.1,0.2\n0.3,0.4\n0.5,0.6\n",
    )
    .unwrap();
    std::fs::write(data_dir.path().join("test_features.csv"), "a,b\n").unwrap();
    std::fs::write(data_dir.path().join("test_labels.csv"), "y\n").unwrap();
    std::fs::write(
        data_dir.path().join("label_encoder.json"),
        r#"["Normal","attack"]"#,
    )
    .unwrap();

    let mut config = aeguard::Config::default();
    config.training.epochs = 2;
    config.training.checkpoint_dir = checkpoints.path().to_string_lossy().into_owned();
    let config_path = data_dir.path().join("config.json");
    std::fs::write(&config_path, serde_json::to_string(&config).unwrap()).unwrap();

    Command::cargo_bin("aeguard")
        .unwrap()
        .args(["run", "--data-dir"])
        .arg(data_dir.path())
        .args(["--config"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("empty error vector"));
}

#[test]
fn run_subcommand_writes_threshold_and_report() {
    let data_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let checkpoints = tempfile::tempdir().unwrap();

    let mut train = String::from("a,b\n");
    for i in 0..20 {
        let v = i as f32 / 40.0;
        train.push_str(&format!("{},{}\n", v, 0.5 - v / 2.0));
    }
    std::fs::write(data_dir.path().join("train_normal.csv"), train).unwrap();
    std::fs::write(
        data_dir.path().join("test_features.csv"),
        "a,b\n0.1,0.45\n0.2,0.4\n1.0,1.0\n",
    )
    .unwrap();
    std::fs::write(data_dir.path().join("test_labels.csv"), "y\n0\n0\n1\n").unwrap();
    std::fs::write(
        data_dir.path().join("label_encoder.json"),
        r#"["Normal","attack"]"#,
    )
    .unwrap();

    let mut config = aeguard::Config::default();
    config.training.epochs = 5;
    config.training.checkpoint_dir = checkpoints.path().to_string_lossy().into_owned();
    let config_path = data_dir.path().join("config.json");
    let mut f = std::fs::File::create(&config_path).unwrap();
    f.write_all(serde_json::to_string(&config).unwrap().as_bytes())
        .unwrap();

    Command::cargo_bin("aeguard")
        .unwrap()
        .args(["run", "--data-dir"])
        .arg(data_dir.path())
        .args(["--config"])
        .arg(&config_path)
        .args(["--output"])
        .arg(out_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluation Report"));

    assert!(out_dir.path().join("threshold.json").exists());
    assert!(out_dir.path().join("report.json").exists());
    assert!(out_dir.path().join("model.json").exists());
    assert!(out_dir.path().join("model.safetensors").exists());
    assert!(out_dir.path().join("history.json").exists());
}
