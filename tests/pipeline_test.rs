use aeguard::{
    calibration::{binary_ground_truth, calibrate, resolve_normal_class},
    data::{DataConfig, Dataset, FeatureTable, LabelEncoder},
    evaluation::evaluate,
    model::{Architecture, AutoEncoder, ModelConfig},
    scoring::reconstruction_errors,
    training::{Trainer, TrainingConfig},
    AeGuard, Config,
};
use std::io::Write;
use std::path::Path;

fn feature_table(rows: Vec<Vec<f32>>) -> FeatureTable {
    let width = rows.first().map(Vec::len).unwrap_or(0);
    let columns = (0..width).map(|i| format!("f{}", i)).collect();
    FeatureTable::new(columns, rows)
}

fn quick_training_config(checkpoint_dir: &Path, epochs: usize) -> TrainingConfig {
    TrainingConfig {
        epochs,
        batch_size: 32,
        learning_rate: 0.05,
        early_stopping_patience: 25,
        checkpoint_dir: checkpoint_dir.to_string_lossy().into_owned(),
        ..TrainingConfig::default()
    }
}

#[test]
fn builder_respects_size_floors_for_all_dims() {
    let config = ModelConfig::default();
    for input_dim in 1..=128 {
        let arch = Architecture::derive(input_dim, &config);
        assert!(arch.encoding_size >= 2);
        assert!(arch.intermediate_size >= arch.encoding_size);

        let model = AutoEncoder::new(input_dim, &config);
        assert!(model.is_ok(), "input_dim {}", input_dim);
    }
}

#[test]
fn training_on_zeros_reconstructs_zeros() {
    let tmp = tempfile::tempdir().unwrap();
    let train = feature_table(vec![vec![0.0; 8]; 100]);

    let mut model = AutoEncoder::new(8, &ModelConfig::default()).unwrap();
    let trainer = Trainer::new(quick_training_config(tmp.path(), 300));
    let history = trainer.train(&mut model, &train).unwrap();
    assert!(!history.is_empty());

    let test = feature_table(vec![vec![0.0; 8]]);
    let errors = reconstruction_errors(&model, &test).unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0] < 0.01, "error after convergence: {}", errors[0]);
}

#[test]
fn checkpoint_round_trip_reproduces_scores() {
    let tmp = tempfile::tempdir().unwrap();
    let train = feature_table(vec![
        vec![0.1, 0.2, 0.3, 0.4],
        vec![0.2, 0.3, 0.4, 0.5],
        vec![0.3, 0.4, 0.5, 0.6],
        vec![0.4, 0.5, 0.6, 0.7],
        vec![0.5, 0.6, 0.7, 0.8],
    ]);

    let mut model = AutoEncoder::new(4, &ModelConfig::default()).unwrap();
    let trainer = Trainer::new(quick_training_config(tmp.path(), 5));
    trainer.train(&mut model, &train).unwrap();

    let checkpoint = tmp.path().join("final");
    model.save(&checkpoint).unwrap();
    let reloaded = AutoEncoder::load(&checkpoint).unwrap();

    let test = feature_table(vec![vec![0.15, 0.25, 0.35, 0.45], vec![0.9, 0.1, 0.9, 0.1]]);
    let before = reconstruction_errors(&model, &test).unwrap();
    let after = reconstruction_errors(&reloaded, &test).unwrap();

    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(after.iter()) {
        assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
    }
}

fn write_artifacts(dir: &Path) {
    let mut train = String::from("f0,f1,f2,f3\n");
    for i in 0..40 {
        let base = (i % 10) as f32 / 20.0;
        train.push_str(&format!(
            "{},{},{},{}\n",
            base,
            base + 0.05,
            0.5 - base / 2.0,
            base / 3.0
        ));
    }

    // First six rows look like training data, the last four do not.
    let mut test = String::from("f0,f1,f2,f3\n");
    let mut labels = String::from("y\n");
    for i in 0..6 {
        let base = (i % 10) as f32 / 20.0;
        test.push_str(&format!(
            "{},{},{},{}\n",
            base,
            base + 0.05,
            0.5 - base / 2.0,
            base / 3.0
        ));
        labels.push_str("0\n");
    }
    for _ in 0..4 {
        test.push_str("1.0,0.0,1.0,1.0\n");
        labels.push_str("1\n");
    }

    std::fs::File::create(dir.join("train_normal.csv"))
        .unwrap()
        .write_all(train.as_bytes())
        .unwrap();
    std::fs::File::create(dir.join("test_features.csv"))
        .unwrap()
        .write_all(test.as_bytes())
        .unwrap();
    std::fs::File::create(dir.join("test_labels.csv"))
        .unwrap()
        .write_all(labels.as_bytes())
        .unwrap();
    std::fs::File::create(dir.join("label_encoder.json"))
        .unwrap()
        .write_all(br#"["Normal","attack_dos"]"#)
        .unwrap();
}

#[test]
fn full_pipeline_produces_a_coherent_report() {
    let data_dir = tempfile::tempdir().unwrap();
    let checkpoints = tempfile::tempdir().unwrap();
    write_artifacts(data_dir.path());

    let config = Config {
        training: quick_training_config(checkpoints.path(), 60),
        ..Config::default()
    };

    let dataset = Dataset::load(data_dir.path(), &config.data)
        .unwrap()
        .expect("all artifacts present");
    assert_eq!(dataset.input_dim(), 4);

    let mut guard = AeGuard::new(dataset.input_dim(), config).unwrap();
    guard.train(&dataset.train).unwrap();

    let errors = guard.score(&dataset.test).unwrap();
    assert_eq!(errors.len(), dataset.test.num_rows());
    assert!(errors.iter().all(|&e| e >= 0.0));

    let normal_code = resolve_normal_class(&dataset.encoder, None).unwrap();
    assert_eq!(normal_code, 0);
    let truth = binary_ground_truth(&dataset.labels, normal_code);
    assert_eq!(truth, vec![0, 0, 0, 0, 0, 0, 1, 1, 1, 1]);

    let threshold = calibrate(&errors, &truth).unwrap();
    assert!(threshold.is_finite());

    let report = evaluate(&errors, threshold, &truth);
    let total: usize = report.confusion.iter().flatten().sum();
    assert_eq!(total, 10);
    assert_eq!(report.anomaly.support, 4);
    assert_eq!(report.normal.support, 6);
}

#[test]
fn missing_artifact_halts_without_partial_data() {
    let data_dir = tempfile::tempdir().unwrap();
    write_artifacts(data_dir.path());
    std::fs::remove_file(data_dir.path().join("label_encoder.json")).unwrap();

    let result = Dataset::load(data_dir.path(), &DataConfig::default()).unwrap();
    assert!(result.is_none());
}

#[test]
fn calibrator_works_without_a_normal_class_name() {
    let encoder = LabelEncoder {
        classes: vec!["attack_dos".to_string(), "attack_probe".to_string()],
    };
    let normal_code = resolve_normal_class(&encoder, None).unwrap();
    assert_eq!(normal_code, 0);

    let truth = binary_ground_truth(&[0, 1, 1, 0], normal_code);
    let threshold = calibrate(&[0.1, 0.8, 0.9, 0.2], &truth).unwrap();
    assert!(threshold.is_finite());
}
