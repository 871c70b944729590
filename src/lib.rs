pub mod calibration;
pub mod data;
pub mod evaluation;
pub mod model;
pub mod scoring;
pub mod training;

use anyhow::Result;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub model: model::ModelConfig,
    pub training: training::TrainingConfig,
    pub data: data::DataConfig,
    pub calibration: calibration::CalibrationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: model::ModelConfig::default(),
            training: training::TrainingConfig::default(),
            data: data::DataConfig::default(),
            calibration: calibration::CalibrationConfig::default(),
        }
    }
}

/// Pipeline facade: owns the autoencoder and threads one immutable config
/// through every stage.
pub struct AeGuard {
    model: model::AutoEncoder,
    config: Config,
}

impl AeGuard {
    pub fn new(input_dim: usize, config: Config) -> Result<Self> {
        let model = model::AutoEncoder::new(input_dim, &config.model)?;
        Ok(Self { model, config })
    }

    /// Rebuilds the pipeline around a previously trained checkpoint.
    pub fn from_checkpoint<P: AsRef<std::path::Path>>(dir: P, config: Config) -> Result<Self> {
        let model = model::AutoEncoder::load(dir)?;
        Ok(Self { model, config })
    }

    pub fn train(&mut self, table: &data::FeatureTable) -> Result<training::TrainingHistory> {
        let trainer = training::Trainer::new(self.config.training.clone());
        trainer.train(&mut self.model, table)
    }

    pub fn score(&self, table: &data::FeatureTable) -> Result<Vec<f32>> {
        scoring::reconstruction_errors(&self.model, table)
    }

    pub fn model(&self) -> &model::AutoEncoder {
        &self.model
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
