use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_nn::{
    loss,
    optim::{AdamW, ParamsAdamW},
    Optimizer,
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{
    data::FeatureTable,
    model::{AutoEncoder, OutputActivation},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub early_stopping_patience: usize,
    pub validation_fraction: f32,
    pub checkpoint_dir: String,
    pub split_seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 32,
            learning_rate: 1e-3,
            weight_decay: 1e-5,
            early_stopping_patience: 10,
            validation_fraction: 0.1,
            checkpoint_dir: "./checkpoints".to_string(),
            split_seed: 42,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("invalid training data: {rows} rows x {columns} feature columns")]
    InvalidTrainingData { rows: usize, columns: usize },

    #[error(
        "training value {value} at row {row}, column {column} lies outside [0,1]; \
         sigmoid output requires [0,1]-scaled inputs"
    )]
    ScaleMismatch {
        row: usize,
        column: usize,
        value: f32,
    },
}

pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Fits `model` to reconstruct `table` (target == input). Monitors a
    /// held-out validation slice, stops early once validation loss stalls for
    /// the patience window, and leaves the model holding the best-observed
    /// weights. The best snapshot is also written to the checkpoint
    /// directory on every improvement.
    pub fn train(&self, model: &mut AutoEncoder, table: &FeatureTable) -> Result<TrainingHistory> {
        if table.is_empty() || table.num_columns() == 0 {
            return Err(TrainError::InvalidTrainingData {
                rows: table.num_rows(),
                columns: table.num_columns(),
            }
            .into());
        }
        if model.architecture().output_activation == OutputActivation::Sigmoid {
            check_input_range(table)?;
        }

        let (train_rows, val_rows) = self.split_rows(table);
        let input_dim = table.num_columns();

        let adamw_config = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: self.config.weight_decay,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(model.trainable_vars(), adamw_config)?;

        let mut best_loss = f64::INFINITY;
        let mut best_weights = None;
        let mut patience_counter = 0;
        let mut history = TrainingHistory::new();
        let batch_size = self.config.batch_size.max(1);

        for epoch in 0..self.config.epochs {
            let train_loss =
                self.train_epoch(model, &train_rows, input_dim, batch_size, &mut optimizer)?;
            let val_loss = self.validate(model, &val_rows, input_dim, batch_size)?;

            history.add_epoch(epoch, train_loss, val_loss);
            log::info!(
                "epoch {}/{}: train loss = {:.6}, val loss = {:.6}",
                epoch + 1,
                self.config.epochs,
                train_loss,
                val_loss
            );

            if val_loss < best_loss {
                best_loss = val_loss;
                patience_counter = 0;
                best_weights = Some(model.snapshot_weights()?);
                self.save_checkpoint(model, epoch)?;
            } else {
                patience_counter += 1;
                if patience_counter >= self.config.early_stopping_patience {
                    log::info!("early stopping at epoch {}", epoch + 1);
                    break;
                }
            }
        }

        // In-memory restore; the on-disk checkpoint exists for later reloads.
        if let Some(weights) = best_weights {
            model.restore_weights(&weights)?;
        }

        Ok(history)
    }

    fn train_epoch(
        &self,
        model: &AutoEncoder,
        rows: &[Vec<f32>],
        input_dim: usize,
        batch_size: usize,
        optimizer: &mut AdamW,
    ) -> Result<f64> {
        let mut epoch_loss = 0.0;
        let mut batch_count = 0;

        for batch in rows.chunks(batch_size) {
            let input = batch_tensor(batch, input_dim, model.device())?;
            let reconstructed = model.forward(&input)?;
            let loss = loss::mse(&reconstructed, &input)?;
            optimizer.backward_step(&loss)?;

            epoch_loss += loss.to_scalar::<f32>()? as f64;
            batch_count += 1;
        }

        Ok(epoch_loss / batch_count as f64)
    }

    fn validate(
        &self,
        model: &AutoEncoder,
        rows: &[Vec<f32>],
        input_dim: usize,
        batch_size: usize,
    ) -> Result<f64> {
        let mut total_loss = 0.0;
        let mut batch_count = 0;

        for batch in rows.chunks(batch_size) {
            let input = batch_tensor(batch, input_dim, model.device())?;
            let reconstructed = model.forward(&input)?;
            let loss = loss::mse(&reconstructed, &input)?;

            total_loss += loss.to_scalar::<f32>()? as f64;
            batch_count += 1;
        }

        Ok(total_loss / batch_count as f64)
    }

    /// Seeded shuffle, then the tail fraction becomes the validation slice.
    /// Tables too small to spare a validation row are validated on the
    /// training rows themselves.
    fn split_rows(&self, table: &FeatureTable) -> (Vec<Vec<f32>>, Vec<Vec<f32>>) {
        let total = table.num_rows();
        let val_size = ((total as f32 * self.config.validation_fraction).round() as usize)
            .min(total.saturating_sub(1));

        let mut indices: Vec<usize> = (0..total).collect();
        let mut rng = StdRng::seed_from_u64(self.config.split_seed);
        indices.shuffle(&mut rng);

        let rows = table.rows();
        let train_size = total - val_size;
        let train_rows: Vec<Vec<f32>> = indices[..train_size]
            .iter()
            .map(|&i| rows[i].clone())
            .collect();
        let val_rows: Vec<Vec<f32>> = if val_size == 0 {
            train_rows.clone()
        } else {
            indices[train_size..]
                .iter()
                .map(|&i| rows[i].clone())
                .collect()
        };

        (train_rows, val_rows)
    }

    fn save_checkpoint(&self, model: &AutoEncoder, epoch: usize) -> Result<()> {
        let dir = Path::new(&self.config.checkpoint_dir);
        model.save(dir)?;
        log::info!("checkpoint written to {} (epoch {})", dir.display(), epoch + 1);
        Ok(())
    }
}

fn check_input_range(table: &FeatureTable) -> Result<(), TrainError> {
    for (row_idx, row) in table.rows().iter().enumerate() {
        for (col_idx, &value) in row.iter().enumerate() {
            if !(0.0..=1.0).contains(&value) {
                return Err(TrainError::ScaleMismatch {
                    row: row_idx,
                    column: col_idx,
                    value,
                });
            }
        }
    }
    Ok(())
}

pub(crate) fn batch_tensor(rows: &[Vec<f32>], input_dim: usize, device: &Device) -> Result<Tensor> {
    let mut flat = Vec::with_capacity(rows.len() * input_dim);
    for row in rows {
        flat.extend_from_slice(row);
    }
    Ok(Tensor::from_vec(flat, (rows.len(), input_dim), device)?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<usize>,
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<f64>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self {
            epochs: Vec::new(),
            train_losses: Vec::new(),
            val_losses: Vec::new(),
        }
    }

    pub fn add_epoch(&mut self, epoch: usize, train_loss: f64, val_loss: f64) {
        self.epochs.push(epoch);
        self.train_losses.push(train_loss);
        self.val_losses.push(val_loss);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }
}

impl Default for TrainingHistory {
    fn default() -> Self {
        Self::new()
    }
}
