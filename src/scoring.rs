use anyhow::Result;
use candle_core::D;

use crate::{data::FeatureTable, model::AutoEncoder, training::batch_tensor};

const SCORING_BATCH: usize = 256;

/// Per-record reconstruction error: mean of squared per-feature differences
/// between input and reconstruction. Output is aligned positionally with the
/// table and deterministic for a frozen model.
pub fn reconstruction_errors(model: &AutoEncoder, table: &FeatureTable) -> Result<Vec<f32>> {
    let input_dim = table.num_columns();
    let mut errors = Vec::with_capacity(table.num_rows());

    for batch in table.rows().chunks(SCORING_BATCH) {
        let input = batch_tensor(batch, input_dim, model.device())?;
        let reconstructed = model.forward(&input)?;

        let diff = (&input - &reconstructed)?;
        let per_record = diff.sqr()?.mean(D::Minus1)?;
        errors.extend(per_record.to_vec1::<f32>()?);
    }

    Ok(errors)
}
