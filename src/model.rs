use anyhow::Result;
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{Module, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    /// Bounded to [0,1]; requires inputs scaled into [0,1] upstream.
    Sigmoid,
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub encoding_ratio: f64,
    pub intermediate_ratio: f64,
    pub output_activation: OutputActivation,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            encoding_ratio: 0.25,
            intermediate_ratio: 0.5,
            output_activation: OutputActivation::Sigmoid,
            seed: 42,
        }
    }
}

/// Layer widths derived from the input dimensionality. Persisted alongside
/// the weights so a checkpoint can be rebuilt without the original config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Architecture {
    pub input_dim: usize,
    pub intermediate_size: usize,
    pub encoding_size: usize,
    pub output_activation: OutputActivation,
}

impl Architecture {
    pub fn derive(input_dim: usize, config: &ModelConfig) -> Self {
        let encoding_size = ((input_dim as f64 * config.encoding_ratio).round() as usize).max(2);
        let intermediate_size =
            ((input_dim as f64 * config.intermediate_ratio).round() as usize).max(encoding_size);
        Self {
            input_dim,
            intermediate_size,
            encoding_size,
            output_activation: config.output_activation,
        }
    }
}

pub struct AutoEncoder {
    encoder: Encoder,
    decoder: Decoder,
    architecture: Architecture,
    varmap: VarMap,
    device: Device,
}

struct Encoder {
    fc1: candle_nn::Linear,
    fc2: candle_nn::Linear,
}

struct Decoder {
    fc1: candle_nn::Linear,
    fc2: candle_nn::Linear,
}

impl AutoEncoder {
    pub fn new(input_dim: usize, config: &ModelConfig) -> Result<Self> {
        let architecture = Architecture::derive(input_dim, config);
        let device = Device::cuda_if_available(0)?;
        device.set_seed(config.seed)?;
        Self::from_architecture(architecture, device)
    }

    fn from_architecture(architecture: Architecture, device: Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let encoder = Encoder {
            fc1: candle_nn::linear(
                architecture.input_dim,
                architecture.intermediate_size,
                vb.pp("enc_fc1"),
            )?,
            fc2: candle_nn::linear(
                architecture.intermediate_size,
                architecture.encoding_size,
                vb.pp("enc_fc2"),
            )?,
        };

        let decoder = Decoder {
            fc1: candle_nn::linear(
                architecture.encoding_size,
                architecture.intermediate_size,
                vb.pp("dec_fc1"),
            )?,
            fc2: candle_nn::linear(
                architecture.intermediate_size,
                architecture.input_dim,
                vb.pp("dec_fc2"),
            )?,
        };

        Ok(Self {
            encoder,
            decoder,
            architecture,
            varmap,
            device,
        })
    }

    pub fn encode(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.encoder.fc1.forward(x)?;
        let x = x.relu()?;
        let x = self.encoder.fc2.forward(&x)?;
        Ok(x.relu()?)
    }

    pub fn decode(&self, z: &Tensor) -> Result<Tensor> {
        let x = self.decoder.fc1.forward(z)?;
        let x = x.relu()?;
        let x = self.decoder.fc2.forward(&x)?;
        match self.architecture.output_activation {
            OutputActivation::Sigmoid => Ok(candle_nn::ops::sigmoid(&x)?),
            OutputActivation::Linear => Ok(x),
        }
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let z = self.encode(x)?;
        self.decode(&z)
    }

    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn trainable_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Copies the current weights so they can be restored after further
    /// training mutates them.
    pub fn snapshot_weights(&self) -> Result<HashMap<String, Tensor>> {
        let data = self.varmap.data().lock().unwrap();
        let mut snapshot = HashMap::with_capacity(data.len());
        for (name, var) in data.iter() {
            snapshot.insert(name.clone(), var.as_tensor().copy()?);
        }
        Ok(snapshot)
    }

    pub fn restore_weights(&self, snapshot: &HashMap<String, Tensor>) -> Result<()> {
        let data = self.varmap.data().lock().unwrap();
        for (name, var) in data.iter() {
            if let Some(tensor) = snapshot.get(name) {
                var.set(tensor)?;
            }
        }
        Ok(())
    }

    /// Writes weights and architecture to `dir` (`model.safetensors` +
    /// `model.json`).
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let architecture_json = serde_json::to_string_pretty(&self.architecture)?;
        std::fs::write(dir.join("model.json"), architecture_json)?;
        self.varmap.save(dir.join("model.safetensors"))?;
        Ok(())
    }

    /// Rebuilds a model from a checkpoint directory written by [`save`].
    ///
    /// [`save`]: AutoEncoder::save
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let architecture_json = std::fs::read_to_string(dir.join("model.json"))?;
        let architecture: Architecture = serde_json::from_str(&architecture_json)?;
        let device = Device::cuda_if_available(0)?;
        let mut model = Self::from_architecture(architecture, device)?;
        model.varmap.load(dir.join("model.safetensors"))?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bottleneck_never_narrower_than_two() {
        let config = ModelConfig::default();
        for input_dim in 1..=64 {
            let arch = Architecture::derive(input_dim, &config);
            assert!(arch.encoding_size >= 2, "input_dim {}", input_dim);
            assert!(
                arch.intermediate_size >= arch.encoding_size,
                "input_dim {}",
                input_dim
            );
        }
    }

    #[test]
    fn sizes_follow_ratios_for_wide_inputs() {
        let arch = Architecture::derive(40, &ModelConfig::default());
        assert_eq!(arch.encoding_size, 10);
        assert_eq!(arch.intermediate_size, 20);
    }

    #[test]
    fn forward_preserves_shape() {
        let model = AutoEncoder::new(8, &ModelConfig::default()).unwrap();
        let x = Tensor::zeros((3, 8), DType::F32, model.device()).unwrap();
        let y = model.forward(&x).unwrap();
        assert_eq!(y.dims(), &[3, 8]);
    }
}
