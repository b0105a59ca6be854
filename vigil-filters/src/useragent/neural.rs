//! burn inference runtime (`burn` feature)
//!
//! Classifier: token embedding, mean pooling over the sequence, one hidden
//! layer, sigmoid output. Weights are read from a compact record.

use super::inference::{InferenceRuntime, InferenceSession};
use crate::error::EngineError;
use burn::module::Module;
use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::{activation, backend::Backend, Int, Tensor, TensorData};
use burn_ndarray::{NdArray, NdArrayDevice};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

type InferenceBackend = NdArray<f32>;

pub const EMBEDDING_DIM: usize = 32;
pub const HIDDEN_DIM: usize = 64;

#[derive(Module, Debug)]
pub struct UserAgentNet<B: Backend> {
    embedding: Embedding<B>,
    hidden: Linear<B>,
    output: Linear<B>,
}

impl<B: Backend> UserAgentNet<B> {
    pub fn new(vocab_size: usize, device: &B::Device) -> Self {
        Self {
            embedding: EmbeddingConfig::new(vocab_size, EMBEDDING_DIM).init(device),
            hidden: LinearConfig::new(EMBEDDING_DIM, HIDDEN_DIM).init(device),
            output: LinearConfig::new(HIDDEN_DIM, 1).init(device),
        }
    }

    /// ids: [batch, tokens] -> probability [batch, 1]
    pub fn forward(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let embedded = self.embedding.forward(ids); // [batch, tokens, dim]
        let [batch, _, dim] = embedded.dims();
        let pooled = embedded.mean_dim(1).reshape([batch, dim]);
        let hidden = activation::relu(self.hidden.forward(pooled));
        activation::sigmoid(self.output.forward(hidden))
    }
}

#[derive(Debug, Default)]
pub struct BurnRuntime;

impl InferenceRuntime for BurnRuntime {
    fn load(
        &self,
        model_path: &Path,
        vocab_size: usize,
        max_tokens: usize,
    ) -> Result<Box<dyn InferenceSession>, EngineError> {
        debug!(path = %model_path.display(), "Loading model...");
        let device = NdArrayDevice::Cpu;
        let recorder = CompactRecorder::new();
        let record = <CompactRecorder as Recorder<InferenceBackend>>::load(
            &recorder,
            model_path.to_path_buf(),
            &device,
        )
        .map_err(|e| {
            EngineError::new(format!(
                "failed to load model at {}: {:?}",
                model_path.display(),
                e
            ))
        })?;
        let model = UserAgentNet::<InferenceBackend>::new(vocab_size, &device).load_record(record);
        info!(vocab_size, max_tokens, "Model loaded");

        Ok(Box::new(BurnSession {
            model: Mutex::new(Some(model)),
            device,
            vocab_size,
            max_tokens,
        }))
    }
}

struct BurnSession {
    model: Mutex<Option<UserAgentNet<InferenceBackend>>>,
    device: NdArrayDevice,
    vocab_size: usize,
    max_tokens: usize,
}

impl InferenceSession for BurnSession {
    fn run(&self, ids: &[u32]) -> Result<f32, EngineError> {
        if ids.len() != self.max_tokens {
            return Err(EngineError::new(format!(
                "expected {} ids, got {}",
                self.max_tokens,
                ids.len()
            )));
        }
        if let Some(id) = ids.iter().find(|id| **id as usize >= self.vocab_size) {
            return Err(EngineError::new(format!(
                "token id {} outside vocabulary of {}",
                id, self.vocab_size
            )));
        }

        let guard = self
            .model
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let model = guard
            .as_ref()
            .ok_or_else(|| EngineError::new("session closed"))?;

        let values: Vec<i64> = ids.iter().map(|id| i64::from(*id)).collect();
        let input = Tensor::<InferenceBackend, 2, Int>::from_data(
            TensorData::new(values, [1, ids.len()]),
            &self.device,
        );
        let output = model.forward(input).into_data();
        let probabilities = output
            .to_vec::<f32>()
            .map_err(|e| EngineError::new(format!("unreadable model output: {:?}", e)))?;
        probabilities
            .first()
            .copied()
            .ok_or_else(|| EngineError::new("empty model output"))
    }

    fn close(&self) -> Result<(), EngineError> {
        let mut guard = self
            .model
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.take();
        info!("Inference session closed");
        Ok(())
    }
}
