use std::{path::Path, sync::Arc};

use parking_lot::Mutex;
use tch::{Device, Kind, Tensor, no_grad};
use tokenizers::Tokenizer;
use tracing::info;

use crate::{
    config::{AppConfig, DevicePreference},
    error::ServiceError,
    model::{GenerationBackend, GenerationParams, ModelMetadata},
};

/// TorchScript-backed generation: a traced causal LM plus its tokenizer,
/// pinned to one device for the life of the process.
pub struct TorchBackend {
    name: String,
    device: Device,
    kind: Kind,
    eos_token_id: Option<i64>,
    tokenizer: Arc<Tokenizer>,
    module: Mutex<tch::CModule>,
}

impl TorchBackend {
    pub fn load(config: &AppConfig) -> Result<Self, ServiceError> {
        let tokenizer = Arc::new(
            Tokenizer::from_file(config.tokenizer_path.as_path())
                .map_err(|e| ServiceError::GenerationFailed(format!("tokenizer load: {e}")))?,
        );
        info!(path = %config.tokenizer_path.display(), "tokenizer loaded");

        let (device, kind) = resolve_device(config.device);
        let module = load_module(&config.model_path, device, kind)?;
        info!(
            path = %config.model_path.display(),
            ?device,
            ?kind,
            "model artifact loaded"
        );

        let eos_token_id = config.eos_token_id.or_else(|| {
            ["</s>", "<|endoftext|>", "<|end_of_text|>"]
                .iter()
                .find_map(|tok| tokenizer.token_to_id(tok))
                .map(i64::from)
        });

        Ok(Self {
            name: config.model_id.clone(),
            device,
            kind,
            eos_token_id,
            tokenizer,
            module: Mutex::new(module),
        })
    }
}

impl GenerationBackend for TorchBackend {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>, ServiceError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ServiceError::GenerationFailed(format!("tokenizer: {e}")))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn generate(
        &self,
        input_ids: &[u32],
        params: &GenerationParams,
    ) -> Result<Vec<u32>, ServiceError> {
        let mut ids: Vec<i64> = input_ids.iter().map(|&id| i64::from(id)).collect();
        if ids.is_empty() {
            ids.push(0);
        }

        no_grad(|| {
            let module = self.module.lock();

            for _ in 0..params.max_new_tokens {
                let input_tensor = Tensor::from_slice(&ids)
                    .reshape([1, ids.len() as i64])
                    .to(self.device);

                let output = module
                    .forward_is(&[tch::IValue::Tensor(input_tensor)])
                    .map_err(|e| ServiceError::GenerationFailed(e.to_string()))?;

                // Traced models return either logits or (logits, past).
                let logits = match output {
                    tch::IValue::Tensor(t) => t,
                    tch::IValue::Tuple(ref tuple) if !tuple.is_empty() => match &tuple[0] {
                        tch::IValue::Tensor(t) => t.shallow_clone(),
                        _ => {
                            return Err(ServiceError::GenerationFailed(
                                "expected tensor as first tuple element".into(),
                            ));
                        }
                    },
                    _ => {
                        return Err(ServiceError::GenerationFailed(
                            "unexpected model output format".into(),
                        ));
                    }
                };

                // logits shape [1, seq_len, vocab]; sample from the last step
                let last_logits = logits.select(1, -1).squeeze().to_kind(Kind::Float);
                let next_token_id = sample_token(&last_logits, &ids, params);

                ids.push(next_token_id);

                if Some(next_token_id) == self.eos_token_id {
                    break;
                }
            }

            Ok::<(), ServiceError>(())
        })?;

        // Full sequence, prompt included; the handler strips the echo.
        Ok(ids.into_iter().map(|id| id as u32).collect())
    }

    fn detokenize(&self, token_ids: &[u32]) -> Result<String, ServiceError> {
        self.tokenizer
            .decode(token_ids, true)
            .map_err(|e| ServiceError::GenerationFailed(format!("tokenizer: {e}")))
    }

    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            name: self.name.clone(),
            device: format!("{:?}", self.device).to_lowercase(),
            dtype: match self.kind {
                Kind::Half => "float16".to_string(),
                _ => "float32".to_string(),
            },
        }
    }
}

/// Temperature + nucleus sampling with repetition penalty. Sampling is
/// always on; the argmax path is deliberately absent.
fn sample_token(last_logits: &Tensor, seen_ids: &[i64], params: &GenerationParams) -> i64 {
    let mut logits = last_logits.shallow_clone();

    if params.repetition_penalty != 1.0 {
        // index tensors must live where the logits live
        let seen = Tensor::from_slice(seen_ids).to(last_logits.device());
        let gathered = logits.index_select(0, &seen);
        let penalized = (&gathered * params.repetition_penalty)
            .where_self(&gathered.lt(0.0), &(&gathered / params.repetition_penalty));
        logits = logits.index_copy(0, &seen, &penalized);
    }

    let probs = (logits / params.temperature).softmax(-1, Kind::Float);

    // Nucleus filter: keep the smallest prefix of the descending
    // distribution whose mass reaches top_p, always at least one token.
    let (sorted_probs, sorted_idx) = probs.sort(-1, true);
    let cumulative = sorted_probs.cumsum(-1, Kind::Float);
    let keep = (&cumulative - &sorted_probs).lt(params.top_p);
    let filtered = sorted_probs.where_self(&keep, &Tensor::zeros_like(&sorted_probs));

    let pick = filtered.multinomial(1, true).int64_value(&[0]);
    sorted_idx.int64_value(&[pick])
}

fn resolve_device(preference: DevicePreference) -> (Device, Kind) {
    let device = match preference {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda(idx) if tch::Cuda::is_available() => Device::Cuda(idx),
        DevicePreference::Auto if tch::Cuda::is_available() => Device::Cuda(0),
        // requested accelerator is absent, degrade to the CPU
        DevicePreference::Cuda(_) | DevicePreference::Auto => Device::Cpu,
    };
    // half precision on the accelerator, full precision on the CPU
    let kind = match device {
        Device::Cuda(_) => Kind::Half,
        _ => Kind::Float,
    };
    (device, kind)
}

fn load_module(path: &Path, device: Device, kind: Kind) -> Result<tch::CModule, ServiceError> {
    if !path.exists() {
        return Err(ServiceError::GenerationFailed(format!(
            "model artifact missing: {}",
            path.display()
        )));
    }
    let mut module = tch::CModule::load_on_device(path, device)
        .map_err(|e| ServiceError::GenerationFailed(e.to_string()))?;
    module.set_eval();
    module.to(device, kind, false);
    Ok(module)
}
