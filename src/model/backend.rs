use crate::error::ServiceError;
use crate::model::{GenerationParams, ModelMetadata};

/// The loaded model + tokenizer pair, consumed as an opaque capability.
/// Calls are blocking and run on the blocking pool; implementations must
/// therefore be `Send + Sync` and internally guard any mutable state.
pub trait GenerationBackend: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>, ServiceError>;

    /// Generates up to `max_new_tokens` tokens. Implementations may return
    /// either the continuation alone or the prompt and continuation
    /// concatenated; the caller strips the echoed prompt.
    fn generate(
        &self,
        input_ids: &[u32],
        params: &GenerationParams,
    ) -> Result<Vec<u32>, ServiceError>;

    /// Decodes token ids to text, skipping control/special tokens.
    fn detokenize(&self, token_ids: &[u32]) -> Result<String, ServiceError>;

    fn metadata(&self) -> ModelMetadata;
}
