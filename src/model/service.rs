use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task;
use tracing::{error, info};

use crate::{
    config::AppConfig,
    error::ServiceError,
    gate::ExecutionGate,
    model::{GenerationBackend, GenerationRequest, GenerationResponse, ModelMetadata},
};

/// Lifecycle of the one backend instance this process owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

impl ModelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelState::Uninitialized => "uninitialized",
            ModelState::Loading => "loading",
            ModelState::Ready => "ready",
            ModelState::Failed => "failed",
        }
    }
}

/// Owns the single generation backend, publishes its readiness, and runs
/// the request/response contract around it. All access to the backend goes
/// through [`GenerationService::handle`], with the execution gate bounding
/// how many generation calls run at once.
pub struct GenerationService {
    config: Arc<AppConfig>,
    gate: ExecutionGate,
    state: RwLock<ModelState>,
    backend: RwLock<Option<Arc<dyn GenerationBackend>>>,
}

impl GenerationService {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let gate = ExecutionGate::new(config.gate_permits, config.gate_wait_timeout);
        Self {
            config,
            gate,
            state: RwLock::new(ModelState::Uninitialized),
            backend: RwLock::new(None),
        }
    }

    /// Constructs the backend exactly once via `load`. A load failure is
    /// terminal: the state moves to `Failed` and stays there, and the error
    /// is returned so startup can abort instead of serving half-initialized.
    pub fn initialize_with<F>(&self, load: F) -> Result<(), ServiceError>
    where
        F: FnOnce() -> Result<Arc<dyn GenerationBackend>, ServiceError>,
    {
        *self.state.write() = ModelState::Loading;
        match load() {
            Ok(backend) => {
                let metadata = backend.metadata();
                info!(
                    model = %metadata.name,
                    device = %metadata.device,
                    dtype = %metadata.dtype,
                    "model loaded"
                );
                *self.backend.write() = Some(backend);
                *self.state.write() = ModelState::Ready;
                Ok(())
            }
            Err(err) => {
                error!(%err, "model load failed");
                *self.state.write() = ModelState::Failed;
                Err(err)
            }
        }
    }

    /// Loads the libtorch backend described by the service configuration.
    #[cfg(feature = "tch-backend")]
    pub fn initialize(&self) -> Result<(), ServiceError> {
        let config = self.config.clone();
        self.initialize_with(move || {
            let backend = crate::model::tch_backend::TorchBackend::load(&config)?;
            Ok(Arc::new(backend) as Arc<dyn GenerationBackend>)
        })
    }

    #[cfg(not(feature = "tch-backend"))]
    pub fn initialize(&self) -> Result<(), ServiceError> {
        self.initialize_with(|| {
            Err(ServiceError::GenerationFailed(
                "no generation backend compiled in".into(),
            ))
        })
    }

    pub fn state(&self) -> ModelState {
        *self.state.read()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ModelState::Ready
    }

    pub fn metadata(&self) -> Option<ModelMetadata> {
        self.backend.read().as_ref().map(|b| b.metadata())
    }

    /// Runs one generation request end to end: validate, check readiness,
    /// tokenize, generate under a gate permit, strip the echoed prompt and
    /// decode the continuation. Every failure maps to a taxonomy error.
    pub async fn handle(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, ServiceError> {
        let params = request.validate(&self.config)?;
        let backend = self.ready_backend()?;

        let input_ids = backend.tokenize(&request.message).map_err(|err| {
            error!(%err, "tokenization failed");
            err
        })?;

        // Only the generation call itself is gated; the owned permit drops
        // on every exit path, including backend failure.
        let output = {
            let _permit = self.gate.acquire().await?;
            let backend = backend.clone();
            let input = input_ids.clone();
            task::spawn_blocking(move || backend.generate(&input, &params))
                .await
                .map_err(|err| {
                    ServiceError::GenerationFailed(format!("generation task failed: {err}"))
                })?
        };
        let output = output.map_err(|err| {
            error!(%err, "backend generation failed");
            err
        })?;

        // The backend may return prompt+continuation concatenated; the
        // response carries only the newly generated continuation.
        let continuation = if output.len() >= input_ids.len()
            && output[..input_ids.len()] == input_ids[..]
        {
            &output[input_ids.len()..]
        } else {
            &output[..]
        };
        if continuation.is_empty() {
            return Err(ServiceError::GenerationFailed(
                "model produced an empty continuation".into(),
            ));
        }

        let decoded = backend.detokenize(continuation).map_err(|err| {
            error!(%err, "decoding failed");
            err
        })?;
        let text = decoded.trim().to_string();
        if text.is_empty() {
            return Err(ServiceError::GenerationFailed(
                "model produced an empty continuation".into(),
            ));
        }

        Ok(GenerationResponse { text })
    }

    fn ready_backend(&self) -> Result<Arc<dyn GenerationBackend>, ServiceError> {
        if !self.is_ready() {
            return Err(ServiceError::ServiceUnavailable);
        }
        self.backend
            .read()
            .clone()
            .ok_or(ServiceError::ServiceUnavailable)
    }
}
