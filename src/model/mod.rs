mod backend;
mod service;
mod types;

#[cfg(feature = "tch-backend")]
pub mod tch_backend;

pub use backend::GenerationBackend;
pub use service::{GenerationService, ModelState};
pub use types::{GenerationParams, GenerationRequest, GenerationResponse, ModelMetadata};
