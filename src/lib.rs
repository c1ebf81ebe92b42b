pub mod config;
pub mod error;
pub mod gate;
pub mod model;
pub mod server;

pub use config::AppConfig;
pub use error::ServiceError;
pub use gate::ExecutionGate;
pub use model::{GenerationRequest, GenerationResponse, GenerationService, ModelState};
pub use server::build_router;
