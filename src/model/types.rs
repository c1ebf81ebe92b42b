use serde::{Deserialize, Serialize};

use crate::{config::AppConfig, error::ServiceError};

#[derive(Debug, Deserialize)]
pub struct GenerationRequest {
    pub message: String,
    pub max_new_tokens: Option<usize>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub repetition_penalty: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResponse {
    pub text: String,
}

/// Validated sampling parameters. Sampling is always on: a temperature is
/// present on every request (supplied or defaulted), and greedy decoding is
/// never substituted for it.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub repetition_penalty: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelMetadata {
    pub name: String,
    pub device: String,
    pub dtype: String,
}

impl GenerationRequest {
    /// Applies configured defaults and rejects out-of-range parameters.
    /// A request that fails here must never reach the backend.
    pub fn validate(&self, config: &AppConfig) -> Result<GenerationParams, ServiceError> {
        if self.message.trim().is_empty() {
            return Err(ServiceError::InvalidArgument(
                "message must not be empty".into(),
            ));
        }

        let max_new_tokens = self.max_new_tokens.unwrap_or(config.max_new_tokens);
        if max_new_tokens == 0 {
            return Err(ServiceError::InvalidArgument(
                "max_new_tokens must be greater than zero".into(),
            ));
        }
        if max_new_tokens > config.max_new_tokens_ceiling {
            return Err(ServiceError::InvalidArgument(format!(
                "max_new_tokens must not exceed {}",
                config.max_new_tokens_ceiling
            )));
        }

        let temperature = self.temperature.unwrap_or(config.temperature);
        if temperature <= 0.0 {
            return Err(ServiceError::InvalidArgument(
                "temperature must be greater than zero".into(),
            ));
        }

        let top_p = self.top_p.unwrap_or(config.top_p);
        if top_p <= 0.0 || top_p > 1.0 {
            return Err(ServiceError::InvalidArgument(
                "top_p must be in (0, 1]".into(),
            ));
        }

        let repetition_penalty = self.repetition_penalty.unwrap_or(config.repetition_penalty);
        if repetition_penalty <= 0.0 {
            return Err(ServiceError::InvalidArgument(
                "repetition_penalty must be greater than zero".into(),
            ));
        }

        Ok(GenerationParams {
            max_new_tokens,
            temperature,
            top_p,
            repetition_penalty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{net::SocketAddr, path::PathBuf, time::Duration};

    use crate::config::DevicePreference;

    fn config() -> AppConfig {
        AppConfig {
            listen_addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
            model_id: "test-model".into(),
            model_path: PathBuf::from("model.ts"),
            tokenizer_path: PathBuf::from("tokenizer.json"),
            device: DevicePreference::Cpu,
            eos_token_id: None,
            max_new_tokens: 256,
            max_new_tokens_ceiling: 1024,
            temperature: 0.7,
            top_p: 0.9,
            repetition_penalty: 1.2,
            gate_permits: 1,
            gate_wait_timeout: Duration::from_secs(1),
        }
    }

    fn request(message: &str) -> GenerationRequest {
        GenerationRequest {
            message: message.into(),
            max_new_tokens: None,
            temperature: None,
            top_p: None,
            repetition_penalty: None,
        }
    }

    #[test]
    fn defaults_are_applied() {
        let params = request("hello").validate(&config()).unwrap();
        assert_eq!(params.max_new_tokens, 256);
        assert_eq!(params.temperature, 0.7);
        assert_eq!(params.top_p, 0.9);
        assert_eq!(params.repetition_penalty, 1.2);
    }

    #[test]
    fn empty_and_whitespace_messages_are_rejected() {
        assert!(matches!(
            request("").validate(&config()),
            Err(ServiceError::InvalidArgument(_))
        ));
        assert!(matches!(
            request("   \n").validate(&config()),
            Err(ServiceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn out_of_range_parameters_are_rejected() {
        let mut req = request("hi");
        req.max_new_tokens = Some(0);
        assert!(matches!(
            req.validate(&config()),
            Err(ServiceError::InvalidArgument(_))
        ));

        let mut req = request("hi");
        req.max_new_tokens = Some(4096);
        assert!(matches!(
            req.validate(&config()),
            Err(ServiceError::InvalidArgument(_))
        ));

        let mut req = request("hi");
        req.temperature = Some(0.0);
        assert!(matches!(
            req.validate(&config()),
            Err(ServiceError::InvalidArgument(_))
        ));

        let mut req = request("hi");
        req.top_p = Some(1.5);
        assert!(matches!(
            req.validate(&config()),
            Err(ServiceError::InvalidArgument(_))
        ));
    }
}
