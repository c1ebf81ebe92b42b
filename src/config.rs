use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

/// Where the model should run. `Auto` prefers an accelerator when one is
/// present and falls back to the CPU; the backend resolves this against
/// the hardware it actually finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePreference {
    Auto,
    Cpu,
    Cuda(usize),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub model_id: String,
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub device: DevicePreference,
    pub eos_token_id: Option<i64>,
    pub max_new_tokens: usize,
    pub max_new_tokens_ceiling: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub repetition_penalty: f64,
    pub gate_permits: usize,
    pub gate_wait_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_addr = env::var("SERVER_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".into())
            .parse()
            .unwrap_or_else(|_| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080));

        let model_id = env::var("MODEL_ID").unwrap_or_else(|_| "mentallama-chat-7b".to_string());
        let model_path = PathBuf::from(
            env::var("MODEL_PATH").unwrap_or_else(|_| "models/model.ts".to_string()),
        );
        let tokenizer_path = PathBuf::from(
            env::var("TOKENIZER_PATH").unwrap_or_else(|_| "models/tokenizer.json".to_string()),
        );

        let device = parse_device(&env::var("DEVICE").unwrap_or_else(|_| "auto".into()));
        let eos_token_id = env::var("EOS_TOKEN_ID").ok().and_then(|v| v.parse().ok());

        let max_new_tokens = env::var("MAX_NEW_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(256);
        let max_new_tokens_ceiling = env::var("MAX_NEW_TOKENS_CEILING")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1024);
        let temperature = env::var("TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.7);
        let top_p = env::var("TOP_P")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.9);
        let repetition_penalty = env::var("REPETITION_PENALTY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1.2);

        let gate_permits = env::var("GATE_PERMITS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(1);
        let gate_wait_timeout = env::var("GATE_WAIT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_secs(30));

        Ok(Self {
            listen_addr,
            model_id,
            model_path,
            tokenizer_path,
            device,
            eos_token_id,
            max_new_tokens,
            max_new_tokens_ceiling,
            temperature,
            top_p,
            repetition_penalty,
            gate_permits,
            gate_wait_timeout,
        })
    }
}

fn parse_device(raw: &str) -> DevicePreference {
    let lower = raw.to_lowercase();
    if lower == "cpu" {
        DevicePreference::Cpu
    } else if lower.starts_with("cuda") {
        let idx = lower
            .split(':')
            .nth(1)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        DevicePreference::Cuda(idx)
    } else {
        DevicePreference::Auto
    }
}
