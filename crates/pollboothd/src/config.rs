use pollbooth_core::decision::{DEFAULT_DETECTOR, DEFAULT_MODEL, DEFAULT_THRESHOLD};
use pollbooth_core::VerifyConfig;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5001;
const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Service configuration, loaded once from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Model, detector and threshold handed to every verification.
    pub verify: VerifyConfig,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    pub bind_addr: String,
    pub port: u16,
    /// Largest accepted request body; larger bodies get 413.
    pub max_body_bytes: usize,
    /// HTTP worker count; `None` keeps the actix default.
    pub workers: Option<usize>,
}

impl Config {
    /// Load configuration from `POLLBOOTH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let threshold = match parsed::<f64>(&get, "POLLBOOTH_THRESHOLD") {
            Some(t) if f64::is_finite(t) && t >= 0.0 => t,
            Some(t) => {
                tracing::warn!(value = t, "ignoring invalid POLLBOOTH_THRESHOLD");
                DEFAULT_THRESHOLD
            }
            None => DEFAULT_THRESHOLD,
        };

        Self {
            verify: VerifyConfig {
                model: non_empty(get("POLLBOOTH_MODEL")).unwrap_or_else(|| DEFAULT_MODEL.into()),
                detector: non_empty(get("POLLBOOTH_DETECTOR"))
                    .unwrap_or_else(|| DEFAULT_DETECTOR.into()),
                threshold,
            },
            model_dir: non_empty(get("POLLBOOTH_MODEL_DIR"))
                .map(PathBuf::from)
                .unwrap_or_else(pollbooth_core::default_model_dir),
            bind_addr: non_empty(get("POLLBOOTH_BIND")).unwrap_or_else(|| DEFAULT_BIND.into()),
            port: parsed(&get, "POLLBOOTH_PORT").unwrap_or(DEFAULT_PORT),
            max_body_bytes: parsed(&get, "POLLBOOTH_MAX_BODY_BYTES")
                .unwrap_or(DEFAULT_MAX_BODY_BYTES),
            workers: parsed::<usize>(&get, "POLLBOOTH_WORKERS").filter(|&w| w > 0),
        }
    }
}

fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    get(key).and_then(|v| v.trim().parse().ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
