use faceid_core::{ConfidenceScorer, DecisionPolicy, ModelPack};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

/// Service configuration.
///
/// Layered: built-in defaults, then the TOML file named by `FACEID_CONFIG`,
/// then `FACEID_*` environment variables (and plain `PORT`), then
/// command-line flags applied by `main`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app_name: String,
    /// Bind address (default: 0.0.0.0).
    pub host: String,
    /// Listen port (default: 8000).
    pub port: u16,
    /// Idle time before a keep-alive connection is closed.
    pub keep_alive_secs: u64,
    /// Time in-flight connections get to finish after a shutdown signal.
    pub shutdown_grace_secs: u64,
    /// Upper bound on one verification, queueing included.
    pub verify_timeout_secs: u64,
    /// Directory holding model packs.
    pub model_dir: PathBuf,
    /// Model pack subdirectory (default: buffalo_l).
    pub model_name: String,
    /// Detector input (width, height).
    pub det_size: (usize, usize),
    /// Inference context: -1 for CPU, GPU ordinal otherwise.
    pub ctx_id: i32,
    /// Upload size limit in bytes.
    pub max_file_size: usize,
    /// Rotations (degrees) tried on every page, in order.
    pub rotation_angles: Vec<f32>,
    pub policy: DecisionPolicy,
    /// Report a random confidence instead of the similarity. Testing aid.
    pub use_random_confidence: bool,
    pub random_confidence_match: (f64, f64),
    pub random_confidence_no_match: (f64, f64),
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Face ID Verification API".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            keep_alive_secs: 65,
            shutdown_grace_secs: 30,
            verify_timeout_secs: 120,
            model_dir: faceid_core::default_model_dir(),
            model_name: "buffalo_l".to_string(),
            det_size: (640, 640),
            ctx_id: 0,
            max_file_size: 10 * 1024 * 1024,
            rotation_angles: vec![0.0, -10.0, 10.0, -20.0, 20.0, -30.0, 30.0],
            policy: DecisionPolicy::default(),
            use_random_confidence: false,
            random_confidence_match: (70.0, 85.0),
            random_confidence_no_match: (30.0, 45.0),
            log_format: LogFormat::Compact,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration using `lookup` to read variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup("FACEID_CONFIG") {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("FACEID_APP_NAME") {
            self.app_name = v;
        }
        if let Some(v) = lookup("FACEID_HOST") {
            self.host = v;
        }
        // FACEID_PORT wins over the platform-provided PORT.
        for key in ["PORT", "FACEID_PORT"] {
            if let Some(port) = parse_var(lookup, key)? {
                self.port = port;
            }
        }
        set_parsed(lookup, "FACEID_KEEP_ALIVE_SECS", &mut self.keep_alive_secs)?;
        set_parsed(lookup, "FACEID_SHUTDOWN_GRACE_SECS", &mut self.shutdown_grace_secs)?;
        set_parsed(lookup, "FACEID_VERIFY_TIMEOUT_SECS", &mut self.verify_timeout_secs)?;
        if let Some(v) = lookup("FACEID_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEID_MODEL_NAME") {
            self.model_name = v;
        }
        if let Some(v) = lookup("FACEID_DET_SIZE") {
            self.det_size = parse_det_size(&v).ok_or(ConfigError::InvalidValue {
                key: "FACEID_DET_SIZE",
                value: v,
            })?;
        }
        set_parsed(lookup, "FACEID_CTX_ID", &mut self.ctx_id)?;
        set_parsed(lookup, "FACEID_MAX_FILE_SIZE", &mut self.max_file_size)?;
        if let Some(v) = lookup("FACEID_ROTATION_ANGLES") {
            self.rotation_angles = parse_list(&v).ok_or(ConfigError::InvalidValue {
                key: "FACEID_ROTATION_ANGLES",
                value: v,
            })?;
        }

        let policy = &mut self.policy;
        set_parsed(lookup, "FACEID_MIN_QUALITY", &mut policy.min_quality)?;
        set_parsed(lookup, "FACEID_HIGH_QUALITY", &mut policy.high_quality)?;
        set_parsed(lookup, "FACEID_LOW_QUALITY", &mut policy.low_quality)?;
        set_parsed(lookup, "FACEID_HIGH_SIMILARITY_THRESHOLD", &mut policy.high_similarity_threshold)?;
        set_parsed(lookup, "FACEID_DEFAULT_SIMILARITY_THRESHOLD", &mut policy.default_similarity_threshold)?;
        set_parsed(lookup, "FACEID_HIGH_CONFIDENCE_THRESHOLD", &mut policy.high_confidence_threshold)?;
        set_parsed(lookup, "FACEID_TOLERANCE_BAND", &mut policy.tolerance_band)?;

        if let Some(v) = lookup("FACEID_USE_RANDOM_CONFIDENCE") {
            self.use_random_confidence = parse_bool(&v).ok_or(ConfigError::InvalidValue {
                key: "FACEID_USE_RANDOM_CONFIDENCE",
                value: v,
            })?;
        }
        set_parsed(lookup, "FACEID_LOG_FORMAT", &mut self.log_format)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rotation_angles.is_empty() {
            return Err(ConfigError::Invalid("rotation_angles must not be empty"));
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::Invalid("max_file_size must be positive"));
        }
        if self.verify_timeout_secs == 0 {
            return Err(ConfigError::Invalid("verify_timeout_secs must be positive"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    pub fn model_pack(&self) -> ModelPack {
        ModelPack::locate(&self.model_dir, &self.model_name)
    }

    pub fn confidence_scorer(&self) -> ConfidenceScorer {
        if self.use_random_confidence {
            ConfidenceScorer::Random {
                matched: self.random_confidence_match,
                unmatched: self.random_confidence_no_match,
            }
        } else {
            ConfidenceScorer::Similarity
        }
    }

    /// Request body limit: the upload limit plus room for multipart framing.
    pub fn body_limit(&self) -> usize {
        self.max_file_size.saturating_add(1024 * 1024)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}

fn set_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = parse_var(lookup, key)? {
        *slot = value;
    }
    Ok(())
}

/// "640x640" or "640,640".
fn parse_det_size(s: &str) -> Option<(usize, usize)> {
    let (w, h) = s.split_once(['x', 'X', ','])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

fn parse_list(s: &str) -> Option<Vec<f32>> {
    s.split(',').map(|v| v.trim().parse().ok()).collect()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
