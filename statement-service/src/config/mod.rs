use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct StatementConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub storage: StorageConfig,
    pub worker: WorkerConfig,
    pub groq: GroqConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub local_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub worker_count: usize,
    pub queue_size: usize,
    pub command_timeout_secs: u64,
    pub temp_dir: String,
}

impl WorkerConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroqConfig {
    pub api_key: String,
    pub text_model: String,
    pub vision_model: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Render resolution for the vision backend's page images.
    pub dpi: u32,
    /// Character budget for statement text handed to the parser prompt.
    pub max_prompt_chars: usize,
}

impl StatementConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(StatementConfig {
            common,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("statement_db"), is_prod)?,
            },
            storage: StorageConfig {
                local_path: get_env("STORAGE_LOCAL_PATH", Some("storage"), is_prod)?,
            },
            worker: WorkerConfig {
                enabled: get_env("WORKER_ENABLED", Some("true"), is_prod)?
                    .parse()
                    .unwrap_or(true),
                worker_count: get_env("WORKER_COUNT", Some("4"), is_prod)?
                    .parse()
                    .unwrap_or(4),
                queue_size: get_env("WORKER_QUEUE_SIZE", Some("64"), is_prod)?
                    .parse()
                    .unwrap_or(64),
                command_timeout_secs: get_env("WORKER_COMMAND_TIMEOUT_SECS", Some("60"), is_prod)?
                    .parse()
                    .unwrap_or(60),
                temp_dir: get_env("WORKER_TEMP_DIR", Some("tmp"), is_prod)?,
            },
            groq: GroqConfig {
                // Empty key keeps the service bootable; provider calls then
                // fail with NotConfigured and land in the error fields.
                api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
                text_model: get_env("GROQ_TEXT_MODEL", Some("llama-3.3-70b-versatile"), is_prod)?,
                vision_model: get_env(
                    "GROQ_VISION_MODEL",
                    Some("meta-llama/llama-4-scout-17b-16e-instruct"),
                    is_prod,
                )?,
                request_timeout_secs: get_env("GROQ_TIMEOUT_SECS", Some("120"), is_prod)?
                    .parse()
                    .unwrap_or(120),
            },
            extraction: ExtractionConfig {
                dpi: get_env("EXTRACTION_DPI", Some("300"), is_prod)?
                    .parse()
                    .unwrap_or(300),
                max_prompt_chars: get_env("PARSER_MAX_PROMPT_CHARS", Some("10000"), is_prod)?
                    .parse()
                    .unwrap_or(10_000),
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
