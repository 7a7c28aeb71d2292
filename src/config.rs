use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

/// Caps for the bounded-sample statistics computed per upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilerSettings {
    /// Leading cells inspected for type inference and unique sampling.
    pub type_inference_window: usize,
    pub unique_sample_limit: usize,
    pub sample_row_limit: usize,
    /// Sample rows turned into embedding chunks.
    pub chunk_row_limit: usize,
}

impl Default for ProfilerSettings {
    fn default() -> Self {
        Self {
            type_inference_window: 100,
            unique_sample_limit: 10,
            sample_row_limit: 5,
            chunk_row_limit: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub embedding_model: String,
    pub embedding_batch_size: usize,
    pub enable_embeddings: bool,
    pub upload_dir: PathBuf,
    pub index_path: PathBuf,
    pub max_file_size: usize,
    pub log_level: String,
    pub cors_origins: Vec<String>,
    pub max_tokens: u16,
    pub temperature: f32,
    pub max_context_tokens: usize,
    pub profiling: ProfilerSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_batch_size: 100,
            enable_embeddings: true,
            upload_dir: PathBuf::from("./uploads"),
            index_path: PathBuf::from("./data/index.sqlite3"),
            max_file_size: default_max_file_size(),
            log_level: "info".to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            max_tokens: 1000,
            temperature: 0.7,
            max_context_tokens: 2000,
            profiling: ProfilerSettings::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let profiling = ProfilerSettings {
            type_inference_window: parse_positive(&get, "TYPE_INFERENCE_WINDOW", defaults.profiling.type_inference_window)?,
            unique_sample_limit: parse_positive(&get, "UNIQUE_SAMPLE_LIMIT", defaults.profiling.unique_sample_limit)?,
            sample_row_limit: parse_or(&get, "SAMPLE_ROW_LIMIT", defaults.profiling.sample_row_limit)?,
            chunk_row_limit: parse_or(&get, "CHUNK_ROW_LIMIT", defaults.profiling.chunk_row_limit)?,
        };

        Ok(Config {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or(&get, "PORT", defaults.port)?,
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            embedding_model: get("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            embedding_batch_size: parse_or(&get, "EMBEDDING_BATCH_SIZE", defaults.embedding_batch_size)?,
            enable_embeddings: parse_or(&get, "ENABLE_EMBEDDINGS", defaults.enable_embeddings)?,
            upload_dir: get("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            index_path: get("INDEX_PATH").map(PathBuf::from).unwrap_or(defaults.index_path),
            max_file_size: parse_or(&get, "MAX_FILE_SIZE", defaults.max_file_size)?,
            log_level: get("LOG_LEVEL").map(|l| l.to_lowercase()).unwrap_or(defaults.log_level),
            cors_origins: get("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            max_tokens: parse_or(&get, "MAX_TOKENS", defaults.max_tokens)?,
            temperature: parse_or(&get, "TEMPERATURE", defaults.temperature)?,
            max_context_tokens: parse_or(&get, "MAX_CONTEXT_TOKENS", defaults.max_context_tokens)?,
            profiling,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn parse_positive<G>(get: &G, key: &str, default: usize) -> Result<usize>
where
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, key, default)?;
    if value == 0 {
        anyhow::bail!("Invalid value for {}: must be at least 1", key);
    }
    Ok(value)
}

pub fn load_config() -> Result<Config> {
    // Load .env file first
    dotenv().ok();
    Config::from_env()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.profiling, ProfilerSettings::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("OPENAI_API_KEY", "sk-test"),
            ("TYPE_INFERENCE_WINDOW", "25"),
            ("CORS_ORIGINS", "http://a.test, http://b.test,"),
            ("ENABLE_EMBEDDINGS", "false"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.profiling.type_inference_window, 25);
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert!(!config.enable_embeddings);
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let config = config_from(&[("OPENAI_API_KEY", "  ")]).unwrap();
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn malformed_number_is_an_error() {
        let err = config_from(&[("MAX_FILE_SIZE", "ten")]).unwrap_err();
        assert!(err.to_string().contains("MAX_FILE_SIZE"));
    }

    #[test]
    fn zero_sampling_caps_are_rejected() {
        let err = config_from(&[("TYPE_INFERENCE_WINDOW", "0")]).unwrap_err();
        assert!(err.to_string().contains("TYPE_INFERENCE_WINDOW"));

        let err = config_from(&[("UNIQUE_SAMPLE_LIMIT", "0")]).unwrap_err();
        assert!(err.to_string().contains("UNIQUE_SAMPLE_LIMIT"));

        let config = config_from(&[("TYPE_INFERENCE_WINDOW", "1"), ("UNIQUE_SAMPLE_LIMIT", "1")]).unwrap();
        assert_eq!(config.profiling.type_inference_window, 1);
    }
}
