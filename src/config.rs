use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::{FlowError, Result, inference::DEFAULT_OLLAMA_ENDPOINT};

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// executor config
    pub executor: ExecutorConfig,
    /// inference backend config
    pub inference: InferenceConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// independent nodes that may run at once within one run, >= 1, defaults to 1
    pub max_parallelism: usize,
    /// per llm-node inference timeout in milliseconds, 0 disables, defaults to 120000
    pub llm_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallelism: 1,
            llm_timeout_ms: 120_000,
        }
    }
}

impl ExecutorConfig {
    pub fn llm_timeout(&self) -> Option<Duration> {
        match self.llm_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct InferenceConfig {
    /// backend type
    pub backend: BackendType,
    /// base url of the ollama server
    pub endpoint: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            endpoint: DEFAULT_OLLAMA_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    #[default]
    Ollama,
    /// every llm node fails with `ModelNotFound`
    None,
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| FlowError::Config(format!("failed to load config file {:?}: {e}", path.as_ref())))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.executor.max_parallelism == 0 {
            return Err(FlowError::Config("executor.max_parallelism must be at least 1".to_string()));
        }
        Ok(())
    }
}
