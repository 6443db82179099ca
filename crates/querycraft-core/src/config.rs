use std::path::{Path, PathBuf};
use std::time::Duration;

use querycraft_types::DatabaseSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Harness settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default = "default_catalog")]
    pub catalog: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Characters of answer text kept per result in the report.
    #[serde(default = "default_output_cap")]
    pub output_cap: usize,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub database: DatabaseSchema,
}

fn default_catalog() -> PathBuf {
    PathBuf::from("data/evals/funding-analysis-evals.json")
}

fn default_output() -> PathBuf {
    PathBuf::from("output/eval-results.json")
}

fn default_output_cap() -> usize {
    3000
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog(),
            output: default_output(),
            output_cap: default_output_cap(),
            agent: AgentConfig::default(),
            database: DatabaseSchema::default(),
        }
    }
}

impl HarnessConfig {
    /// Reads a JSON (`.json`) or YAML (anything else) config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let parsed = if is_json(path) {
            serde_json::from_str(content).map_err(|e| e.to_string())
        } else if content.trim().is_empty() {
            Ok(Self::default())
        } else {
            serde_yaml::from_str(content).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }
}

/// How the agent subprocess is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Placed before the generated flags.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_prompt_flag")]
    pub prompt_flag: String,
    #[serde(default = "default_stream_args")]
    pub stream_args: Vec<String>,
    #[serde(default = "default_allowed_tools_flag")]
    pub allowed_tools_flag: String,
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_program() -> String {
    "claude".to_string()
}

fn default_prompt_flag() -> String {
    "-p".to_string()
}

fn default_stream_args() -> Vec<String> {
    vec![
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
    ]
}

fn default_allowed_tools_flag() -> String {
    "--allowedTools".to_string()
}

fn default_allowed_tools() -> Vec<String> {
    vec!["Bash(sqlite3:*)".to_string(), "Read".to_string()]
}

fn default_timeout_secs() -> u64 {
    180
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            prompt_flag: default_prompt_flag(),
            stream_args: default_stream_args(),
            allowed_tools_flag: default_allowed_tools_flag(),
            allowed_tools: default_allowed_tools(),
            working_dir: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub(crate) fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
