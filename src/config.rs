use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub prompting: PromptingConfig,
    #[serde(default)]
    pub grounding: GroundingConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8741".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/docsmith.sqlite")
}

/// Settings for the upstream inference server.
///
/// The URL and model can also be supplied through the `DOCSMITH_INFERENCE_URL`
/// and `DOCSMITH_MODEL` environment variables, which take precedence over the
/// config file. Generation length is unpredictable, so `timeout_secs` is a
/// deliberately large ceiling rather than a typical request timeout.
#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_inference_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_inference_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            url: default_inference_url(),
            model: default_model(),
            timeout_secs: default_inference_timeout_secs(),
            heartbeat_ms: default_heartbeat_ms(),
        }
    }
}

fn default_inference_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "qwen2.5-coder:7b".to_string()
}
fn default_inference_timeout_secs() -> u64 {
    600
}
fn default_heartbeat_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptingConfig {
    /// Prompt selection policy: `code-detect` or `grounding`.
    #[serde(default = "default_policy")]
    pub policy: String,
}

impl Default for PromptingConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
        }
    }
}

fn default_policy() -> String {
    "code-detect".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GroundingConfig {
    /// Address used for the outbound reachability probe.
    #[serde(default = "default_probe_addr")]
    pub probe_addr: String,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// MediaWiki API endpoint queried for reference text.
    #[serde(default = "default_reference_api_url")]
    pub reference_api_url: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Reference text is truncated to this many characters before prompting.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            probe_addr: default_probe_addr(),
            probe_timeout_secs: default_probe_timeout_secs(),
            reference_api_url: default_reference_api_url(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_probe_addr() -> String {
    "8.8.8.8:53".to_string()
}
fn default_probe_timeout_secs() -> u64 {
    2
}
fn default_reference_api_url() -> String {
    "https://en.wikipedia.org/w/api.php".to_string()
}
fn default_fetch_timeout_secs() -> u64 {
    10
}
fn default_max_context_chars() -> usize {
    6000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    /// Directory that generated PDF files are written into.
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
        }
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("./data/exports")
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Secret used to sign session tokens. Override this in production.
    #[serde(default = "default_auth_secret")]
    pub secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: default_auth_secret(),
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

fn default_auth_secret() -> String {
    "docsmith-dev-secret".to_string()
}
fn default_token_ttl_hours() -> i64 {
    24
}

/// Load configuration from a TOML file.
///
/// A missing file is not an error: every section has working local defaults,
/// so the server can start with no configuration at all. Environment
/// overrides (`DOCSMITH_INFERENCE_URL`, `DOCSMITH_MODEL`) are applied after
/// parsing.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    if let Ok(url) = std::env::var("DOCSMITH_INFERENCE_URL") {
        if !url.is_empty() {
            config.inference.url = url;
        }
    }
    if let Ok(model) = std::env::var("DOCSMITH_MODEL") {
        if !model.is_empty() {
            config.inference.model = model;
        }
    }

    match config.prompting.policy.as_str() {
        "code-detect" | "grounding" => {}
        other => anyhow::bail!(
            "Unknown prompting policy: '{}'. Must be code-detect or grounding.",
            other
        ),
    }

    if config.inference.heartbeat_ms == 0 {
        anyhow::bail!("inference.heartbeat_ms must be > 0");
    }
    if config.inference.timeout_secs == 0 {
        anyhow::bail!("inference.timeout_secs must be > 0");
    }
    if config.grounding.max_context_chars == 0 {
        anyhow::bail!("grounding.max_context_chars must be > 0");
    }
    if config.auth.token_ttl_hours < 1 {
        anyhow::bail!("auth.token_ttl_hours must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Path::new("/nonexistent/docsmith.toml")).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8741");
        assert_eq!(config.inference.model, "qwen2.5-coder:7b");
        assert_eq!(config.prompting.policy, "code-detect");
    }

    #[test]
    fn rejects_unknown_policy() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[prompting]\npolicy = \"psychic\"\n").unwrap();
        let err = load_config(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("Unknown prompting policy"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[inference]\nmodel = \"llama3.2\"\n").unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.inference.model, "llama3.2");
        assert_eq!(config.inference.url, "http://localhost:11434");
        assert_eq!(config.inference.heartbeat_ms, 1000);
    }
}
