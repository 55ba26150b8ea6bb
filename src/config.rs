use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// Apply `OPENAI_API_KEY`, `BOOK_CHAT_BIND` and `BOOK_CHAT_PORT`.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(key) = var("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(bind) = var("BOOK_CHAT_BIND") {
            self.server.bind = bind;
        }
        if let Some(port) = var("BOOK_CHAT_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("invalid BOOK_CHAT_PORT: {port}"))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}
impl Default for Server {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3000,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl Server {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    pub database_path: PathBuf,
    pub blob_dir: PathBuf,
}
impl Default for Storage {
    fn default() -> Self {
        Self {
            database_path: "data/book-chat.db".into(),
            blob_dir: "data/pdfs".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    /// Overrides the provider's default endpoint.
    pub base_url: Option<String>,
    pub ollama_host: String,
    pub model: String,
    pub temperature: f32,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}
impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            base_url: None,
            ollama_host: "http://localhost:11434".into(),
            model: "gpt-4-turbo-preview".into(),
            temperature: 0.7,
            api_key: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// `tracing_subscriber::EnvFilter` directives; `RUST_LOG` wins when set.
    pub filter: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_example_config() {
        let raw = include_str!("../book-chat.example.toml");
        let cfg: Config = toml::from_str(raw).expect("parse TOML");
        assert_eq!(cfg.llm.provider, ProviderKind::OpenAi);
        assert_eq!(cfg.llm.model, "gpt-4-turbo-preview");
        assert!(cfg.server.max_upload_bytes > 0);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let cfg: Config = toml::from_str("[llm]\nprovider = \"ollama\"\nmodel = \"llama3\"\n").unwrap();
        assert_eq!(cfg.llm.provider, ProviderKind::Ollama);
        assert_eq!(cfg.llm.model, "llama3");
        assert!((cfg.llm.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.server.port, 3000);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("BOOK_CHAT_BIND", "127.0.0.1"),
            ("BOOK_CHAT_PORT", "8080"),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::default();
        cfg.apply_vars(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.server.addr(), "127.0.0.1:8080");

        let mut bad = Config::default();
        assert!(bad
            .apply_vars(|k| (k == "BOOK_CHAT_PORT").then(|| "http".to_string()))
            .is_err());
    }
}
