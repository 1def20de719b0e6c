use crate::constants::{
    API_KEY_ENV_VARS, APP_DIR_NAME, DEFAULT_GEMINI_MODEL, GEMINI_BASE_URL, OLLAMA_BASE_URL,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub active_model: String,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub active_provider: String,
    pub providers: Vec<ProviderConfig>,
    /// Maximum number of history entries kept. `None` keeps everything.
    #[serde(default)]
    pub history_limit: Option<usize>,
    /// Overrides the directory backing the persistent store.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            active_provider: "Gemini".to_string(),
            providers: vec![
                ProviderConfig {
                    name: "Gemini".to_string(),
                    api_key: None,
                    base_url: GEMINI_BASE_URL.to_string(),
                    active_model: DEFAULT_GEMINI_MODEL.to_string(),
                    system_prompt: None,
                },
                ProviderConfig {
                    name: "Ollama".to_string(),
                    api_key: None,
                    base_url: OLLAMA_BASE_URL.to_string(),
                    active_model: "qwen2.5:0.5b".to_string(),
                    system_prompt: None,
                },
                ProviderConfig {
                    name: "OpenAI".to_string(),
                    api_key: None,
                    base_url: "https://api.openai.com/v1".to_string(),
                    active_model: "gpt-4o".to_string(),
                    system_prompt: None,
                },
            ],
            history_limit: None,
            data_dir: None,
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR_NAME);
        path
    }

    pub fn config_file() -> PathBuf {
        let mut path = Self::config_dir();
        path.push("config.toml");
        path
    }

    /// Directory the file store writes into.
    pub fn store_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR_NAME);
        path.push("store");
        path
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_file())
    }

    /// Reads `path`, writing the defaults there only when no file exists.
    /// A file that fails to read or parse is left as it is.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            let default = Self::default();
            if let Err(e) = default.save_to(path) {
                tracing::warn!("Could not write default config: {}", e);
            }
            return default;
        }
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Could not read config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_file())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn get_active_provider(&self) -> Option<&ProviderConfig> {
        self.providers
            .iter()
            .find(|p| p.name == self.active_provider)
    }

    /// Active provider with a missing API key filled from the environment.
    pub fn resolved_provider(&self) -> Option<ProviderConfig> {
        let mut provider = self.get_active_provider()?.clone();
        if provider.api_key.is_none() {
            provider.api_key = API_KEY_ENV_VARS
                .iter()
                .find_map(|var| std::env::var(var).ok())
                .filter(|key| !key.trim().is_empty());
        }
        Some(provider)
    }
}
