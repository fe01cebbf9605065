// Configuration module for the Leshiy dispatcher

use anyhow::Result;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{DispatchError, DispatchResult};

static CONFIG: OnceCell<RwLock<AppConfig>> = OnceCell::new();
static CONFIG_PATH: OnceCell<PathBuf> = OnceCell::new();

const SECRET_ENV_PREFIX: &str = "LESHIY_SECRET_";
const RELAY_URL_ENV: &str = "LESHIY_RELAY_URL";

pub const PROXY_SECRET: &str = "PROXY_SECRET";
pub const CLOUDFLARE_ACCOUNT_ID: &str = "CLOUDFLARE_ACCOUNT_ID";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// The single relay every provider call goes through
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    #[serde(default = "default_proxy_secret_ref")]
    pub proxy_secret_ref: String,

    #[serde(default)]
    pub storage_gateway: Option<String>,

    #[serde(default)]
    pub storage_chat_id: Option<String>,

    #[serde(default)]
    pub store_path: Option<String>,

    #[serde(default)]
    pub api_keys: Vec<String>,

    /// Named secrets referenced by `ModelEntry::api_key_ref`
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            relay_url: default_relay_url(),
            proxy_secret_ref: default_proxy_secret_ref(),
            storage_gateway: None,
            storage_chat_id: None,
            store_path: None,
            api_keys: Vec::new(),
            secrets: HashMap::new(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8420
}

fn default_relay_url() -> String {
    "https://gemini-proxy.leshiyalex.workers.dev".to_string()
}

fn default_proxy_secret_ref() -> String {
    PROXY_SECRET.to_string()
}

impl AppConfig {
    /// Apply `LESHIY_SECRET_<NAME>` and `LESHIY_RELAY_URL` overrides.
    pub fn apply_env_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(name) = key.strip_prefix(SECRET_ENV_PREFIX) {
                if !name.is_empty() {
                    self.secrets.insert(name.to_string(), value);
                }
            } else if key == RELAY_URL_ENV && !value.trim().is_empty() {
                self.relay_url = value;
            }
        }
    }

    /// Path of the persisted model selection database.
    pub fn resolve_store_path(&self) -> PathBuf {
        if let Some(path) = self.store_path.as_deref().filter(|p| !p.trim().is_empty()) {
            if let Some(rest) = path.strip_prefix("~/") {
                if let Some(home) = dirs::home_dir() {
                    return home.join(rest);
                }
            }
            return PathBuf::from(path);
        }

        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("leshiy-dispatch")
            .join("selection.db")
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("leshiy-dispatch")
        .join("config.yaml")
}

/// Load a config file, writing defaults if it does not exist yet.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    } else {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let default_config = AppConfig::default();
        std::fs::write(path, serde_yaml::to_string(&default_config)?)?;
        Ok(default_config)
    }
}

pub fn init_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = path.unwrap_or_else(default_config_path);
    CONFIG_PATH.set(config_path.clone()).ok();

    let mut config = load_config(&config_path)?;
    config.apply_env_overrides(std::env::vars());

    match CONFIG.get() {
        Some(lock) => *lock.write() = config.clone(),
        None => {
            CONFIG.set(RwLock::new(config.clone())).ok();
        }
    }

    tracing::info!(
        "Config initialized from {:?} ({} secrets)",
        config_path,
        config.secrets.len()
    );
    Ok(config)
}

pub fn get_config() -> Option<AppConfig> {
    CONFIG.get().map(|c| c.read().clone())
}

pub fn update_config(config: AppConfig) -> Result<()> {
    if let Some(lock) = CONFIG.get() {
        *lock.write() = config.clone();
    }

    if let Some(path) = CONFIG_PATH.get() {
        let content = serde_yaml::to_string(&config)?;
        std::fs::write(path, content)?;
    }

    Ok(())
}

/// Maps symbolic secret references to their values, failing closed.
pub trait SecretResolver: Send + Sync {
    fn lookup(&self, name: &str) -> Option<String>;

    fn resolve(&self, name: &str) -> DispatchResult<String> {
        match self.lookup(name) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => {
                tracing::error!("Secret reference {} is not configured", name);
                Err(DispatchError::config(format!("secret {} is not set", name)))
            }
        }
    }
}

impl SecretResolver for AppConfig {
    fn lookup(&self, name: &str) -> Option<String> {
        self.secrets.get(name).cloned()
    }
}

/// Reads secrets from the process-wide config on every lookup, so
/// `update_config` takes effect on the next dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalSecrets;

impl SecretResolver for GlobalSecrets {
    fn lookup(&self, name: &str) -> Option<String> {
        CONFIG.get().and_then(|lock| lock.read().secrets.get(name).cloned())
    }
}

/// Fixed secret map.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets(HashMap<String, String>);

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl SecretResolver for StaticSecrets {
    fn lookup(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}
