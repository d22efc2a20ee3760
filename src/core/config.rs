use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EastmoneyProviderConfig {
    /// Realtime valuation scripts.
    #[serde(default = "default_fundgz_url")]
    pub fundgz_url: String,
    /// Fund archive pages, used for holdings.
    #[serde(default = "default_fundf10_url")]
    pub fundf10_url: String,
    /// Fund data scripts, used for net value history.
    #[serde(default = "default_fund_url")]
    pub fund_url: String,
    #[serde(default = "default_suggest_url")]
    pub suggest_url: String,
}

impl Default for EastmoneyProviderConfig {
    fn default() -> Self {
        Self {
            fundgz_url: default_fundgz_url(),
            fundf10_url: default_fundf10_url(),
            fund_url: default_fund_url(),
            suggest_url: default_suggest_url(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TencentProviderConfig {
    pub base_url: String,
}

impl Default for TencentProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://qt.gtimg.cn".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub eastmoney: EastmoneyProviderConfig,
    #[serde(default)]
    pub tencent: TencentProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Safety timeout for a single remote retrieval.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig::default(),
            request_timeout_ms: default_request_timeout_ms(),
            data_path: None,
        }
    }
}

fn default_fundgz_url() -> String {
    "https://fundgz.1234567.com.cn".to_string()
}

fn default_fundf10_url() -> String {
    "https://fundf10.eastmoney.com".to_string()
}

fn default_fund_url() -> String {
    "https://fund.eastmoney.com".to_string()
}

fn default_suggest_url() -> String {
    "https://fundsuggest.eastmoney.com".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

impl AppConfig {
    /// Loads the default config file, falling back to defaults when there
    /// is none yet.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "fundwatch", "fundwatch")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("in", "fundwatch", "fundwatch")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
