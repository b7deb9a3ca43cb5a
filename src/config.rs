// src/config.rs - Client configuration: defaults, TOML file, environment overrides
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub persist: bool,
    pub store_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub chart_file_name: String,
    pub report_file_pattern: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            request_timeout_seconds: 30,
            user_agent: format!("chemviz/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            persist: true,
            store_path: default_store_path(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            chart_file_name: "equipment_charts.png".to_string(),
            report_file_pattern: "dataset_{id}_report.pdf".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_store_path() -> PathBuf {
    match env::var("HOME") {
        Ok(home) if !home.is_empty() => Path::new(&home).join(".chemviz").join("session.json"),
        _ => PathBuf::from(".chemviz-session.json"),
    }
}

pub fn load_config() -> Result<Config> {
    load_env_file()?;

    let mut config = if let Ok(config_file) = env::var("CONFIG_FILE") {
        let path = Path::new(&config_file);
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", config_file))?;
        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", config_file))?
    } else {
        Config::default()
    };

    override_with_env(&mut config);

    config.validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

fn override_with_env(config: &mut Config) {
    if let Ok(url) = env::var("CHEMVIZ_API_URL") {
        config.api.base_url = url;
    }
    if let Ok(timeout_str) = env::var("CHEMVIZ_TIMEOUT_SECONDS") {
        if let Ok(timeout) = timeout_str.parse::<u64>() {
            config.api.request_timeout_seconds = timeout;
        }
    }
    if let Ok(path) = env::var("CHEMVIZ_SESSION_FILE") {
        config.session.store_path = PathBuf::from(path);
    }
    if let Ok(persist_str) = env::var("CHEMVIZ_PERSIST_SESSION") {
        if let Ok(persist) = persist_str.parse::<bool>() {
            config.session.persist = persist;
        }
    }
    if let Ok(dir) = env::var("CHEMVIZ_OUTPUT_DIR") {
        config.export.output_dir = PathBuf::from(dir);
    }
    if let Ok(level) = env::var("RUST_LOG") {
        config.logging.level = level;
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow::anyhow!(
                "api.base_url must be an http(s) URL (current: {})",
                self.api.base_url
            ));
        }

        if self.api.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("api.request_timeout_seconds must be greater than 0"));
        }

        if self.export.chart_file_name.trim().is_empty() {
            return Err(anyhow::anyhow!("export.chart_file_name must not be empty"));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.api.request_timeout_seconds)
    }

    pub fn print_startup_info(&self) {
        log::info!("🧪 chemviz client");
        log::info!("🌐 API: {} (timeout {}s)", self.api.base_url, self.api.request_timeout_seconds);
        log::info!("🔑 Session storage: {}",
            if self.session.persist { self.session.store_path.display().to_string() }
            else { "disabled".to_string() });
        log::info!("📁 Exports: {}", self.export.output_dir.display());
        log::info!("📊 Logging: {} level", self.logging.level);

        if self.api.base_url.starts_with("http://") && self.session.persist {
            log::warn!("⚠️  Credentials are sent over plain HTTP and kept on disk");
        }
    }
}

pub fn load_env_file() -> Result<()> {
    if let Ok(env_file) = env::var("ENV_FILE") {
        dotenvy::from_filename(&env_file)
            .with_context(|| format!("Failed to load environment file: {}", env_file))?;
    } else if Path::new(".env").exists() {
        dotenvy::dotenv().context("Failed to load .env file")?;
    }
    Ok(())
}
