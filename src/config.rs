use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub web_port: u16,
    pub log_level: String,
    pub provenance_engine: String,
    pub exiftool_path: String,
    pub static_directory: String,
    pub image_directory: String,
    pub download_timeout_secs: u64,
    pub mini_timeout_secs: u64,
    pub mini_cache_ttl_secs: u64,
    pub viewer_url: String,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("APP"))
            .build()?;

        s.try_deserialize()
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn mini_timeout(&self) -> Duration {
        Duration::from_secs(self.mini_timeout_secs)
    }

    pub fn mini_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.mini_cache_ttl_secs)
    }
}

#[cfg(test)]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            web_port: 8080,
            log_level: "info".into(),
            provenance_engine: "c2pa".into(),
            exiftool_path: "exiftool".into(),
            static_directory: "./static".into(),
            image_directory: ".".into(),
            download_timeout_secs: 30,
            mini_timeout_secs: 15,
            mini_cache_ttl_secs: 300,
            viewer_url: "https://apps.thecontrarian.in/c2pa/".into(),
        }
    }
}
