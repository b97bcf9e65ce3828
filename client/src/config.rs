use std::fs::{self, File};
use std::io::ErrorKind;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use netbridge::prelude::{Headers, USER_AGENT};

use crate::{Error, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "log_level")]
    pub log_level: String,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "enable")]
    pub enable: bool,
    /// Sent with every request and handshake unless a script removes it. Empty disables it.
    #[serde(default = "user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl HttpConfig {
    pub fn default_headers(&self) -> Headers {
        let mut headers = Headers::new();
        if !self.user_agent.is_empty() {
            headers.insert(USER_AGENT, self.user_agent.as_str());
        }
        headers
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            enable: enable(),
            user_agent: user_agent(),
            accept_invalid_certs: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: log_level(),
            http: HttpConfig::default(),
        }
    }
}

fn log_level() -> String {
    "info".to_owned()
}

fn enable() -> bool {
    true
}

pub fn user_agent() -> String {
    format!("netbridge/{}", env!("CARGO_PKG_VERSION"))
}

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "netbridge", "netbridge")
}

pub fn parse_config(config: &str) -> Result<Config> {
    Ok(toml::from_str(config)?)
}

/// Reads `config.toml` from the platform config directory, creating an empty one (all defaults)
/// on first run.
pub fn load_config() -> Result<Config> {
    let dirs = project_dirs().ok_or(Error::NoConfigDirectory)?;
    let config_dir = dirs.config_dir();
    let config_file = config_dir.join("config.toml");

    let config_str = match fs::read_to_string(&config_file) {
        Ok(s) => s,
        Err(ref e) if e.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(config_dir)?;
            File::create(&config_file)?;
            log::info!("Created config file at {}", config_file.to_string_lossy());
            String::new()
        }
        Err(e) => return Err(e.into()),
    };

    parse_config(&config_str)
}
