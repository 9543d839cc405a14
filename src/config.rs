use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const CONFIG_FILE_NAME: &str = ".gatorconfig.toml";
const CONFIG_PATH_ENV: &str = "GATOR_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_url")]
    pub db_url: String,

    #[serde(default)]
    pub current_user_name: String,
}

fn default_db_url() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gator")
        .join("gator.db")
        .to_string_lossy()
        .to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: default_db_url(),
            current_user_name: String::new(),
        }
    }
}

impl Config {
    /// Reads the config at `path`, writing the defaults there first if the
    /// file does not exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            tracing::info!("Created default config file at {}", path.display());
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        let mut file = std::fs::File::create(path)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// `$GATOR_CONFIG` if set, else `~/.gatorconfig.toml`.
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }
        dirs::home_dir()
            .map(|home| home.join(CONFIG_FILE_NAME))
            .ok_or_else(|| AppError::Config("could not find home directory".to_string()))
    }
}
