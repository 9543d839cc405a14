use std::path::PathBuf;

use crate::cancel::Cancel;
use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::User;

/// Who is logged in. The config file is the source of truth for the name;
/// the Store decides whether that user exists.
#[derive(Debug)]
pub struct Session {
    config: Config,
    path: PathBuf,
}

impl Session {
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self { config, path }
    }

    pub fn load() -> Result<Self> {
        let path = Config::config_path()?;
        let config = Config::load_from(&path)?;
        Ok(Self::new(config, path))
    }

    pub fn db_url(&self) -> &str {
        &self.config.db_url
    }

    pub fn current_user_name(&self) -> &str {
        &self.config.current_user_name
    }

    /// Persists `name` as the current user. The in-memory value only
    /// changes once the config file has been written.
    pub fn set_current_user(&mut self, name: &str) -> Result<()> {
        let mut updated = self.config.clone();
        updated.current_user_name = name.to_string();
        updated.save_to(&self.path)?;
        self.config = updated;
        Ok(())
    }

    pub async fn current_user(&self, repo: &Repository, cancel: &Cancel) -> Result<User> {
        let name = self.current_user_name();
        if name.is_empty() {
            return Err(AppError::UserNotFound(String::new()));
        }
        repo.get_user_by_name(name, cancel).await.map_err(|err| {
            if err.is_not_found() {
                AppError::UserNotFound(name.to_string())
            } else {
                err.into()
            }
        })
    }
}
