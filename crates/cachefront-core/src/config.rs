//! `config.json` model and loader. Loaded once at startup; an unreadable
//! or incomplete file is fatal.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub db: DbConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    /// `host` or `host:port`.
    pub host: String,
    pub user: String,
    /// May be empty.
    #[serde(default)]
    pub password: String,
    pub dbname: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        let config: Config = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Config(format!("parse {}: {e}", path.display())))?;
        config.db.validate()?;
        Ok(config)
    }
}

impl DbConfig {
    fn validate(&self) -> Result<()> {
        if self.host.is_empty() || self.user.is_empty() || self.dbname.is_empty() {
            return Err(Error::Config(format!(
                "db configuration is incomplete: host={}, user={}, dbname={}",
                self.host, self.user, self.dbname
            )));
        }
        Ok(())
    }
}
