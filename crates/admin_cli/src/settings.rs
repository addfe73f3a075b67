//! Handles settings for the admin tool.
//!
//! Sources, lowest priority first: built-in defaults, an optional
//! `budget.toml` (or the file passed with `--config`), then `BUDGET_`
//! environment variables such as `BUDGET_DATABASE__URL`. Command-line flags
//! are applied on top by the caller.
use std::path::Path;

use config::{
    Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState,
};
use serde::Deserialize;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:./budget.db?mode=rwc";

#[derive(Debug, Deserialize)]
pub struct Log {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub url: String,
    pub max_connections: Option<u32>,
}

impl Database {
    /// SQLite serializes writers, so it gets a single connection unless told
    /// otherwise.
    pub fn max_connections(&self) -> u32 {
        self.max_connections
            .unwrap_or(if self.url.starts_with("sqlite:") { 1 } else { 10 })
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub log: Log,
    pub database: Database,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("budget").required(false),
        };

        defaults()?
            .add_source(file)
            .add_source(
                Environment::with_prefix("BUDGET")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("log.level", "info")?
        .set_default("database.url", DEFAULT_DATABASE_URL)
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn from_toml(raw: &str) -> Settings {
        defaults()
            .unwrap()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn defaults_point_at_local_sqlite() {
        let settings = from_toml("");
        assert_eq!(settings.log.level, "info");
        assert_eq!(settings.database.url, DEFAULT_DATABASE_URL);
        assert_eq!(settings.database.max_connections(), 1);
    }

    #[test]
    fn file_values_override_defaults() {
        let settings = from_toml(
            r#"
            [log]
            level = "debug"

            [database]
            url = "postgres://budget@localhost/budget"
            "#,
        );
        assert_eq!(settings.log.level, "debug");
        assert_eq!(settings.database.max_connections(), 10);
    }

    #[test]
    fn explicit_pool_size_wins() {
        let settings = from_toml(
            r#"
            [database]
            url = "sqlite::memory:"
            max_connections = 4
            "#,
        );
        assert_eq!(settings.database.max_connections(), 4);
    }
}
