use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::storage::cursor::DEFAULT_PAGE_SIZE;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub http_port: u16,
    /// Rows fetched per round-trip when a query is consumed lazily.
    #[serde(default = "default_query_page_size")]
    pub query_page_size: usize,
}

fn default_query_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_defaults_when_missing() {
        let config = Config::builder()
            .set_override("surrealdb_address", "mem://")
            .and_then(|b| b.set_override("surrealdb_username", "root"))
            .and_then(|b| b.set_override("surrealdb_password", "root"))
            .and_then(|b| b.set_override("surrealdb_namespace", "corpus"))
            .and_then(|b| b.set_override("surrealdb_database", "dict"))
            .and_then(|b| b.set_override("http_port", 3000))
            .expect("Failed to set overrides")
            .build()
            .expect("Failed to build config");

        let parsed: AppConfig = config.try_deserialize().expect("Failed to deserialize");
        assert_eq!(parsed.query_page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(parsed.http_port, 3000);
        assert_eq!(parsed.surrealdb_namespace, "corpus");
    }
}
