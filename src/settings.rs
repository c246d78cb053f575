//! Runtime configuration.
//!
//! Values come from an optional `escalas.toml` in the working directory,
//! then `ESCALAS_*` environment variables. `DATABASE_URL` is honored when
//! `ESCALAS_DATABASE_URL` is not set.

use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .set_default("max_connections", 5)?
            .set_default("log_level", "info")?
            .add_source(File::with_name("escalas").required(false))
            .add_source(Environment::with_prefix("ESCALAS"));

        if let Ok(url) = std::env::var("DATABASE_URL") {
            builder = builder.set_default("database_url", url)?;
        }

        builder
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL (or ESCALAS_DATABASE_URL) must be set to a Postgres instance")
    }
}
