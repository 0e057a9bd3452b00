use std::{env, net::SocketAddr};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://todo.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid bind address {value:?}: {source}")]
    BindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
}

impl Config {
    /// Reads `DATABASE_URL` and `BIND_ADDR`, after loading a `.env` file if
    /// one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_values(env::var("DATABASE_URL").ok(), env::var("BIND_ADDR").ok())
    }

    pub fn from_values(
        database_url: Option<String>,
        bind_addr: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind_addr = bind_addr.unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned());
        Ok(Self {
            database_url: database_url.unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned()),
            bind_addr: bind_addr
                .parse()
                .map_err(|source| ConfigError::BindAddr {
                    value: bind_addr.clone(),
                    source,
                })?,
        })
    }
}
