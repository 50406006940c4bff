//! Configuration loaded from `config.toml`

pub mod config;

pub use config::{CacheConfig, Config, NegotiationConfig, OpenIdConfig, UmaConfig, CONFIG_DIR_ENV};
