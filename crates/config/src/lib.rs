//! Configuration loading and validation for the WhatsApp Business client.
//!
//! Config files: `wabridge.toml`, `wabridge.yaml` or `wabridge.json`.
//! Searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` (and `${ENV_VAR:-default}`) substitution in all
//! string values and `WABRIDGE_*` environment overrides.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{ConfigError, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{
        ApiConfig, ChannelConfig, ChannelSelect, Credentials, Environment, RateLimitConfig,
        RetryConfig, WaBridgeConfig,
    },
    validate::{ConfigStatus, ConfigValidator, Diagnostic, Severity, ValidationReport},
};
