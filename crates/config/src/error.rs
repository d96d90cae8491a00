use std::path::PathBuf;

/// Crate-wide result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML/YAML/JSON or does not match the schema.
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The file extension is not one of the supported formats.
    #[error("unsupported config format: .{0}")]
    UnsupportedFormat(String),

    /// Validation found one or more errors. `summary` lists every error.
    #[error("invalid configuration ({count} error(s)): {summary}")]
    Invalid { count: usize, summary: String },
}

impl ConfigError {
    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
