use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{ConfigError, Result},
    schema::{LEGACY_CREDENTIAL_KEYS, WaBridgeConfig},
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "wabridge.toml",
    "wabridge.yaml",
    "wabridge.yml",
    "wabridge.json",
];

/// Credential overrides as `(current, legacy)` variable names. The legacy
/// name is only consulted when the current one is unset.
const ENV_APP_ID: (&str, &str) = ("WABRIDGE_APP_ID", "WHATSAPP_CLIENT_ID");
const ENV_APP_SECRET: (&str, &str) = ("WABRIDGE_APP_SECRET", "WHATSAPP_CLIENT_SECRET");
const ENV_WEBHOOK_TOKEN: (&str, &str) = ("WABRIDGE_WEBHOOK_TOKEN", "WHATSAPP_VERIFY_TOKEN");
const ENV_STATIC_BOT_ID: (&str, &str) = ("WABRIDGE_STATIC_BOT_ID", "WHATSAPP_BOT_ID");
const ENV_BASE_URL: &str = "WABRIDGE_BASE_URL";
const ENV_ENVIRONMENT: &str = "WABRIDGE_ENVIRONMENT";

/// Load config from the given path (any supported format).
///
/// `${ENV}` placeholders are expanded before parsing. Environment overrides
/// are not applied here; see [`apply_env_overrides`].
pub fn load_config(path: &Path) -> Result<WaBridgeConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply env overrides.
///
/// Search order:
/// 1. `./wabridge.{toml,yaml,yml,json}` (project-local)
/// 2. `<user config dir>/wabridge.{toml,yaml,yml,json}`
///
/// Falls back to defaults plus env overrides when no file exists. A file that
/// exists but fails to parse is an error.
pub fn discover_and_load() -> Result<WaBridgeConfig> {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path)?
        },
        None => {
            debug!("no config file found, using defaults");
            WaBridgeConfig::default()
        },
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Find the first config file in standard locations.
pub(crate) fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (e.g. `~/.config/wabridge/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "wabridge").map(|d| d.config_dir().to_path_buf())
}

/// Apply `WABRIDGE_*` environment overrides to `config`.
pub fn apply_env_overrides(config: &mut WaBridgeConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

/// Apply environment overrides using a custom lookup function.
///
/// Separate from [`apply_env_overrides`] so it can be tested without mutating
/// the process environment.
pub fn apply_env_overrides_with(
    config: &mut WaBridgeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let mut legacy_seen = Vec::new();
    let mut pick = |(current, legacy): (&str, &'static str)| -> Option<String> {
        if let Some(v) = lookup(current) {
            return Some(v);
        }
        let v = lookup(legacy)?;
        warn!(
            legacy,
            replacement = current,
            "legacy environment variable in use"
        );
        legacy_seen.push(format!("env:{legacy}"));
        Some(v)
    };

    if let Some(v) = pick(ENV_APP_ID) {
        config.credentials.app_id = v;
    }
    if let Some(v) = pick(ENV_APP_SECRET) {
        config.credentials.app_secret = Some(Secret::new(v));
    }
    if let Some(v) = pick(ENV_WEBHOOK_TOKEN) {
        config.credentials.webhook_token = Some(Secret::new(v));
    }
    if let Some(v) = pick(ENV_STATIC_BOT_ID) {
        config.credentials.static_bot_id = Some(v);
    }
    config.legacy_fields.extend(legacy_seen);

    if let Some(v) = lookup(ENV_BASE_URL) {
        config.api.base_url = v;
    }
    if let Some(v) = lookup(ENV_ENVIRONMENT) {
        match v.parse() {
            Ok(env) => config.environment = env,
            Err(e) => warn!(variable = ENV_ENVIRONMENT, error = %e, "ignoring override"),
        }
    }
}

/// Parse a config document, picking the format from the file extension.
pub(crate) fn parse_config(raw: &str, path: &Path) -> Result<WaBridgeConfig> {
    let value = parse_config_value(raw, path)?;
    let legacy = detect_legacy_fields(&value);
    let mut config: WaBridgeConfig =
        serde_json::from_value(value).map_err(|e| ConfigError::parse(path, e))?;
    for field in &legacy {
        warn!(path = %path.display(), field, "legacy config field in use");
    }
    config.legacy_fields = legacy;
    Ok(config)
}

fn parse_config_value(raw: &str, path: &Path) -> Result<serde_json::Value> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => {
            let v: toml::Value = toml::from_str(raw).map_err(|e| ConfigError::parse(path, e))?;
            serde_json::to_value(v).map_err(|e| ConfigError::parse(path, e))
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value =
                serde_yaml::from_str(raw).map_err(|e| ConfigError::parse(path, e))?;
            serde_json::to_value(v).map_err(|e| ConfigError::parse(path, e))
        },
        "json" => serde_json::from_str(raw).map_err(|e| ConfigError::parse(path, e)),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Dotted paths of legacy credential keys present in a parsed document.
pub(crate) fn detect_legacy_fields(value: &serde_json::Value) -> Vec<String> {
    let Some(credentials) = value.get("credentials").and_then(|v| v.as_object()) else {
        return Vec::new();
    };
    LEGACY_CREDENTIAL_KEYS
        .iter()
        .filter(|(legacy, _)| credentials.contains_key(*legacy))
        .map(|(legacy, _)| format!("credentials.{legacy}"))
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::schema::Environment};

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wabridge.toml");
        std::fs::write(
            &path,
            r#"
environment = "production"

[credentials]
app_id = "app-1"
app_secret = "secret"
webhook_token = "hook-token-0123456789"
static_bot_id = "bot-9"

[api]
base_url = "https://api.example.com/v1"
"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.environment, Environment::Production);
        assert_eq!(cfg.credentials.app_id, "app-1");
        assert_eq!(cfg.credentials.static_bot_id(), Some("bot-9"));
        assert!(cfg.legacy_fields.is_empty());
    }

    #[test]
    fn loads_yaml_and_records_legacy_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wabridge.yaml");
        std::fs::write(
            &path,
            "credentials:\n  client_id: app\n  client_secret: s\n  verify_token: t\n",
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.credentials.app_id, "app");
        assert_eq!(cfg.legacy_fields, vec![
            "credentials.client_id".to_string(),
            "credentials.client_secret".to_string(),
            "credentials.verify_token".to_string(),
        ]);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wabridge.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "ini"
        ));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wabridge.toml");
        std::fs::write(&path, "[credentials\napp_id = 1").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut cfg = WaBridgeConfig::default();
        cfg.credentials.app_id = "from-file".into();
        apply_env_overrides_with(&mut cfg, |name| match name {
            "WABRIDGE_APP_ID" => Some("from-env".into()),
            "WABRIDGE_APP_SECRET" => Some("env-secret".into()),
            "WABRIDGE_ENVIRONMENT" => Some("production".into()),
            _ => None,
        });
        assert_eq!(cfg.credentials.app_id, "from-env");
        assert_eq!(cfg.credentials.app_secret_str(), "env-secret");
        assert_eq!(cfg.environment, Environment::Production);
        assert!(cfg.legacy_fields.is_empty());
    }

    #[test]
    fn legacy_env_vars_are_used_and_recorded() {
        let mut cfg = WaBridgeConfig::default();
        apply_env_overrides_with(&mut cfg, |name| match name {
            "WHATSAPP_CLIENT_ID" => Some("legacy-app".into()),
            "WHATSAPP_BOT_ID" => Some("legacy-bot".into()),
            _ => None,
        });
        assert_eq!(cfg.credentials.app_id, "legacy-app");
        assert_eq!(cfg.credentials.static_bot_id(), Some("legacy-bot"));
        assert_eq!(cfg.legacy_fields, vec![
            "env:WHATSAPP_CLIENT_ID".to_string(),
            "env:WHATSAPP_BOT_ID".to_string(),
        ]);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut cfg = WaBridgeConfig::default();
        cfg.credentials.app_id = "keep".into();
        apply_env_overrides_with(&mut cfg, |name| {
            (name == "WABRIDGE_APP_ID").then(|| "   ".to_string())
        });
        assert_eq!(cfg.credentials.app_id, "keep");
    }
}
