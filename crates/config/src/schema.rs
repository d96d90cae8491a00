//! Config schema types (credentials, provider API, channel selection, rate
//! limiting and retry policy).

use std::{fmt, str::FromStr};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Deployment environment. Production tightens a few validation rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" | "local" | "test" => Ok(Self::Development),
            "staging" | "stage" => Ok(Self::Staging),
            "prod" | "production" => Ok(Self::Production),
            other => Err(format!("unknown environment \"{other}\"")),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaBridgeConfig {
    pub environment: Environment,
    pub credentials: Credentials,
    pub api: ApiConfig,
    pub channel: ChannelConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    /// Legacy field or env var names that were accepted while loading.
    /// Populated by the loader; reported as warnings by the validator.
    #[serde(skip)]
    pub legacy_fields: Vec<String>,
}

/// Provider credentials. Loaded once at startup and never mutated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    #[serde(alias = "client_id")]
    pub app_id: String,
    #[serde(
        alias = "client_secret",
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub app_secret: Option<Secret<String>>,
    /// Shared secret for inbound webhook verification.
    #[serde(
        alias = "verify_token",
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub webhook_token: Option<Secret<String>>,
    /// Fixed sending bot id. When absent the bot is discovered at runtime.
    #[serde(
        alias = "bot_id",
        alias = "phone_number_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub static_bot_id: Option<String>,
}

/// Legacy credential keys and their current names.
pub const LEGACY_CREDENTIAL_KEYS: &[(&str, &str)] = &[
    ("client_id", "app_id"),
    ("client_secret", "app_secret"),
    ("verify_token", "webhook_token"),
    ("bot_id", "static_bot_id"),
    ("phone_number_id", "static_bot_id"),
];

impl Credentials {
    /// The app secret, or an empty string when unset.
    #[must_use]
    pub fn app_secret_str(&self) -> &str {
        self.app_secret
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .unwrap_or_default()
    }

    /// The webhook token, or an empty string when unset.
    #[must_use]
    pub fn webhook_token_str(&self) -> &str {
        self.webhook_token
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .unwrap_or_default()
    }

    /// Static bot id with surrounding whitespace removed, if non-empty.
    #[must_use]
    pub fn static_bot_id(&self) -> Option<&str> {
        self.static_bot_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Provider HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the provider API, e.g. `https://api.example.com/v1`.
    pub base_url: String,
    /// OAuth2 token endpoint. Defaults to `{base_url}/oauth/token`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Country calling code prepended to national phone numbers.
    pub country_code: String,
    /// Locale used for template messages when the caller gives none.
    pub default_locale: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token_url: None,
            request_timeout_ms: 15_000,
            connect_timeout_ms: 5_000,
            country_code: "55".into(),
            default_locale: "pt_BR".into(),
        }
    }
}

impl ApiConfig {
    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    /// Effective token endpoint.
    #[must_use]
    pub fn token_url(&self) -> String {
        match self.token_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => format!("{}/oauth/token", self.base_url()),
        }
    }
}

/// How the sending channel is picked when it is discovered at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelSelect {
    /// First bot in provider response order.
    #[default]
    First,
    /// Bot whose channel phone matches `value`.
    Phone,
    /// Bot whose name matches `value` (case-insensitive).
    Name,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub select: ChannelSelect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Outbound token-bucket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub capacity: u32,
    pub refill_per_second: f64,
    pub acquire_timeout_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_per_second: 5.0,
            acquire_timeout_ms: 5_000,
        }
    }
}

/// Retry/backoff policy for transient send failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total HTTP attempts per send, including the first.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

/// Serialize an `Option<Secret<String>>` by exposing its inner value.
/// Use only for round-tripping config files.
pub fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = WaBridgeConfig::default();
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.api.country_code, "55");
        assert_eq!(cfg.api.default_locale, "pt_BR");
        assert_eq!(cfg.rate_limit.capacity, 10);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.initial_delay_ms, 1_000);
    }

    #[test]
    fn token_url_derives_from_base_url() {
        let api = ApiConfig {
            base_url: "https://api.example.com/v1/".into(),
            ..Default::default()
        };
        assert_eq!(api.token_url(), "https://api.example.com/v1/oauth/token");

        let api = ApiConfig {
            token_url: Some("https://auth.example.com/token".into()),
            ..api
        };
        assert_eq!(api.token_url(), "https://auth.example.com/token");
    }

    #[test]
    fn legacy_credential_names_deserialize() {
        let cfg: WaBridgeConfig = toml::from_str(
            r#"
[credentials]
client_id = "app"
client_secret = "secret"
verify_token = "hook"
bot_id = "bot-1"
"#,
        )
        .unwrap();
        assert_eq!(cfg.credentials.app_id, "app");
        assert_eq!(cfg.credentials.app_secret_str(), "secret");
        assert_eq!(cfg.credentials.webhook_token_str(), "hook");
        assert_eq!(cfg.credentials.static_bot_id(), Some("bot-1"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let creds = Credentials {
            app_id: "app".into(),
            app_secret: Some(Secret::new("super-secret".into())),
            webhook_token: Some(Secret::new("hook-secret".into())),
            static_bot_id: None,
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("hook-secret"));
    }

    #[test]
    fn environment_parses_aliases() {
        assert_eq!(
            "PROD".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert!("moon".parse::<Environment>().is_err());
    }
}
