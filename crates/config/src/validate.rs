//! Configuration validation.
//!
//! Checks presence and shape of the provider credentials, flags legacy field
//! names, and maps the outcome to a tri-state health for observability.

use std::path::{Path, PathBuf};

use {serde::Serialize, tracing::warn, url::Url};

use crate::{
    env_subst::{substitute_env, unresolved_placeholders},
    error::{ConfigError, Result},
    loader::{detect_legacy_fields, find_config_file, parse_config},
    schema::{ChannelSelect, LEGACY_CREDENTIAL_KEYS, WaBridgeConfig},
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "missing", "shape", "legacy", "unknown-field",
    /// "security", "placeholder"
    pub category: &'static str,
    /// Dotted path, e.g. "credentials.app_secret"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Outcome of validating a configuration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
}

impl ValidationReport {
    fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) = diagnostics
            .into_iter()
            .partition(|d| d.severity == Severity::Error);
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
            config_path: None,
        }
    }

    /// Tri-state health derived from this report.
    #[must_use]
    pub fn status(&self) -> ConfigStatus {
        if !self.errors.is_empty() {
            ConfigStatus::Unhealthy
        } else if !self.warnings.is_empty() {
            ConfigStatus::Degraded
        } else {
            ConfigStatus::Healthy
        }
    }

    /// Find a diagnostic (error or warning) by dotted path.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<&Diagnostic> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .find(|d| d.path == path)
    }
}

/// Configuration health for observability export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ConfigStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates a loaded [`WaBridgeConfig`].
pub struct ConfigValidator<'a> {
    config: &'a WaBridgeConfig,
}

impl<'a> ConfigValidator<'a> {
    #[must_use]
    pub fn new(config: &'a WaBridgeConfig) -> Self {
        Self { config }
    }

    /// Run every check and return errors and warnings.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut diagnostics = Vec::new();
        check_credentials(self.config, &mut diagnostics);
        check_api(self.config, &mut diagnostics);
        check_channel(self.config, &mut diagnostics);
        check_limits(self.config, &mut diagnostics);
        check_legacy(self.config, &mut diagnostics);
        ValidationReport::from_diagnostics(diagnostics)
    }

    /// Fail fast with every error aggregated into one message.
    ///
    /// Warnings are logged but do not fail.
    pub fn require_valid(&self) -> Result<()> {
        let report = self.validate();
        for w in &report.warnings {
            warn!(path = %w.path, category = w.category, "{}", w.message);
        }
        if report.valid {
            return Ok(());
        }
        let summary = report
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(ConfigError::Invalid {
            count: report.errors.len(),
            summary,
        })
    }

    /// Tri-state health of the configuration.
    #[must_use]
    pub fn config_status(&self) -> ConfigStatus {
        self.validate().status()
    }
}

// ── Checks ──────────────────────────────────────────────────────────────────

fn error(category: &'static str, path: &str, message: impl Into<String>) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        category,
        path: path.into(),
        message: message.into(),
    }
}

fn warning(category: &'static str, path: &str, message: impl Into<String>) -> Diagnostic {
    Diagnostic {
        severity: Severity::Warning,
        category,
        path: path.into(),
        message: message.into(),
    }
}

fn check_required(path: &str, value: &str, diagnostics: &mut Vec<Diagnostic>) -> bool {
    if value.trim().is_empty() {
        diagnostics.push(error("missing", path, "required value is missing or empty"));
        return false;
    }
    let unresolved = unresolved_placeholders(value);
    if !unresolved.is_empty() {
        diagnostics.push(error(
            "placeholder",
            path,
            format!("unresolved environment variable(s): {}", unresolved.join(", ")),
        ));
        return false;
    }
    if value.trim() != value {
        diagnostics.push(warning(
            "shape",
            path,
            "value has leading or trailing whitespace",
        ));
    }
    true
}

fn check_credentials(config: &WaBridgeConfig, diagnostics: &mut Vec<Diagnostic>) {
    let creds = &config.credentials;

    if check_required("credentials.app_id", &creds.app_id, diagnostics)
        && creds.app_id.trim().contains(char::is_whitespace)
    {
        diagnostics.push(error(
            "shape",
            "credentials.app_id",
            "app id must not contain whitespace",
        ));
    }

    check_required("credentials.app_secret", creds.app_secret_str(), diagnostics);

    let webhook_token = creds.webhook_token_str();
    if check_required("credentials.webhook_token", webhook_token, diagnostics)
        && webhook_token.trim().chars().count() < 16
    {
        diagnostics.push(warning(
            "security",
            "credentials.webhook_token",
            "webhook token is shorter than 16 characters",
        ));
    }

    match creds.static_bot_id() {
        Some(id) if !unresolved_placeholders(id).is_empty() => {
            diagnostics.push(error(
                "placeholder",
                "credentials.static_bot_id",
                "static bot id contains an unresolved environment variable",
            ));
        },
        Some(_) => {},
        None if config.environment.is_production() => {
            diagnostics.push(error(
                "missing",
                "credentials.static_bot_id",
                "static bot id is required in production",
            ));
        },
        None => {
            diagnostics.push(warning(
                "missing",
                "credentials.static_bot_id",
                "static bot id not set; the sending bot will be discovered at runtime",
            ));
        },
    }
}

fn check_url(path: &str, value: &str, diagnostics: &mut Vec<Diagnostic>) -> Option<Url> {
    match Url::parse(value.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        Ok(url) => {
            diagnostics.push(error(
                "shape",
                path,
                format!("unsupported URL scheme \"{}\"", url.scheme()),
            ));
            None
        },
        Err(e) => {
            diagnostics.push(error("shape", path, format!("invalid URL: {e}")));
            None
        },
    }
}

fn check_api(config: &WaBridgeConfig, diagnostics: &mut Vec<Diagnostic>) {
    let api = &config.api;

    if check_required("api.base_url", &api.base_url, diagnostics)
        && let Some(url) = check_url("api.base_url", &api.base_url, diagnostics)
        && url.scheme() == "http"
        && config.environment.is_production()
    {
        diagnostics.push(warning(
            "security",
            "api.base_url",
            "provider API is reached over plain http in production",
        ));
    }

    if let Some(token_url) = api.token_url.as_deref().filter(|u| !u.trim().is_empty()) {
        check_url("api.token_url", token_url, diagnostics);
    }

    let cc = api.country_code.trim();
    if cc.is_empty() || cc.len() > 3 || !cc.chars().all(|c| c.is_ascii_digit()) {
        diagnostics.push(error(
            "shape",
            "api.country_code",
            "country code must be 1 to 3 digits",
        ));
    }

    if api.request_timeout_ms == 0 {
        diagnostics.push(error(
            "shape",
            "api.request_timeout_ms",
            "request timeout must be greater than 0",
        ));
    }
}

fn check_channel(config: &WaBridgeConfig, diagnostics: &mut Vec<Diagnostic>) {
    let channel = &config.channel;
    let has_value = channel
        .value
        .as_deref()
        .is_some_and(|v| !v.trim().is_empty());
    match channel.select {
        ChannelSelect::First => {},
        ChannelSelect::Phone | ChannelSelect::Name if !has_value => {
            diagnostics.push(error(
                "missing",
                "channel.value",
                "channel selection by phone or name requires a value",
            ));
        },
        ChannelSelect::Phone | ChannelSelect::Name => {},
    }
    if config.credentials.static_bot_id().is_some() && channel.select != ChannelSelect::First {
        diagnostics.push(warning(
            "shape",
            "channel.select",
            "channel selector is ignored because a static bot id is configured",
        ));
    }
}

fn check_limits(config: &WaBridgeConfig, diagnostics: &mut Vec<Diagnostic>) {
    let rl = &config.rate_limit;
    if rl.capacity == 0 {
        diagnostics.push(error(
            "shape",
            "rate_limit.capacity",
            "capacity must be at least 1",
        ));
    }
    if !(rl.refill_per_second.is_finite() && rl.refill_per_second > 0.0) {
        diagnostics.push(error(
            "shape",
            "rate_limit.refill_per_second",
            "refill rate must be a positive number",
        ));
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        diagnostics.push(error(
            "shape",
            "retry.max_attempts",
            "max attempts must be at least 1",
        ));
    }
    if !(retry.multiplier.is_finite() && retry.multiplier >= 1.0) {
        diagnostics.push(error(
            "shape",
            "retry.multiplier",
            "backoff multiplier must be >= 1.0",
        ));
    }
    if retry.max_delay_ms < retry.initial_delay_ms {
        diagnostics.push(warning(
            "shape",
            "retry.max_delay_ms",
            "max delay is lower than the initial delay; every retry uses max delay",
        ));
    }
}

fn check_legacy(config: &WaBridgeConfig, diagnostics: &mut Vec<Diagnostic>) {
    for field in &config.legacy_fields {
        let replacement = field
            .strip_prefix("credentials.")
            .and_then(|key| {
                LEGACY_CREDENTIAL_KEYS
                    .iter()
                    .find(|(legacy, _)| *legacy == key)
                    .map(|(_, current)| format!("credentials.{current}"))
            })
            .or_else(|| {
                field
                    .strip_prefix("env:WHATSAPP_")
                    .map(|rest| format!("WABRIDGE_{}", legacy_env_replacement(rest)))
            })
            .unwrap_or_default();
        diagnostics.push(warning(
            "legacy",
            field,
            format!("legacy name in use; rename to {replacement}"),
        ));
    }
}

fn legacy_env_replacement(suffix: &str) -> &str {
    match suffix {
        "CLIENT_ID" => "APP_ID",
        "CLIENT_SECRET" => "APP_SECRET",
        "VERIFY_TOKEN" => "WEBHOOK_TOKEN",
        "BOT_ID" => "STATIC_BOT_ID",
        other => other,
    }
}

// ── Raw document validation ─────────────────────────────────────────────────

/// Known top-level sections and their keys.
const KNOWN_SECTIONS: &[(&str, &[&str])] = &[
    ("credentials", &[
        "app_id",
        "app_secret",
        "webhook_token",
        "static_bot_id",
    ]),
    ("api", &[
        "base_url",
        "token_url",
        "request_timeout_ms",
        "connect_timeout_ms",
        "country_code",
        "default_locale",
    ]),
    ("channel", &["select", "value"]),
    ("rate_limit", &[
        "capacity",
        "refill_per_second",
        "acquire_timeout_ms",
    ]),
    ("retry", &[
        "max_attempts",
        "initial_delay_ms",
        "multiplier",
        "max_delay_ms",
    ]),
];

const KNOWN_SCALARS: &[&str] = &["environment"];

/// Validate a TOML document: syntax, unknown fields, schema, then semantics.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationReport {
    let mut diagnostics = Vec::new();

    let value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(error("syntax", "", format!("TOML syntax error: {e}")));
            return ValidationReport::from_diagnostics(diagnostics);
        },
    };

    check_unknown_fields(&value, &mut diagnostics);

    let mut config: WaBridgeConfig = match toml::from_str(toml_str) {
        Ok(c) => c,
        Err(e) => {
            diagnostics.push(error("type-error", "", format!("type error: {e}")));
            return ValidationReport::from_diagnostics(diagnostics);
        },
    };
    if let Ok(json) = serde_json::to_value(&value) {
        config.legacy_fields = detect_legacy_fields(&json);
    }

    let semantic = ConfigValidator::new(&config).validate();
    diagnostics.extend(semantic.errors);
    diagnostics.extend(semantic.warnings);
    ValidationReport::from_diagnostics(diagnostics)
}

/// Validate a config file at `path`, or the discovered default location.
///
/// `${ENV}` placeholders are expanded first. Env overrides are applied so the
/// report reflects what the process would actually run with.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationReport {
    let config_path = path.map(Path::to_path_buf).or_else(find_config_file);

    let mut config = match config_path.as_deref() {
        None => WaBridgeConfig::default(),
        Some(p) => match std::fs::read_to_string(p) {
            Ok(raw) => {
                let raw = substitute_env(&raw);
                let is_toml = p.extension().is_none_or(|e| e == "toml");
                let mut unknown = Vec::new();
                if is_toml && let Ok(value) = toml::from_str::<toml::Value>(&raw) {
                    check_unknown_fields(&value, &mut unknown);
                }
                match parse_config(&raw, p) {
                    Ok(cfg) => {
                        let mut report = validate_with_env(cfg);
                        report.warnings.extend(
                            unknown
                                .iter()
                                .filter(|d| d.severity == Severity::Warning)
                                .cloned(),
                        );
                        report.config_path = Some(p.to_path_buf());
                        return report;
                    },
                    Err(e) => {
                        let mut report = ValidationReport::from_diagnostics(vec![error(
                            "syntax",
                            "",
                            e.to_string(),
                        )]);
                        report.config_path = Some(p.to_path_buf());
                        return report;
                    },
                }
            },
            Err(e) => {
                let mut report = ValidationReport::from_diagnostics(vec![error(
                    "syntax",
                    "",
                    format!("failed to read config file: {e}"),
                )]);
                report.config_path = Some(p.to_path_buf());
                return report;
            },
        },
    };

    crate::loader::apply_env_overrides(&mut config);
    ConfigValidator::new(&config).validate()
}

fn validate_with_env(mut config: WaBridgeConfig) -> ValidationReport {
    crate::loader::apply_env_overrides(&mut config);
    ConfigValidator::new(&config).validate()
}

fn check_unknown_fields(value: &toml::Value, diagnostics: &mut Vec<Diagnostic>) {
    let Some(table) = value.as_table() else {
        return;
    };
    let section_names: Vec<&str> = KNOWN_SECTIONS
        .iter()
        .map(|(name, _)| *name)
        .chain(KNOWN_SCALARS.iter().copied())
        .collect();

    for (key, child) in table {
        if KNOWN_SCALARS.contains(&key.as_str()) {
            continue;
        }
        let Some((_, keys)) = KNOWN_SECTIONS.iter().find(|(name, _)| *name == key) else {
            diagnostics.push(warning(
                "unknown-field",
                key,
                unknown_message(key, &section_names, "unknown section"),
            ));
            continue;
        };
        let Some(child) = child.as_table() else {
            continue;
        };
        for sub in child.keys() {
            let legacy = key == "credentials"
                && LEGACY_CREDENTIAL_KEYS.iter().any(|(l, _)| *l == sub);
            if legacy || keys.contains(&sub.as_str()) {
                continue;
            }
            diagnostics.push(warning(
                "unknown-field",
                &format!("{key}.{sub}"),
                unknown_message(sub, keys, "unknown field"),
            ));
        }
    }
}

fn unknown_message(key: &str, candidates: &[&str], what: &str) -> String {
    match suggest(key, candidates, 3) {
        Some(s) => format!("{what} (did you mean \"{s}\"?)"),
        None => what.to_string(),
    }
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::schema::Environment, rstest::rstest, secrecy::Secret};

    fn valid_config() -> WaBridgeConfig {
        let mut cfg = WaBridgeConfig::default();
        cfg.credentials.app_id = "app-123".into();
        cfg.credentials.app_secret = Some(Secret::new("secret-value".into()));
        cfg.credentials.webhook_token = Some(Secret::new("webhook-token-0123456789".into()));
        cfg.credentials.static_bot_id = Some("bot-1".into());
        cfg.api.base_url = "https://api.example.com/v1".into();
        cfg
    }

    #[test]
    fn complete_config_is_healthy() {
        let cfg = valid_config();
        let report = ConfigValidator::new(&cfg).validate();
        assert!(report.valid, "unexpected: {:?}", report.errors);
        assert!(report.warnings.is_empty(), "unexpected: {:?}", report.warnings);
        assert_eq!(report.status(), ConfigStatus::Healthy);
    }

    #[test]
    fn empty_app_secret_is_specific_error() {
        let mut cfg = valid_config();
        cfg.credentials.app_secret = Some(Secret::new(String::new()));
        let report = ConfigValidator::new(&cfg).validate();
        assert!(!report.valid);
        let d = report.find("credentials.app_secret").expect("app_secret error");
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.category, "missing");
    }

    #[rstest]
    #[case(Environment::Production, Severity::Error, ConfigStatus::Unhealthy)]
    #[case(Environment::Staging, Severity::Warning, ConfigStatus::Degraded)]
    #[case(Environment::Development, Severity::Warning, ConfigStatus::Degraded)]
    fn missing_static_bot_id_depends_on_environment(
        #[case] env: Environment,
        #[case] severity: Severity,
        #[case] status: ConfigStatus,
    ) {
        let mut cfg = valid_config();
        cfg.environment = env;
        cfg.credentials.static_bot_id = None;
        let validator = ConfigValidator::new(&cfg);
        let report = validator.validate();
        let d = report.find("credentials.static_bot_id").unwrap();
        assert_eq!(d.severity, severity);
        assert_eq!(validator.config_status(), status);
    }

    #[test]
    fn legacy_fields_warn_but_stay_valid() {
        let mut cfg = valid_config();
        cfg.legacy_fields = vec![
            "credentials.client_id".into(),
            "env:WHATSAPP_VERIFY_TOKEN".into(),
        ];
        let report = ConfigValidator::new(&cfg).validate();
        assert!(report.valid);
        let d = report.find("credentials.client_id").unwrap();
        assert_eq!(d.category, "legacy");
        assert!(d.message.contains("credentials.app_id"));
        let d = report.find("env:WHATSAPP_VERIFY_TOKEN").unwrap();
        assert!(d.message.contains("WABRIDGE_WEBHOOK_TOKEN"));
        assert_eq!(report.status(), ConfigStatus::Degraded);
    }

    #[test]
    fn require_valid_aggregates_every_error() {
        let cfg = WaBridgeConfig::default();
        let err = ConfigValidator::new(&cfg).require_valid().unwrap_err();
        let ConfigError::Invalid { count, summary } = err else {
            panic!("expected Invalid");
        };
        assert!(count >= 4);
        for path in [
            "credentials.app_id",
            "credentials.app_secret",
            "credentials.webhook_token",
            "api.base_url",
        ] {
            assert!(summary.contains(path), "missing {path} in {summary}");
        }
    }

    #[test]
    fn require_valid_passes_with_warnings_only() {
        let mut cfg = valid_config();
        cfg.credentials.static_bot_id = None;
        assert!(ConfigValidator::new(&cfg).require_valid().is_ok());
    }

    #[test]
    fn unresolved_placeholder_is_error() {
        let mut cfg = valid_config();
        cfg.credentials.app_secret = Some(Secret::new("${WABRIDGE_APP_SECRET}".into()));
        let report = ConfigValidator::new(&cfg).validate();
        let d = report.find("credentials.app_secret").unwrap();
        assert_eq!(d.category, "placeholder");
        assert!(d.message.contains("WABRIDGE_APP_SECRET"));
    }

    #[rstest]
    #[case("not a url")]
    #[case("ftp://files.example.com")]
    fn bad_base_url_is_error(#[case] base_url: &str) {
        let mut cfg = valid_config();
        cfg.api.base_url = base_url.into();
        let report = ConfigValidator::new(&cfg).validate();
        assert_eq!(
            report.find("api.base_url").map(|d| d.severity),
            Some(Severity::Error)
        );
    }

    #[test]
    fn shape_errors_for_limits() {
        let mut cfg = valid_config();
        cfg.rate_limit.capacity = 0;
        cfg.rate_limit.refill_per_second = 0.0;
        cfg.retry.max_attempts = 0;
        cfg.retry.multiplier = 0.5;
        cfg.api.country_code = "+55".into();
        let report = ConfigValidator::new(&cfg).validate();
        for path in [
            "rate_limit.capacity",
            "rate_limit.refill_per_second",
            "retry.max_attempts",
            "retry.multiplier",
            "api.country_code",
        ] {
            assert_eq!(
                report.find(path).map(|d| d.severity),
                Some(Severity::Error),
                "{path}"
            );
        }
    }

    #[test]
    fn channel_selector_requires_value() {
        let mut cfg = valid_config();
        cfg.credentials.static_bot_id = None;
        cfg.channel.select = ChannelSelect::Phone;
        let report = ConfigValidator::new(&cfg).validate();
        assert_eq!(
            report.find("channel.value").map(|d| d.severity),
            Some(Severity::Error)
        );
    }

    #[test]
    fn short_webhook_token_warns() {
        let mut cfg = valid_config();
        cfg.credentials.webhook_token = Some(Secret::new("short".into()));
        let report = ConfigValidator::new(&cfg).validate();
        assert!(report.valid);
        assert_eq!(
            report.find("credentials.webhook_token").map(|d| d.category),
            Some("security")
        );
    }

    #[test]
    fn toml_syntax_error_reported() {
        let report = validate_toml_str("[credentials\napp_id = ");
        assert!(!report.valid);
        assert_eq!(report.errors[0].category, "syntax");
    }

    #[test]
    fn toml_unknown_fields_suggest_fix() {
        let report = validate_toml_str(
            r#"
[credentials]
app_id = "a"
app_secert = "oops"

[retyr]
max_attempts = 2
"#,
        );
        let d = report.find("credentials.app_secert").unwrap();
        assert!(d.message.contains("app_secret"), "{}", d.message);
        let d = report.find("retyr").unwrap();
        assert!(d.message.contains("retry"), "{}", d.message);
    }

    #[test]
    fn toml_legacy_keys_flagged() {
        let report = validate_toml_str(
            r#"
[credentials]
client_id = "app"
client_secret = "secret"
webhook_token = "webhook-token-0123456789"
static_bot_id = "bot"

[api]
base_url = "https://api.example.com"
"#,
        );
        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(
            report.find("credentials.client_secret").map(|d| d.category),
            Some("legacy")
        );
        assert_eq!(report.status(), ConfigStatus::Degraded);
    }

    #[test]
    fn validate_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wabridge.toml");
        std::fs::write(&path, "environment = \"production\"\n").unwrap();
        let report = validate(Some(&path));
        assert_eq!(report.config_path.as_deref(), Some(path.as_path()));
        assert!(!report.valid);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ConfigStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }
}
