//! OAuth2 client-credentials token lifecycle.

use std::{sync::Arc, time::Duration};

use {
    futures::{
        FutureExt,
        future::{BoxFuture, Shared},
    },
    secrecy::{ExposeSecret, Secret},
    serde_json::{Value, json},
    tokio::{sync::Mutex, time::Instant},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use wabridge_metrics::{counter, token as token_metrics};

use crate::{
    error::{Error, Result},
    retry::is_retryable_status,
    transport::{ApiRequest, HttpTransport, TransportError},
};

/// A cached token is treated as expired this long before the provider says.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// Lifetime assumed when the token response has no `expires_in`.
pub const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(3600);
/// Longest lifetime a provider-reported `expires_in` is trusted for.
pub const MAX_EXPIRES_IN: Duration = Duration::from_secs(24 * 3600);

/// Bearer token with the provider-reported expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    value: Secret<String>,
    expires_at: Instant,
}

impl AccessToken {
    /// `expires_in` is capped at [`MAX_EXPIRES_IN`].
    #[must_use]
    pub fn new(value: Secret<String>, expires_in: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(expires_in.min(MAX_EXPIRES_IN))
            .unwrap_or(now);
        Self { value, expires_at }
    }

    #[must_use]
    pub fn value(&self) -> &Secret<String> {
        &self.value
    }

    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Usable while `now < expires_at - EXPIRY_MARGIN`.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<AccessToken>>>;

#[derive(Default)]
struct TokenState {
    current: Option<AccessToken>,
    inflight: Option<RefreshFuture>,
}

struct Inner {
    transport: Arc<dyn HttpTransport>,
    token_url: String,
    app_id: String,
    app_secret: Secret<String>,
    state: Mutex<TokenState>,
}

/// Obtains and caches the provider access token.
///
/// Concurrent callers that find the cache stale share one in-flight refresh
/// and all see its result, including a failure. Cheap to clone.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("token_url", &self.inner.token_url)
            .field("app_id", &self.inner.app_id)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        token_url: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: Secret<String>,
    ) -> Result<Self> {
        let token_url = token_url.into();
        let app_id = app_id.into();
        if token_url.trim().is_empty() {
            return Err(Error::configuration("token URL is not configured"));
        }
        if app_id.trim().is_empty() || app_secret.expose_secret().trim().is_empty() {
            return Err(Error::configuration("app id and app secret are required"));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                token_url,
                app_id,
                app_secret,
                state: Mutex::new(TokenState::default()),
            }),
        })
    }

    pub fn from_config(
        transport: Arc<dyn HttpTransport>,
        config: &wabridge_config::WaBridgeConfig,
    ) -> Result<Self> {
        let secret = config
            .credentials
            .app_secret
            .clone()
            .ok_or_else(|| Error::configuration("credentials.app_secret is not set"))?;
        Self::new(
            transport,
            config.api.token_url(),
            config.credentials.app_id.trim(),
            secret,
        )
    }

    /// Current bearer token, refreshing it first when missing or near expiry.
    pub async fn access_token(&self) -> Result<Secret<String>> {
        let refresh = {
            let mut state = self.inner.state.lock().await;
            if let Some(token) = state.current.as_ref().filter(|t| t.is_usable()) {
                #[cfg(feature = "metrics")]
                counter!(token_metrics::CACHE_HITS_TOTAL).increment(1);
                return Ok(token.value.clone());
            }
            match state.inflight.clone() {
                Some(inflight) => {
                    debug!("joining in-flight token refresh");
                    inflight
                },
                None => {
                    let refresh = Self::refresh(Arc::clone(&self.inner)).boxed().shared();
                    state.inflight = Some(refresh.clone());
                    refresh
                },
            }
        };
        refresh.await.map(|token| token.value)
    }

    /// Drop the cached token so the next call fetches a fresh one.
    pub async fn invalidate(&self) {
        let mut state = self.inner.state.lock().await;
        if state.current.take().is_some() {
            info!("access token invalidated");
            #[cfg(feature = "metrics")]
            counter!(token_metrics::INVALIDATIONS_TOTAL).increment(1);
        }
    }

    async fn refresh(inner: Arc<Inner>) -> Result<AccessToken> {
        let result = Self::fetch(&inner).await;
        let mut state = inner.state.lock().await;
        state.inflight = None;
        if let Ok(token) = &result {
            state.current = Some(token.clone());
        }
        result
    }

    async fn fetch(inner: &Inner) -> Result<AccessToken> {
        #[cfg(feature = "metrics")]
        counter!(token_metrics::REFRESH_TOTAL).increment(1);

        let request = ApiRequest::post(
            &inner.token_url,
            json!({
                "grant_type": "client_credentials",
                "client_id": inner.app_id,
                "client_secret": inner.app_secret.expose_secret(),
            }),
        );

        let result = match inner.transport.execute(request).await {
            Ok(response) if response.is_success() => response
                .json()
                .map_err(|e| Error::Authentication(format!("malformed token response: {e}")))
                .and_then(|body| parse_token_response(&body)),
            // Provider trouble, not a credential rejection.
            Ok(response) if is_retryable_status(response.status) => {
                Err(Error::Transport(TransportError::Other(format!(
                    "token endpoint returned {}: {}",
                    response.status,
                    response.provider_message()
                ))))
            },
            Ok(response) => Err(Error::Authentication(format!(
                "token endpoint returned {}: {}",
                response.status,
                response.provider_message()
            ))),
            Err(e) => Err(Error::Transport(e)),
        };

        match &result {
            Ok(token) => info!(
                expires_in_secs = token
                    .expires_at
                    .saturating_duration_since(Instant::now())
                    .as_secs(),
                "access token refreshed"
            ),
            Err(e) => {
                warn!(error = %e, "access token refresh failed");
                #[cfg(feature = "metrics")]
                counter!(token_metrics::REFRESH_FAILURES_TOTAL).increment(1);
            },
        }
        result
    }
}

fn parse_token_response(body: &Value) -> Result<AccessToken> {
    let access_token = body["access_token"]
        .as_str()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::Authentication("token response has no access_token".into()))?;

    // Some providers send `expires_in` as a string.
    let expires_in = body["expires_in"]
        .as_u64()
        .or_else(|| body["expires_in"].as_str().and_then(|s| s.trim().parse().ok()))
        .map_or(DEFAULT_EXPIRES_IN, Duration::from_secs);

    if let Some(token_type) = body["token_type"].as_str()
        && !token_type.eq_ignore_ascii_case("bearer")
    {
        debug!(token_type, "unexpected token type, using as bearer");
    }

    Ok(AccessToken::new(
        Secret::new(access_token.to_string()),
        expires_in,
    ))
}
