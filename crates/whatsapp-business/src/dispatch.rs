//! Outbound message dispatch with rate limiting and retry/backoff.
//!
//! Per-message outcomes are returned as [`DispatchResult`] values so a batch
//! of sends can partially succeed. Only systemic failures (configuration,
//! authentication, channel resolution, invalid input) come back as `Err`.

use std::{sync::Arc, time::Duration};

use {
    serde_json::{Value, json},
    thiserror::Error,
    tokio::time::Instant,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use wabridge_metrics::{counter, dispatch as dispatch_metrics, histogram, labels};

use crate::{
    auth::TokenManager,
    channel::{ChannelResolver, id_string},
    error::{Error, Result},
    message::OutboundMessage,
    phone::PhoneNormalizer,
    rate_limit::RateLimiter,
    retry::{RetryPolicy, is_retryable_status},
    transport::{ApiRequest, ApiResponse, HttpTransport, TransportError},
};

/// Where a message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Raw phone input; normalized before sending from the resolved channel.
    Phone(String),
    /// Existing provider contact id.
    Contact(String),
}

/// Why a single send did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("transient failure{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    TransientTransport {
        status: Option<u16>,
        message: String,
    },

    #[error("provider rejected request ({status}): {message}")]
    PermanentRequest { status: u16, message: String },

    #[error("no rate limit slot within {waited:?}")]
    RateLimitExceeded { waited: Duration },

    #[error("send cancelled")]
    Cancelled,
}

impl DispatchError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientTransport { .. } | Self::RateLimitExceeded { .. }
        )
    }

    fn label(&self) -> &'static str {
        match self {
            Self::TransientTransport { .. } => "transient",
            Self::PermanentRequest { .. } => "permanent",
            Self::RateLimitExceeded { .. } => "rate_limited",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Outcome of one `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub error: Option<DispatchError>,
    /// Whether the caller may try the same send again later.
    pub retryable: bool,
    /// HTTP attempts made.
    pub attempts: u32,
}

impl DispatchResult {
    fn succeeded(provider_message_id: Option<String>, attempts: u32) -> Self {
        Self {
            success: true,
            provider_message_id,
            error: None,
            retryable: false,
            attempts,
        }
    }

    fn failed(error: DispatchError, attempts: u32) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            retryable: error.is_retryable(),
            error: Some(error),
            attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    AuthPending,
    ChannelResolving,
    RateLimited,
    Sending,
    RetryScheduled,
    Success,
    PermanentFailure,
    RetriesExhausted,
}

impl DispatchState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AuthPending => "auth_pending",
            Self::ChannelResolving => "channel_resolving",
            Self::RateLimited => "rate_limited",
            Self::Sending => "sending",
            Self::RetryScheduled => "retry_scheduled",
            Self::Success => "success",
            Self::PermanentFailure => "permanent_failure",
            Self::RetriesExhausted => "retries_exhausted",
        }
    }
}

fn enter(state: &mut DispatchState, next: DispatchState) {
    debug!(from = state.as_str(), state = next.as_str(), "dispatch state");
    *state = next;
}

/// Timing knobs for [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub base_url: String,
    pub retry: RetryPolicy,
    pub acquire_timeout: Duration,
    pub request_timeout: Duration,
}

impl DispatchSettings {
    #[must_use]
    pub fn from_config(config: &wabridge_config::WaBridgeConfig) -> Self {
        Self {
            base_url: config.api.base_url().to_string(),
            retry: RetryPolicy::from_config(&config.retry),
            acquire_timeout: Duration::from_millis(config.rate_limit.acquire_timeout_ms),
            request_timeout: Duration::from_millis(config.api.request_timeout_ms),
        }
    }
}

/// Outcome of one HTTP attempt that did not succeed.
enum AttemptFailure {
    Retry {
        error: DispatchError,
        retry_after: Option<Duration>,
    },
    Permanent(DispatchError),
}

pub struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
    tokens: TokenManager,
    channels: Arc<ChannelResolver>,
    limiter: Arc<RateLimiter>,
    normalizer: PhoneNormalizer,
    settings: DispatchSettings,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        tokens: TokenManager,
        channels: Arc<ChannelResolver>,
        limiter: Arc<RateLimiter>,
        normalizer: PhoneNormalizer,
        mut settings: DispatchSettings,
    ) -> Self {
        settings.base_url = settings.base_url.trim_end_matches('/').to_string();
        settings.retry.max_attempts = settings.retry.max_attempts.max(1);
        Self {
            transport,
            tokens,
            channels,
            limiter,
            normalizer,
            settings,
        }
    }

    pub async fn send(&self, target: &Target, message: &OutboundMessage) -> Result<DispatchResult> {
        self.send_with_cancel(target, message, &CancellationToken::new())
            .await
    }

    /// Like [`send`](Self::send), stopping early with
    /// [`DispatchError::Cancelled`] once `cancel` fires.
    pub async fn send_with_cancel(
        &self,
        target: &Target,
        message: &OutboundMessage,
        cancel: &CancellationToken,
    ) -> Result<DispatchResult> {
        let started = Instant::now();
        let result = self.run(target, message, cancel).await;

        #[cfg(feature = "metrics")]
        {
            histogram!(dispatch_metrics::DURATION_SECONDS).record(started.elapsed().as_secs_f64());
            let outcome = match &result {
                Ok(r) if r.success => "success",
                Ok(_) => "failure",
                Err(_) => "error",
            };
            counter!(
                dispatch_metrics::SENDS_TOTAL,
                labels::OUTCOME => outcome,
                labels::MESSAGE_TYPE => message.kind()
            )
            .increment(1);
            if let Ok(DispatchResult {
                error: Some(e), ..
            }) = &result
            {
                counter!(dispatch_metrics::FAILURES_TOTAL, labels::ERROR_TYPE => e.label())
                    .increment(1);
            }
        }

        match &result {
            Ok(r) if r.success => info!(
                message_type = message.kind(),
                attempts = r.attempts,
                provider_message_id = r.provider_message_id.as_deref().unwrap_or_default(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "message sent"
            ),
            Ok(r) => warn!(
                message_type = message.kind(),
                attempts = r.attempts,
                retryable = r.retryable,
                error = r.error.as_ref().map(DispatchError::label).unwrap_or_default(),
                "message not sent"
            ),
            Err(e) => warn!(message_type = message.kind(), error = %e, "send aborted"),
        }
        result
    }

    async fn run(
        &self,
        target: &Target,
        message: &OutboundMessage,
        cancel: &CancellationToken,
    ) -> Result<DispatchResult> {
        let mut state = DispatchState::Idle;

        enter(&mut state, DispatchState::AuthPending);
        let token = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(DispatchResult::failed(DispatchError::Cancelled, 0)),
            token = self.tokens.access_token() => token,
        };
        match token {
            Ok(_) => {},
            Err(Error::Transport(e)) => return Ok(unreachable_before_send(e)),
            Err(e) => return Err(e),
        }

        let (url, body) = match target {
            Target::Phone(raw) => {
                enter(&mut state, DispatchState::ChannelResolving);
                let channel = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(DispatchResult::failed(DispatchError::Cancelled, 0)),
                    channel = self.channels.resolve() => channel,
                };
                let channel = match channel {
                    Ok(channel) => channel,
                    Err(Error::Transport(e)) => return Ok(unreachable_before_send(e)),
                    Err(e) => return Err(e),
                };
                let phone = self.normalizer.normalize(raw);
                if phone.is_empty() {
                    return Err(Error::invalid_message(format!(
                        "destination \"{raw}\" contains no digits"
                    )));
                }
                if !self.normalizer.is_plausible(&phone) {
                    debug!(phone = %phone, "destination does not look like an international number");
                }
                (
                    format!("{}/contacts/sendByPhone", self.settings.base_url),
                    json!({ "bot_id": channel.id, "phone": phone, "message": message.to_wire() }),
                )
            },
            Target::Contact(id) => {
                let id = id.trim();
                if id.is_empty() {
                    return Err(Error::invalid_message("contact id is empty"));
                }
                (
                    format!("{}/contacts/send", self.settings.base_url),
                    json!({ "contact_id": id, "message": message.to_wire() }),
                )
            },
        };

        self.attempt_loop(&mut state, &url, &body, cancel).await
    }

    async fn attempt_loop(
        &self,
        state: &mut DispatchState,
        url: &str,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<DispatchResult> {
        let policy = &self.settings.retry;
        let mut attempts = 0u32;
        let mut retry_index = 0u32;

        loop {
            enter(state, DispatchState::RateLimited);
            let wait_started = Instant::now();
            let acquired = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(DispatchResult::failed(DispatchError::Cancelled, attempts)),
                acquired = self.limiter.acquire(self.settings.acquire_timeout) => acquired,
            };
            if !acquired {
                let waited = wait_started.elapsed();
                warn!(attempt = attempts + 1, waited_ms = waited.as_millis() as u64, "rate limit slot not acquired");
                return Ok(DispatchResult::failed(
                    DispatchError::RateLimitExceeded { waited },
                    attempts,
                ));
            }

            // Re-read per attempt: the token may have expired during backoff or
            // been invalidated by another send.
            let token = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(DispatchResult::failed(DispatchError::Cancelled, attempts)),
                token = self.tokens.access_token() => token,
            };
            let token = match token {
                Ok(token) => token,
                Err(Error::Transport(e)) => {
                    warn!(attempt = attempts + 1, error = %e, "token unavailable, not sending");
                    return Ok(DispatchResult::failed(
                        DispatchError::TransientTransport {
                            status: None,
                            message: e.to_string(),
                        },
                        attempts,
                    ));
                },
                Err(e) => return Err(e),
            };

            enter(state, DispatchState::Sending);
            attempts += 1;

            let request = ApiRequest::post(url, body.clone()).bearer(token);
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(DispatchResult::failed(DispatchError::Cancelled, attempts)),
                outcome = tokio::time::timeout(self.settings.request_timeout, self.transport.execute(request)) => {
                    outcome.unwrap_or(Err(TransportError::Timeout))
                },
            };

            #[cfg(feature = "metrics")]
            counter!(dispatch_metrics::ATTEMPTS_TOTAL, labels::STATUS => attempt_status(&outcome))
                .increment(1);

            let failure = match outcome {
                Ok(response) if response.is_success() => {
                    enter(state, DispatchState::Success);
                    let id = response.json().ok().as_ref().and_then(extract_message_id);
                    return Ok(DispatchResult::succeeded(id, attempts));
                },
                Ok(response) => self.classify(response).await,
                Err(e) => AttemptFailure::Retry {
                    error: DispatchError::TransientTransport {
                        status: None,
                        message: e.to_string(),
                    },
                    retry_after: None,
                },
            };

            let (error, retry_after) = match failure {
                AttemptFailure::Permanent(error) => {
                    enter(state, DispatchState::PermanentFailure);
                    return Ok(DispatchResult::failed(error, attempts));
                },
                AttemptFailure::Retry { error, retry_after } => (error, retry_after),
            };

            if attempts >= policy.max_attempts {
                enter(state, DispatchState::RetriesExhausted);
                warn!(attempts, error = %error, "retries exhausted");
                return Ok(DispatchResult::failed(error, attempts));
            }

            let delay = policy.delay_with_retry_after(retry_index, retry_after);
            retry_index += 1;
            enter(state, DispatchState::RetryScheduled);
            warn!(
                attempt = attempts,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient send failure, retrying"
            );
            #[cfg(feature = "metrics")]
            counter!(dispatch_metrics::RETRIES_TOTAL).increment(1);

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(DispatchResult::failed(DispatchError::Cancelled, attempts)),
                () = tokio::time::sleep(delay) => {},
            }
        }
    }

    async fn classify(&self, response: ApiResponse) -> AttemptFailure {
        let status = response.status;
        let message = response.provider_message();
        if is_retryable_status(status) {
            return AttemptFailure::Retry {
                error: DispatchError::TransientTransport {
                    status: Some(status),
                    message,
                },
                retry_after: if status == 429 {
                    response.retry_after
                } else {
                    None
                },
            };
        }
        if status == 401 {
            // Next send fetches a fresh token.
            self.tokens.invalidate().await;
        }
        AttemptFailure::Permanent(DispatchError::PermanentRequest { status, message })
    }
}

/// The token or bots endpoint was unreachable or unavailable; nothing was sent.
fn unreachable_before_send(error: TransportError) -> DispatchResult {
    warn!(error = %error, "provider unavailable before send");
    DispatchResult::failed(
        DispatchError::TransientTransport {
            status: None,
            message: error.to_string(),
        },
        0,
    )
}

/// Metric label for one attempt: the HTTP status, or how the transport failed.
#[cfg_attr(not(feature = "metrics"), allow(dead_code))]
fn attempt_status(outcome: &std::result::Result<ApiResponse, TransportError>) -> String {
    match outcome {
        Ok(response) => response.status.to_string(),
        Err(TransportError::Timeout) => "timeout".into(),
        Err(_) => "transport_error".into(),
    }
}

/// Provider message id from the first of `data.id`, `data.message_id`,
/// `messages[0].id`, `id`, `message_id`.
fn extract_message_id(body: &Value) -> Option<String> {
    ["/data/id", "/data/message_id", "/messages/0/id", "/id", "/message_id"]
        .iter()
        .find_map(|path| body.pointer(path).and_then(id_string))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(json!({"data": {"id": "m1"}}), Some("m1"))]
    #[case(json!({"data": {"message_id": "m2"}}), Some("m2"))]
    #[case(json!({"messages": [{"id": "wamid.3"}]}), Some("wamid.3"))]
    #[case(json!({"id": 44}), Some("44"))]
    #[case(json!({"message_id": "m5"}), Some("m5"))]
    #[case(json!({"success": true}), None)]
    #[case(Value::Null, None)]
    fn message_id_paths(#[case] body: Value, #[case] expected: Option<&str>) {
        assert_eq!(extract_message_id(&body).as_deref(), expected);
    }

    #[rstest]
    #[case(Ok(ApiResponse::new(200, "")), "200")]
    #[case(Ok(ApiResponse::new(503, "")), "503")]
    #[case(Err(TransportError::Timeout), "timeout")]
    #[case(Err(TransportError::Connect("refused".into())), "transport_error")]
    fn attempt_status_labels(
        #[case] outcome: std::result::Result<ApiResponse, TransportError>,
        #[case] expected: &str,
    ) {
        assert_eq!(attempt_status(&outcome), expected);
    }

    #[test]
    fn retryability_by_error_kind() {
        assert!(
            DispatchError::TransientTransport {
                status: Some(503),
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            DispatchError::RateLimitExceeded {
                waited: Duration::ZERO
            }
            .is_retryable()
        );
        assert!(
            !DispatchError::PermanentRequest {
                status: 400,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!DispatchError::Cancelled.is_retryable());
    }

    #[test]
    fn transient_display_includes_status() {
        let e = DispatchError::TransientTransport {
            status: Some(503),
            message: "unavailable".into(),
        };
        assert_eq!(e.to_string(), "transient failure (503): unavailable");
        let e = DispatchError::TransientTransport {
            status: None,
            message: "request timed out".into(),
        };
        assert_eq!(e.to_string(), "transient failure: request timed out");
    }
}
