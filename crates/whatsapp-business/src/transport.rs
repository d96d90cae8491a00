//! HTTP seam between the client and the provider API.
//!
//! Every provider call goes through [`HttpTransport`], so tests can swap the
//! network for a scripted fake or a local mock server.

use std::time::Duration;

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde_json::Value,
    thiserror::Error,
    tracing::debug,
};

use crate::error::{Error, Result};

/// Provider messages longer than this are cut when surfaced in errors.
const MAX_SURFACED_BODY_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// A single provider API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<Secret<String>>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            bearer: None,
            query: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            bearer: None,
            query: Vec::new(),
            body: Some(body),
        }
    }

    #[must_use]
    pub fn bearer(mut self, token: Secret<String>) -> Self {
        self.bearer = Some(token);
        self
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Raw provider response. Non-2xx statuses are not errors at this layer.
#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    /// Parsed `Retry-After` header, seconds form only.
    pub retry_after: Option<Duration>,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as JSON. An empty body is `Null`.
    pub fn json(&self) -> Result<Value> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&self.body).map_err(Error::from)
    }

    /// Best human-readable error text the provider gave.
    ///
    /// Looks at `message`, `error.message`, then a string `error`, and falls
    /// back to the (truncated) raw body.
    #[must_use]
    pub fn provider_message(&self) -> String {
        if let Ok(value) = serde_json::from_str::<Value>(&self.body) {
            let found = value
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| value.pointer("/error/message").and_then(Value::as_str))
                .or_else(|| value.get("error").and_then(Value::as_str));
            if let Some(message) = found {
                return message.to_string();
            }
        }
        let body = self.body.trim();
        if body.is_empty() {
            return format!("HTTP {}", self.status);
        }
        if body.chars().count() > MAX_SURFACED_BODY_CHARS {
            let cut: String = body.chars().take(MAX_SURFACED_BODY_CHARS).collect();
            format!("{cut}...")
        } else {
            body.to_string()
        }
    }
}

/// Failure to get any response from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: ApiRequest)
    -> std::result::Result<ApiResponse, TransportError>;
}

/// Production transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn from_config(api: &wabridge_config::ApiConfig) -> Result<Self> {
        Self::new(
            Duration::from_millis(api.request_timeout_ms),
            Duration::from_millis(api.connect_timeout_ms),
        )
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: ApiRequest,
    ) -> std::result::Result<ApiResponse, TransportError> {
        debug!(method = request.method.as_str(), url = %request.url, "provider request");

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token.expose_secret());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await?;

        Ok(ApiResponse {
            status,
            body,
            retry_after,
        })
    }
}

/// Parse a `Retry-After` value given in whole seconds.
///
/// HTTP-date values are ignored.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, serde_json::json};

    #[rstest]
    #[case(r#"{"message":"bad phone"}"#, "bad phone")]
    #[case(r#"{"error":{"message":"template not approved"}}"#, "template not approved")]
    #[case(r#"{"error":"forbidden"}"#, "forbidden")]
    #[case("plain failure", "plain failure")]
    #[case("", "HTTP 400")]
    fn provider_message_extraction(#[case] body: &str, #[case] expected: &str) {
        assert_eq!(ApiResponse::new(400, body).provider_message(), expected);
    }

    #[test]
    fn long_body_is_truncated() {
        let body = "x".repeat(500);
        let message = ApiResponse::new(500, body).provider_message();
        assert_eq!(message.chars().count(), MAX_SURFACED_BODY_CHARS + 3);
        assert!(message.ends_with("..."));
    }

    #[test]
    fn retry_after_seconds_only() {
        assert_eq!(parse_retry_after(" 7 "), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn empty_body_is_null_json() {
        assert_eq!(ApiResponse::new(204, "").json().unwrap(), Value::Null);
        assert_eq!(
            ApiResponse::new(200, r#"{"ok":true}"#).json().unwrap(),
            json!({"ok": true})
        );
        assert!(matches!(
            ApiResponse::new(200, "{").json(),
            Err(Error::Decode(_))
        ));
    }

    #[tokio::test]
    async fn reqwest_transport_sends_bearer_query_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/contacts")
            .match_header("authorization", "Bearer tok")
            .match_query(mockito::Matcher::UrlEncoded("phone".into(), "5511".into()))
            .match_body(mockito::Matcher::Json(json!({"a": 1})))
            .with_status(429)
            .with_header("retry-after", "3")
            .with_body("slow down")
            .create_async()
            .await;

        let transport =
            ReqwestTransport::new(Duration::from_secs(5), Duration::from_secs(5)).unwrap();
        let response = transport
            .execute(
                ApiRequest::post(format!("{}/contacts", server.url()), json!({"a": 1}))
                    .bearer(Secret::new("tok".into()))
                    .query("phone", "5511"),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 429);
        assert_eq!(response.retry_after, Some(Duration::from_secs(3)));
        assert_eq!(response.body, "slow down");
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let transport =
            ReqwestTransport::new(Duration::from_secs(2), Duration::from_secs(2)).unwrap();
        let err = transport
            .execute(ApiRequest::get("http://127.0.0.1:1/bots"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connect(_) | TransportError::Other(_)
        ));
    }
}
