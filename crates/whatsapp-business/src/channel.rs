//! Sending channel (bot) resolution.

use std::{fmt, sync::Arc};

use {
    serde::Serialize,
    serde_json::Value,
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use wabridge_metrics::{channel as channel_metrics, counter};

use wabridge_config::{ChannelConfig, ChannelSelect};

use crate::{
    auth::TokenManager,
    error::{Error, Result},
    phone::PhoneNormalizer,
    transport::{ApiRequest, HttpTransport},
};

/// Provider-side WhatsApp sending identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl Channel {
    #[must_use]
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            phone_number: None,
        }
    }
}

/// Which discovered channel to send from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChannelSelector {
    /// First channel in provider response order.
    #[default]
    First,
    /// Channel whose phone matches after normalization.
    ByPhone(String),
    /// Channel whose name matches, ignoring case.
    ByName(String),
}

impl ChannelSelector {
    #[must_use]
    pub fn from_config(config: &ChannelConfig) -> Self {
        let value = config
            .value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty());
        match (config.select, value) {
            (ChannelSelect::Phone, Some(v)) => Self::ByPhone(v.to_string()),
            (ChannelSelect::Name, Some(v)) => Self::ByName(v.to_string()),
            _ => Self::First,
        }
    }
}

impl fmt::Display for ChannelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::ByPhone(p) => write!(f, "phone \"{p}\""),
            Self::ByName(n) => write!(f, "name \"{n}\""),
        }
    }
}

/// Resolves the bot id used for phone sends.
///
/// A configured static id short-circuits discovery. Otherwise the provider's
/// bot list is fetched once and the result cached until [`reset`](Self::reset).
pub struct ChannelResolver {
    transport: Arc<dyn HttpTransport>,
    tokens: TokenManager,
    base_url: String,
    static_id: Option<String>,
    selector: ChannelSelector,
    normalizer: PhoneNormalizer,
    cached: Mutex<Option<Channel>>,
}

impl fmt::Debug for ChannelResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelResolver")
            .field("base_url", &self.base_url)
            .field("static_id", &self.static_id)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

impl ChannelResolver {
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        tokens: TokenManager,
        base_url: impl Into<String>,
        static_id: Option<String>,
        selector: ChannelSelector,
        normalizer: PhoneNormalizer,
    ) -> Self {
        let static_id = static_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        Self {
            transport,
            tokens,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            static_id,
            selector,
            normalizer,
            cached: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.static_id.is_some()
    }

    pub async fn resolve(&self) -> Result<Channel> {
        if let Some(id) = &self.static_id {
            return Ok(Channel::from_id(id.clone()));
        }

        // Held across discovery so concurrent first calls share one listing.
        let mut cached = self.cached.lock().await;
        if let Some(channel) = cached.as_ref() {
            return Ok(channel.clone());
        }

        let channel = self.discover().await?;
        info!(
            bot_id = %channel.id,
            name = channel.display_name.as_deref().unwrap_or_default(),
            selector = %self.selector,
            "resolved sending channel"
        );
        *cached = Some(channel.clone());
        Ok(channel)
    }

    /// Forget the cached channel; the next [`resolve`](Self::resolve) lists again.
    pub async fn reset(&self) {
        if self.cached.lock().await.take().is_some() {
            debug!("channel cache cleared");
        }
    }

    async fn discover(&self) -> Result<Channel> {
        #[cfg(feature = "metrics")]
        counter!(channel_metrics::RESOLUTIONS_TOTAL).increment(1);

        let result = self.list_and_select().await;
        if let Err(e) = &result {
            warn!(error = %e, selector = %self.selector, "channel resolution failed");
            #[cfg(feature = "metrics")]
            counter!(channel_metrics::RESOLUTION_FAILURES_TOTAL).increment(1);
        }
        result
    }

    async fn list_and_select(&self) -> Result<Channel> {
        let token = self.tokens.access_token().await?;
        let response = self
            .transport
            .execute(ApiRequest::get(format!("{}/bots", self.base_url)).bearer(token))
            .await?;

        match response.status {
            401 | 403 => {
                if response.status == 401 {
                    self.tokens.invalidate().await;
                }
                return Err(Error::Authentication(format!(
                    "bot listing rejected ({}): {}",
                    response.status,
                    response.provider_message()
                )));
            },
            _ if !response.is_success() => {
                return Err(Error::ChannelResolution(format!(
                    "bot listing failed ({}): {}",
                    response.status,
                    response.provider_message()
                )));
            },
            _ => {},
        }

        let body = response
            .json()
            .map_err(|e| Error::ChannelResolution(format!("unreadable bot listing: {e}")))?;
        let channels = parse_channels(&body);
        debug!(count = channels.len(), "provider channels listed");
        if channels.is_empty() {
            return Err(Error::ChannelResolution(
                "provider returned no channels".into(),
            ));
        }
        self.select(channels)
    }

    fn select(&self, channels: Vec<Channel>) -> Result<Channel> {
        let found = match &self.selector {
            ChannelSelector::First => channels.into_iter().next(),
            ChannelSelector::ByPhone(phone) => {
                let wanted = self.normalizer.normalize(phone);
                channels.into_iter().find(|c| {
                    c.phone_number
                        .as_deref()
                        .is_some_and(|p| self.normalizer.normalize(p) == wanted)
                })
            },
            ChannelSelector::ByName(name) => channels.into_iter().find(|c| {
                c.display_name
                    .as_deref()
                    .is_some_and(|n| n.trim().eq_ignore_ascii_case(name.trim()))
            }),
        };
        found.ok_or_else(|| {
            Error::ChannelResolution(format!("no channel matches {}", self.selector))
        })
    }
}

/// Bots from `{data: [...]}` or a bare array, skipping entries without an id.
fn parse_channels(body: &Value) -> Vec<Channel> {
    let items = body
        .get("data")
        .and_then(Value::as_array)
        .or_else(|| body.as_array());
    let Some(items) = items else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let id = id_string(item.get("id")?)?;
            let display_name = item.get("name").and_then(Value::as_str).map(String::from);
            let phone_number = item
                .pointer("/channel/phone")
                .or_else(|| item.get("phone"))
                .and_then(id_string);
            Some(Channel {
                id,
                display_name,
                phone_number,
            })
        })
        .collect()
}

/// String or number field as a non-empty string.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
