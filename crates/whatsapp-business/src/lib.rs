//! WhatsApp Business messaging-provider client.
//!
//! Authenticates against the provider API, resolves the sending channel,
//! normalizes destination phones, builds provider-valid payloads and sends
//! them with rate limiting and retry/backoff.
//!
//! ```rust,ignore
//! let config = wabridge_config::discover_and_load()?;
//! let client = wabridge_whatsapp::WhatsAppClient::from_config(config)?;
//! let result = client.send_text_message("(33) 99989-8026", "Olá!").await?;
//! ```

pub mod auth;
pub mod channel;
pub mod client;
pub mod contacts;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod phone;
pub mod rate_limit;
pub mod retry;
pub mod transport;
pub mod webhook;

pub use {
    auth::{AccessToken, TokenManager},
    channel::{Channel, ChannelResolver, ChannelSelector},
    client::WhatsAppClient,
    contacts::{Contact, ContactDirectory},
    dispatch::{
        DispatchError, DispatchResult, DispatchSettings, DispatchState, Dispatcher, Target,
    },
    error::{Error, Result},
    message::{BuildWarning, Built, Button, ButtonSpec, MessageBuilder, OutboundMessage},
    phone::{PhoneNormalizer, normalize_phone},
    rate_limit::RateLimiter,
    retry::{MAX_RETRY_ATTEMPTS, RetryPolicy, is_retryable_status},
    transport::{ApiRequest, ApiResponse, HttpTransport, Method, ReqwestTransport, TransportError},
    webhook::{verify_signature, verify_subscription, verify_webhook_token},
};
