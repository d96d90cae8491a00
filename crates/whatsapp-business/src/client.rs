//! Client facade wiring the components from one configuration.

use std::sync::Arc;

use tracing::{debug, warn};

use wabridge_config::{ConfigStatus, ConfigValidator, WaBridgeConfig};

use crate::{
    auth::TokenManager,
    channel::{Channel, ChannelResolver, ChannelSelector},
    contacts::ContactDirectory,
    dispatch::{DispatchResult, DispatchSettings, Dispatcher, Target},
    error::Result,
    message::{Built, ButtonSpec, MessageBuilder, OutboundMessage},
    phone::PhoneNormalizer,
    rate_limit::RateLimiter,
    transport::{HttpTransport, ReqwestTransport},
    webhook,
};

/// Messaging-provider client.
///
/// Built once from configuration and handed to call sites; there is no
/// global instance.
pub struct WhatsAppClient {
    config: Arc<WaBridgeConfig>,
    tokens: TokenManager,
    channels: Arc<ChannelResolver>,
    dispatcher: Dispatcher,
    contacts: ContactDirectory,
    builder: MessageBuilder,
}

impl WhatsAppClient {
    /// Validate `config` and connect over HTTP.
    pub fn from_config(config: WaBridgeConfig) -> Result<Self> {
        ConfigValidator::new(&config).require_valid()?;
        let transport = ReqwestTransport::from_config(&config.api)?;
        Self::assemble(config, Arc::new(transport))
    }

    /// Validate `config` and use the given transport for every provider call.
    pub fn with_transport(config: WaBridgeConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        ConfigValidator::new(&config).require_valid()?;
        Self::assemble(config, transport)
    }

    fn assemble(config: WaBridgeConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let normalizer = PhoneNormalizer::new(&config.api.country_code);
        let tokens = TokenManager::from_config(Arc::clone(&transport), &config)?;
        let channels = Arc::new(ChannelResolver::new(
            Arc::clone(&transport),
            tokens.clone(),
            config.api.base_url(),
            config.credentials.static_bot_id().map(String::from),
            ChannelSelector::from_config(&config.channel),
            normalizer.clone(),
        ));
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        let dispatcher = Dispatcher::new(
            Arc::clone(&transport),
            tokens.clone(),
            Arc::clone(&channels),
            limiter,
            normalizer.clone(),
            DispatchSettings::from_config(&config),
        );
        let contacts = ContactDirectory::new(
            transport,
            tokens.clone(),
            config.api.base_url(),
            normalizer,
        );
        let builder = MessageBuilder::new(config.api.default_locale.clone());

        debug!(
            environment = %config.environment,
            static_channel = channels.is_static(),
            "whatsapp client ready"
        );

        Ok(Self {
            config: Arc::new(config),
            tokens,
            channels,
            dispatcher,
            contacts,
            builder,
        })
    }

    pub async fn send_text_message(&self, phone: &str, body: &str) -> Result<DispatchResult> {
        let built = self.builder.build_text(body)?;
        self.send_built(Target::Phone(phone.to_string()), built)
            .await
    }

    /// Send an approved template in the configured default locale.
    pub async fn send_template_message<S: AsRef<str>>(
        &self,
        phone: &str,
        template_id: &str,
        variables: &[S],
    ) -> Result<DispatchResult> {
        let built = self.builder.build_template(template_id, variables, None)?;
        self.send_built(Target::Phone(phone.to_string()), built)
            .await
    }

    pub async fn send_buttons_message(
        &self,
        phone: &str,
        body: &str,
        buttons: Vec<ButtonSpec>,
    ) -> Result<DispatchResult> {
        let built = self.builder.build_interactive_buttons(body, buttons)?;
        self.send_built(Target::Phone(phone.to_string()), built)
            .await
    }

    pub async fn send_image_message(
        &self,
        phone: &str,
        url: &str,
        caption: Option<&str>,
    ) -> Result<DispatchResult> {
        let built = self.builder.build_image(url, caption)?;
        self.send_built(Target::Phone(phone.to_string()), built)
            .await
    }

    /// Send an already-built message to an existing provider contact.
    pub async fn send_to_contact(
        &self,
        contact_id: &str,
        message: &OutboundMessage,
    ) -> Result<DispatchResult> {
        self.dispatcher
            .send(&Target::Contact(contact_id.to_string()), message)
            .await
    }

    async fn send_built(
        &self,
        target: Target,
        built: Built<OutboundMessage>,
    ) -> Result<DispatchResult> {
        for warning in &built.warnings {
            warn!(message_type = built.message.kind(), "{warning}");
        }
        self.dispatcher.send(&target, &built.message).await
    }

    #[must_use]
    pub fn builder(&self) -> &MessageBuilder {
        &self.builder
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn contacts(&self) -> &ContactDirectory {
        &self.contacts
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Sending channel, resolving it on first use.
    pub async fn channel(&self) -> Result<Channel> {
        self.channels.resolve().await
    }

    pub async fn reset_channel(&self) {
        self.channels.reset().await;
    }

    /// Health of the configuration this client was built from.
    #[must_use]
    pub fn config_status(&self) -> ConfigStatus {
        ConfigValidator::new(&self.config).config_status()
    }

    #[must_use]
    pub fn verify_webhook_token(&self, provided: &str) -> bool {
        webhook::verify_webhook_token(provided, &self.config.credentials)
    }
}
