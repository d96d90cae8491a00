//! `wabridge send ...`: build one message and dispatch it.

use std::path::Path;

use {
    anyhow::{Result, bail},
    clap::{Args, Subcommand},
    serde_json::json,
    tokio_util::sync::CancellationToken,
    tracing::warn,
};

use wabridge_whatsapp::{Built, ButtonSpec, DispatchResult, OutboundMessage, Target};

/// Destination of a send: a phone number or an existing contact.
#[derive(Args, Clone)]
#[group(required = true, multiple = false)]
pub struct Destination {
    /// Phone number in any common format; national numbers get the
    /// configured country code.
    #[arg(long)]
    to: Option<String>,
    /// Provider contact id.
    #[arg(long)]
    contact: Option<String>,
}

impl Destination {
    fn target(&self) -> Option<Target> {
        match (&self.to, &self.contact) {
            (Some(phone), _) => Some(Target::Phone(phone.clone())),
            (None, Some(id)) => Some(Target::Contact(id.clone())),
            (None, None) => None,
        }
    }
}

#[derive(Subcommand)]
pub enum SendAction {
    /// Free-form text (inside the conversation window).
    Text {
        #[command(flatten)]
        dest: Destination,
        #[arg(short, long)]
        body: String,
    },
    /// Pre-approved template.
    Template {
        #[command(flatten)]
        dest: Destination,
        /// Template name.
        #[arg(long)]
        template: String,
        /// Positional body variable; repeat in order.
        #[arg(long = "var")]
        variables: Vec<String>,
        /// Template locale, e.g. `en_US`. Defaults to the configured locale.
        #[arg(long)]
        language: Option<String>,
    },
    /// Text with up to three quick-reply buttons.
    Buttons {
        #[command(flatten)]
        dest: Destination,
        #[arg(short, long)]
        body: String,
        /// Button title, or `id=title`; repeat for each button.
        #[arg(long = "button", required = true)]
        buttons: Vec<String>,
    },
    /// Image by public URL.
    Image {
        #[command(flatten)]
        dest: Destination,
        #[arg(long)]
        url: String,
        #[arg(long)]
        caption: Option<String>,
    },
}

pub async fn handle_send(action: SendAction, config: Option<&Path>) -> Result<()> {
    let client = crate::build_client(config)?;
    let builder = client.builder();

    let (dest, built) = match action {
        SendAction::Text { dest, body } => (dest, builder.build_text(&body)?),
        SendAction::Template {
            dest,
            template,
            variables,
            language,
        } => (
            dest,
            builder.build_template(&template, variables.as_slice(), language.as_deref())?,
        ),
        SendAction::Buttons {
            dest,
            body,
            buttons,
        } => {
            let specs = buttons.iter().map(|b| parse_button(b)).collect();
            (dest, builder.build_interactive_buttons(&body, specs)?)
        },
        SendAction::Image { dest, url, caption } => {
            (dest, builder.build_image(&url, caption.as_deref())?)
        },
    };

    let Some(target) = dest.target() else {
        bail!("either --to or --contact is required");
    };
    let message = report_warnings(built);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = client
        .dispatcher()
        .send_with_cancel(&target, &message, &cancel)
        .await?;
    print_result(&result)?;

    if !result.success {
        let reason = result
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        bail!("message not sent: {reason}");
    }
    Ok(())
}

fn report_warnings(built: Built<OutboundMessage>) -> OutboundMessage {
    for warning in &built.warnings {
        warn!(message_type = built.message.kind(), "{warning}");
    }
    built.message
}

/// `title` or `id=title`.
fn parse_button(raw: &str) -> ButtonSpec {
    match raw.split_once('=') {
        Some((id, title)) if !id.trim().is_empty() => ButtonSpec::with_id(id.trim(), title),
        _ => ButtonSpec::new(raw),
    }
}

fn print_result(result: &DispatchResult) -> Result<()> {
    let output = json!({
        "success": result.success,
        "provider_message_id": result.provider_message_id,
        "attempts": result.attempts,
        "retryable": result.retryable,
        "error": result.error.as_ref().map(ToString::to_string),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("Yes", None, "Yes")]
    #[case("confirm=Yes", Some("confirm"), "Yes")]
    #[case("=Yes", None, "=Yes")]
    fn button_arguments(#[case] raw: &str, #[case] id: Option<&str>, #[case] title: &str) {
        let spec = parse_button(raw);
        assert_eq!(spec.id.as_deref(), id);
        assert_eq!(spec.title, title);
    }

    #[test]
    fn destination_prefers_phone() {
        let dest = Destination {
            to: Some("5533999898026".into()),
            contact: None,
        };
        assert_eq!(
            dest.target(),
            Some(Target::Phone("5533999898026".into()))
        );
        let dest = Destination {
            to: None,
            contact: Some("c-1".into()),
        };
        assert_eq!(dest.target(), Some(Target::Contact("c-1".into())));
    }
}
