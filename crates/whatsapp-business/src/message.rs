//! Provider message construction.
//!
//! Builders are pure: they validate input, enforce the provider's structural
//! limits, and report anything they had to cut as [`BuildWarning`]s. Lengths
//! are counted in Unicode scalar values.

use std::{collections::HashSet, fmt};

use {
    serde_json::{Value, json},
    url::Url,
};

use crate::error::{Error, Result};

pub const MAX_TEXT_CHARS: usize = 4096;
pub const MAX_CAPTION_CHARS: usize = 1024;
pub const MAX_INTERACTIVE_BODY_CHARS: usize = 1024;
pub const MAX_BUTTONS: usize = 3;
pub const MAX_BUTTON_TITLE_CHARS: usize = 20;
pub const DEFAULT_LOCALE: &str = "pt_BR";

/// A quick-reply button as sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub id: String,
    pub title: String,
}

/// Caller-supplied button. A missing id is generated as `btn_{n}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonSpec {
    pub id: Option<String>,
    pub title: String,
}

impl ButtonSpec {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
        }
    }

    #[must_use]
    pub fn with_id(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            title: title.into(),
        }
    }
}

impl From<&str> for ButtonSpec {
    fn from(title: &str) -> Self {
        Self::new(title)
    }
}

/// A provider-valid message.
///
/// Only [`MessageBuilder`] creates these, so every value already fits the
/// provider limits.
///
/// ```compile_fail
/// let oversized = wabridge_whatsapp::OutboundMessage::Text {
///     body: "x".repeat(5000),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Payload {
    Text {
        body: String,
    },
    Template {
        template_id: String,
        language: String,
        variables: Vec<String>,
    },
    InteractiveButtons {
        body: String,
        buttons: Vec<Button>,
    },
    Image {
        url: String,
        caption: Option<String>,
    },
}

impl OutboundMessage {
    fn new(payload: Payload) -> Self {
        Self { payload }
    }

    /// Provider message type name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match &self.payload {
            Payload::Text { .. } => "text",
            Payload::Template { .. } => "template",
            Payload::InteractiveButtons { .. } => "interactive",
            Payload::Image { .. } => "image",
        }
    }

    /// Text body for text and interactive messages.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text { body } | Payload::InteractiveButtons { body, .. } => {
                Some(body.as_str())
            },
            Payload::Template { .. } | Payload::Image { .. } => None,
        }
    }

    /// Quick-reply buttons; empty for other kinds.
    #[must_use]
    pub fn buttons(&self) -> &[Button] {
        match &self.payload {
            Payload::InteractiveButtons { buttons, .. } => buttons,
            _ => &[],
        }
    }

    /// Render the provider `message` object.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        match &self.payload {
            Payload::Text { body } => json!({
                "type": "text",
                "text": { "body": body },
            }),
            Payload::Image { url, caption } => {
                let mut image = json!({ "link": url });
                if let Some(caption) = caption {
                    image["caption"] = json!(caption);
                }
                json!({ "type": "image", "image": image })
            },
            Payload::InteractiveButtons { body, buttons } => {
                let buttons: Vec<Value> = buttons
                    .iter()
                    .map(|b| {
                        json!({
                            "type": "reply",
                            "reply": { "id": b.id, "title": b.title },
                        })
                    })
                    .collect();
                json!({
                    "type": "interactive",
                    "interactive": {
                        "type": "button",
                        "body": { "text": body },
                        "action": { "buttons": buttons },
                    },
                })
            },
            Payload::Template {
                template_id,
                language,
                variables,
            } => {
                let mut template = json!({
                    "name": template_id,
                    "language": { "code": language },
                });
                if !variables.is_empty() {
                    let parameters: Vec<Value> = variables
                        .iter()
                        .map(|v| json!({ "type": "text", "text": v }))
                        .collect();
                    template["components"] = json!([{ "type": "body", "parameters": parameters }]);
                }
                json!({ "type": "template", "template": template })
            },
        }
    }
}

/// Something a builder changed to fit provider limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildWarning {
    TextTruncated { original_chars: usize, limit: usize },
    ButtonsTruncated { supplied: usize, kept: usize },
    ButtonTitleTruncated { index: usize, original_chars: usize },
    CaptionTruncated { original_chars: usize, limit: usize },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TextTruncated {
                original_chars,
                limit,
            } => write!(f, "text truncated from {original_chars} to {limit} characters"),
            Self::ButtonsTruncated { supplied, kept } => {
                write!(f, "{supplied} buttons supplied, only the first {kept} kept")
            },
            Self::ButtonTitleTruncated {
                index,
                original_chars,
            } => write!(
                f,
                "button {} title truncated from {original_chars} to {MAX_BUTTON_TITLE_CHARS} characters",
                index + 1
            ),
            Self::CaptionTruncated {
                original_chars,
                limit,
            } => write!(
                f,
                "caption truncated from {original_chars} to {limit} characters"
            ),
        }
    }
}

/// A built value plus any limit adjustments made along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Built<T> {
    pub message: T,
    pub warnings: Vec<BuildWarning>,
}

impl<T> Built<T> {
    fn clean(message: T) -> Self {
        Self {
            message,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageBuilder {
    default_locale: String,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_LOCALE)
    }
}

impl MessageBuilder {
    #[must_use]
    pub fn new(default_locale: impl Into<String>) -> Self {
        let default_locale = default_locale.into();
        let default_locale = if default_locale.trim().is_empty() {
            DEFAULT_LOCALE.to_string()
        } else {
            default_locale.trim().to_string()
        };
        Self { default_locale }
    }

    #[must_use]
    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn build_text(&self, body: &str) -> Result<Built<OutboundMessage>> {
        if body.trim().is_empty() {
            return Err(Error::invalid_message("text body is empty"));
        }
        let mut warnings = Vec::new();
        let body = truncate_chars(body, MAX_TEXT_CHARS, |original_chars| {
            warnings.push(BuildWarning::TextTruncated {
                original_chars,
                limit: MAX_TEXT_CHARS,
            });
        });
        Ok(Built {
            message: OutboundMessage::new(Payload::Text { body }),
            warnings,
        })
    }

    pub fn build_template<S: AsRef<str>>(
        &self,
        template_id: &str,
        variables: &[S],
        language: Option<&str>,
    ) -> Result<Built<OutboundMessage>> {
        let template_id = template_id.trim();
        if template_id.is_empty() {
            return Err(Error::invalid_message("template id is empty"));
        }
        let language = language
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(&self.default_locale);
        Ok(Built::clean(OutboundMessage::new(Payload::Template {
            template_id: template_id.to_string(),
            language: language.to_string(),
            variables: variables.iter().map(|v| v.as_ref().to_string()).collect(),
        })))
    }

    pub fn build_interactive_buttons(
        &self,
        body: &str,
        buttons: Vec<ButtonSpec>,
    ) -> Result<Built<OutboundMessage>> {
        if body.trim().is_empty() {
            return Err(Error::invalid_message("interactive body is empty"));
        }
        if buttons.is_empty() {
            return Err(Error::invalid_message(
                "interactive message needs at least one button",
            ));
        }

        let mut warnings = Vec::new();
        let body = truncate_chars(body, MAX_INTERACTIVE_BODY_CHARS, |original_chars| {
            warnings.push(BuildWarning::TextTruncated {
                original_chars,
                limit: MAX_INTERACTIVE_BODY_CHARS,
            });
        });

        let supplied = buttons.len();
        if supplied > MAX_BUTTONS {
            warnings.push(BuildWarning::ButtonsTruncated {
                supplied,
                kept: MAX_BUTTONS,
            });
        }

        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(MAX_BUTTONS);
        for (index, spec) in buttons.into_iter().take(MAX_BUTTONS).enumerate() {
            let title = spec.title.trim();
            if title.is_empty() {
                return Err(Error::invalid_message(format!(
                    "button {} has an empty title",
                    index + 1
                )));
            }
            let title = truncate_chars(title, MAX_BUTTON_TITLE_CHARS, |original_chars| {
                warnings.push(BuildWarning::ButtonTitleTruncated {
                    index,
                    original_chars,
                });
            });
            let id = match spec.id.as_deref().map(str::trim) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => format!("btn_{}", index + 1),
            };
            if !seen.insert(id.clone()) {
                return Err(Error::invalid_message(format!("duplicate button id \"{id}\"")));
            }
            kept.push(Button { id, title });
        }

        Ok(Built {
            message: OutboundMessage::new(Payload::InteractiveButtons {
                body,
                buttons: kept,
            }),
            warnings,
        })
    }

    pub fn build_image(&self, url: &str, caption: Option<&str>) -> Result<Built<OutboundMessage>> {
        let parsed = Url::parse(url.trim())
            .map_err(|e| Error::invalid_message(format!("invalid image URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::invalid_message(format!(
                "image URL must be http or https, got \"{}\"",
                parsed.scheme()
            )));
        }

        let mut warnings = Vec::new();
        let caption = caption.filter(|c| !c.trim().is_empty()).map(|c| {
            truncate_chars(c, MAX_CAPTION_CHARS, |original_chars| {
                warnings.push(BuildWarning::CaptionTruncated {
                    original_chars,
                    limit: MAX_CAPTION_CHARS,
                });
            })
        });

        Ok(Built {
            message: OutboundMessage::new(Payload::Image {
                url: parsed.to_string(),
                caption,
            }),
            warnings,
        })
    }
}

/// Cut `text` to `limit` characters, calling `on_truncate` with the original
/// length when anything was dropped.
fn truncate_chars(text: &str, limit: usize, on_truncate: impl FnOnce(usize)) -> String {
    let count = text.chars().count();
    if count <= limit {
        return text.to_string();
    }
    on_truncate(count);
    text.chars().take(limit).collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    #[test]
    fn text_wire_format() {
        let built = builder().build_text("Olá!").unwrap();
        assert!(built.warnings.is_empty());
        assert_eq!(
            built.message.to_wire(),
            json!({"type": "text", "text": {"body": "Olá!"}})
        );
    }

    #[rstest]
    #[case("")]
    #[case("   \n")]
    fn blank_text_rejected(#[case] body: &str) {
        assert!(matches!(
            builder().build_text(body),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn long_text_truncated_by_chars() {
        let body = "é".repeat(MAX_TEXT_CHARS + 10);
        let built = builder().build_text(&body).unwrap();
        let body = built.message.body().unwrap();
        assert_eq!(built.message.kind(), "text");
        assert_eq!(body.chars().count(), MAX_TEXT_CHARS);
        assert_eq!(built.warnings, vec![BuildWarning::TextTruncated {
            original_chars: MAX_TEXT_CHARS + 10,
            limit: MAX_TEXT_CHARS,
        }]);
    }

    #[test]
    fn five_buttons_keep_three_with_short_titles() {
        let buttons: Vec<ButtonSpec> = [
            "Confirmar presença na consulta",
            "Remarcar",
            "Cancelar agendamento agora",
            "Falar com atendente",
            "Sair",
        ]
        .into_iter()
        .map(ButtonSpec::from)
        .collect();

        let built = builder()
            .build_interactive_buttons("Escolha uma opção", buttons)
            .unwrap();
        let buttons = built.message.buttons();
        assert_eq!(buttons.len(), 3);
        assert!(buttons
            .iter()
            .all(|b| b.title.chars().count() <= MAX_BUTTON_TITLE_CHARS));
        assert_eq!(
            buttons.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            ["btn_1", "btn_2", "btn_3"]
        );
        assert!(built.warnings.contains(&BuildWarning::ButtonsTruncated {
            supplied: 5,
            kept: 3
        }));
        assert!(built.warnings.contains(&BuildWarning::ButtonTitleTruncated {
            index: 0,
            original_chars: 30
        }));
    }

    #[test]
    fn interactive_wire_format() {
        let built = builder()
            .build_interactive_buttons("Confirma?", vec![
                ButtonSpec::with_id("yes", "Sim"),
                ButtonSpec::new("Não"),
            ])
            .unwrap();
        assert_eq!(
            built.message.to_wire(),
            json!({
                "type": "interactive",
                "interactive": {
                    "type": "button",
                    "body": {"text": "Confirma?"},
                    "action": {"buttons": [
                        {"type": "reply", "reply": {"id": "yes", "title": "Sim"}},
                        {"type": "reply", "reply": {"id": "btn_2", "title": "Não"}},
                    ]},
                },
            })
        );
    }

    #[test]
    fn duplicate_button_ids_rejected() {
        let err = builder()
            .build_interactive_buttons("Pick", vec![
                ButtonSpec::with_id("btn_2", "A"),
                ButtonSpec::new("B"),
            ])
            .unwrap_err();
        assert!(err.to_string().contains("btn_2"));
    }

    #[test]
    fn interactive_requires_buttons_and_body() {
        assert!(builder().build_interactive_buttons("Body", vec![]).is_err());
        assert!(
            builder()
                .build_interactive_buttons(" ", vec![ButtonSpec::new("A")])
                .is_err()
        );
        assert!(
            builder()
                .build_interactive_buttons("Body", vec![ButtonSpec::new("  ")])
                .is_err()
        );
    }

    #[test]
    fn template_defaults_locale_and_omits_empty_components() {
        let built = builder()
            .build_template::<&str>("appointment_reminder", &[], None)
            .unwrap();
        assert_eq!(
            built.message.to_wire(),
            json!({
                "type": "template",
                "template": {"name": "appointment_reminder", "language": {"code": "pt_BR"}},
            })
        );
    }

    #[test]
    fn template_with_variables() {
        let built = MessageBuilder::new("en_US")
            .build_template("reminder", &["Ana", "10:00"], Some("es"))
            .unwrap();
        assert_eq!(
            built.message.to_wire()["template"],
            json!({
                "name": "reminder",
                "language": {"code": "es"},
                "components": [{"type": "body", "parameters": [
                    {"type": "text", "text": "Ana"},
                    {"type": "text", "text": "10:00"},
                ]}],
            })
        );
    }

    #[test]
    fn template_requires_id() {
        assert!(builder().build_template::<&str>("  ", &[], None).is_err());
    }

    #[rstest]
    #[case("not a url")]
    #[case("ftp://example.com/a.png")]
    #[case("file:///etc/passwd")]
    fn image_requires_http_url(#[case] url: &str) {
        assert!(matches!(
            builder().build_image(url, None),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn image_caption_truncated() {
        let caption = "c".repeat(MAX_CAPTION_CHARS + 1);
        let built = builder()
            .build_image("https://cdn.example.com/a.png", Some(&caption))
            .unwrap();
        assert_eq!(built.warnings, vec![BuildWarning::CaptionTruncated {
            original_chars: MAX_CAPTION_CHARS + 1,
            limit: MAX_CAPTION_CHARS,
        }]);
        let wire = built.message.to_wire();
        assert_eq!(wire["image"]["link"], "https://cdn.example.com/a.png");
        assert_eq!(
            wire["image"]["caption"].as_str().unwrap().chars().count(),
            MAX_CAPTION_CHARS
        );
    }

    #[test]
    fn image_without_caption_omits_field() {
        let built = builder()
            .build_image("https://cdn.example.com/a.png", None)
            .unwrap();
        assert!(built.message.to_wire()["image"].get("caption").is_none());
    }
}
