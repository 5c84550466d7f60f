//! Rendered message model shared by the engine and platform clients.
//!
//! A [`RenderedMessage`] is a snapshot of a remote, editable chat message. Its
//! content is always derived from persisted state and is never treated as
//! authoritative.

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "snake_case")]
/// Identity that authored a remote message.
pub enum MessageAuthor {
    #[default]
    Bot,
    Webhook,
}

impl MessageAuthor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bot => "bot",
            Self::Webhook => "webhook",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    #[default]
    Primary,
    Secondary,
    Success,
    Danger,
}

impl ButtonStyle {
    /// Numeric style code used on the wire.
    pub fn code(self) -> u8 {
        match self {
            Self::Primary => 1,
            Self::Secondary => 2,
            Self::Success => 3,
            Self::Danger => 4,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            2 => Self::Secondary,
            3 => Self::Success,
            4 => Self::Danger,
            _ => Self::Primary,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
/// Data carried by an interactive button; layout is the platform's concern.
pub struct Button {
    pub custom_id: String,
    pub label: String,
    #[serde(default)]
    pub style: ButtonStyle,
    #[serde(default)]
    pub disabled: bool,
}

impl Button {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>, style: ButtonStyle) -> Self {
        Self {
            custom_id: custom_id.into(),
            label: label.into(),
            style,
            disabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
/// Full visible content of a message: what a re-render produces.
pub struct MessagePayload {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub components: Vec<Button>,
}

impl MessagePayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
/// Snapshot of one remote message.
pub struct RenderedMessage {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub author: MessageAuthor,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub components: Vec<Button>,
}

impl RenderedMessage {
    /// Returns the first line of the text content, trimmed.
    pub fn header_line(&self) -> &str {
        self.content.lines().next().unwrap_or_default().trim()
    }

    pub fn is_webhook_owned(&self) -> bool {
        self.author == MessageAuthor::Webhook
    }

    /// Builds the snapshot a successful edit of this message would produce.
    pub fn with_payload(&self, payload: &MessagePayload) -> Self {
        Self {
            id: self.id.clone(),
            channel_id: self.channel_id.clone(),
            author: self.author,
            content: payload.content.clone(),
            embeds: payload.embeds.clone(),
            components: payload.components.clone(),
        }
    }

    /// Returns only the visible content, dropping identity fields.
    pub fn payload(&self) -> MessagePayload {
        MessagePayload {
            content: self.content.clone(),
            embeds: self.embeds.clone(),
            components: self.components.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq)]
/// Short-lived handle for replying to one user interaction.
pub struct Interaction {
    pub id: String,
    pub application_id: String,
    pub token: String,
}

impl Interaction {
    pub fn new(
        id: impl Into<String>,
        application_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            application_id: application_id.into(),
            token: token.into(),
        }
    }
}

impl PartialEq for Interaction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Channel-scoped credential for the secondary (webhook) identity.
pub struct WebhookCredential {
    pub id: String,
    pub token: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Sender identity used for one remote call.
pub enum DeliveryIdentity {
    Bot,
    Webhook(WebhookCredential),
}

impl DeliveryIdentity {
    pub fn author(&self) -> MessageAuthor {
        match self {
            Self::Bot => MessageAuthor::Bot,
            Self::Webhook(_) => MessageAuthor::Webhook,
        }
    }
}
