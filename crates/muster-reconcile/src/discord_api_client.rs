//! Discord REST implementation of the chat-platform contract.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use muster_core::{
    Button, ButtonStyle, ChatPlatform, DeliveryIdentity, Embed, EmbedField, Interaction,
    MessageAuthor, MessagePayload, PlatformError, RenderedMessage, WebhookCredential,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::DiscordApiConfig;

const MAX_HISTORY_PAGE: usize = 100;
const BUTTONS_PER_ROW: usize = 5;
const MAX_ACTION_ROWS: usize = 5;
const ACTION_ROW_TYPE: u8 = 1;
const BUTTON_TYPE: u8 = 2;

#[derive(Debug, Clone, Deserialize)]
struct DiscordMessage {
    id: String,
    channel_id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    webhook_id: Option<String>,
    #[serde(default)]
    application_id: Option<String>,
    #[serde(default)]
    embeds: Vec<DiscordEmbed>,
    #[serde(default)]
    components: Vec<DiscordActionRow>,
}

impl DiscordMessage {
    /// Interaction responses carry the application id as `webhook_id` but are
    /// editable only through the bot identity.
    fn author(&self) -> MessageAuthor {
        match self.webhook_id.as_deref() {
            Some(webhook_id) if self.application_id.as_deref() != Some(webhook_id) => {
                MessageAuthor::Webhook
            }
            _ => MessageAuthor::Bot,
        }
    }

    fn into_rendered(self) -> RenderedMessage {
        RenderedMessage {
            author: self.author(),
            id: self.id,
            channel_id: self.channel_id,
            content: self.content,
            embeds: self.embeds.into_iter().map(DiscordEmbed::into_embed).collect(),
            components: self
                .components
                .into_iter()
                .flat_map(|row| row.components)
                .filter(|component| component.kind == BUTTON_TYPE)
                .filter_map(DiscordComponent::into_button)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DiscordEmbed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<DiscordEmbedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    footer: Option<DiscordEmbedFooter>,
}

impl DiscordEmbed {
    fn from_embed(embed: &Embed) -> Self {
        Self {
            title: embed.title.clone(),
            description: embed.description.clone(),
            url: embed.url.clone(),
            fields: embed
                .fields
                .iter()
                .map(|field| DiscordEmbedField {
                    name: field.name.clone(),
                    value: field.value.clone(),
                    inline: field.inline,
                })
                .collect(),
            footer: embed
                .footer
                .clone()
                .map(|text| DiscordEmbedFooter { text }),
        }
    }

    fn into_embed(self) -> Embed {
        Embed {
            title: self.title,
            description: self.description,
            url: self.url,
            fields: self
                .fields
                .into_iter()
                .map(|field| EmbedField::new(field.name, field.value, field.inline))
                .collect(),
            footer: self.footer.map(|footer| footer.text),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiscordEmbedField {
    name: String,
    value: String,
    #[serde(default)]
    inline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiscordEmbedFooter {
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiscordActionRow {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    components: Vec<DiscordComponent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiscordComponent {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    style: Option<u8>,
    #[serde(default)]
    disabled: bool,
}

impl DiscordComponent {
    fn from_button(button: &Button) -> Self {
        Self {
            kind: BUTTON_TYPE,
            custom_id: Some(button.custom_id.clone()),
            label: Some(button.label.clone()),
            style: Some(button.style.code()),
            disabled: button.disabled,
        }
    }

    /// Link buttons carry no custom id and are not modelled.
    fn into_button(self) -> Option<Button> {
        Some(Button {
            custom_id: self.custom_id?,
            label: self.label.unwrap_or_default(),
            style: ButtonStyle::from_code(self.style.unwrap_or(1)),
            disabled: self.disabled,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct DiscordAllowedMentions {
    parse: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct DiscordMessageBody {
    content: String,
    embeds: Vec<DiscordEmbed>,
    components: Vec<DiscordActionRow>,
    allowed_mentions: DiscordAllowedMentions,
}

impl DiscordMessageBody {
    fn from_payload(payload: &MessagePayload) -> Self {
        Self {
            content: payload.content.clone(),
            embeds: payload.embeds.iter().map(DiscordEmbed::from_embed).collect(),
            components: payload
                .components
                .chunks(BUTTONS_PER_ROW)
                .take(MAX_ACTION_ROWS)
                .map(|buttons| DiscordActionRow {
                    kind: ACTION_ROW_TYPE,
                    components: buttons.iter().map(DiscordComponent::from_button).collect(),
                })
                .collect(),
            allowed_mentions: DiscordAllowedMentions { parse: Vec::new() },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordWebhook {
    id: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordErrorBody {
    #[serde(default)]
    code: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

/// Bot- and webhook-authenticated Discord REST client with bounded retries.
#[derive(Clone)]
pub struct DiscordApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: Option<String>,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl DiscordApiClient {
    pub fn new(config: &DiscordApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("muster-reconcile"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create discord api client")?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config
                .bot_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    fn bot_authorization(&self) -> Result<String, PlatformError> {
        self.bot_token
            .as_deref()
            .map(|token| format!("Bot {token}"))
            .ok_or_else(|| PlatformError::MissingCredential("discord bot token".to_string()))
    }

    fn message_url(
        &self,
        identity: &DeliveryIdentity,
        channel_id: &str,
        message_id: &str,
    ) -> String {
        match identity {
            DeliveryIdentity::Bot => format!(
                "{}/channels/{}/messages/{}",
                self.api_base, channel_id, message_id
            ),
            DeliveryIdentity::Webhook(credential) => format!(
                "{}/webhooks/{}/{}/messages/{}",
                self.api_base, credential.id, credential.token, message_id
            ),
        }
    }

    fn interaction_reply_url(&self, interaction: &Interaction) -> String {
        format!(
            "{}/webhooks/{}/{}/messages/@original",
            self.api_base, interaction.application_id, interaction.token
        )
    }

    /// Bot header value for bot-identity calls; webhook urls carry their own token.
    fn identity_authorization(
        &self,
        identity: &DeliveryIdentity,
    ) -> Result<Option<String>, PlatformError> {
        match identity {
            DeliveryIdentity::Bot => self.bot_authorization().map(Some),
            DeliveryIdentity::Webhook(_) => Ok(None),
        }
    }

    async fn request_json<T, F>(&self, operation: &str, builder: F) -> Result<T, PlatformError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        self.request_json_with_attempts(operation, self.retry_max_attempts, builder)
            .await
    }

    async fn request_json_with_attempts<T, F>(
        &self,
        operation: &str,
        max_attempts: usize,
        builder: F,
    ) -> Result<T, PlatformError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let response = self.send(operation, max_attempts, builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|error| PlatformError::Decode(format!("discord {operation}: {error}")))
    }

    async fn send<F>(
        &self,
        operation: &str,
        max_attempts: usize,
        mut builder: F,
    ) -> Result<reqwest::Response, PlatformError>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            match builder().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    let error = api_error(status.as_u16(), &body);
                    if attempt < max_attempts && error.is_retryable() {
                        tracing::debug!(
                            operation,
                            attempt,
                            status = status.as_u16(),
                            "retrying discord request"
                        );
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }
                    return Err(error);
                }
                Err(error) => {
                    if attempt < max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(PlatformError::Transport(format!(
                        "discord {operation} request failed: {error}"
                    )));
                }
            }
        }
    }

    async fn list_channel_webhooks(
        &self,
        channel_id: &str,
    ) -> Result<Vec<DiscordWebhook>, PlatformError> {
        let authorization = self.bot_authorization()?;
        let url = format!("{}/channels/{}/webhooks", self.api_base, channel_id);
        self.request_json("list channel webhooks", || {
            self.http
                .get(&url)
                .header(AUTHORIZATION, authorization.as_str())
        })
        .await
    }
}

#[async_trait]
impl ChatPlatform for DiscordApiClient {
    async fn fetch_message(
        &self,
        identity: &DeliveryIdentity,
        channel_id: &str,
        message_id: &str,
    ) -> Result<RenderedMessage, PlatformError> {
        let url = self.message_url(identity, channel_id, message_id);
        let authorization = self.identity_authorization(identity)?;
        let message: DiscordMessage = self
            .request_json("fetch message", || {
                with_authorization(self.http.get(&url), authorization.as_deref())
            })
            .await?;
        Ok(message.into_rendered())
    }

    async fn edit_message(
        &self,
        identity: &DeliveryIdentity,
        channel_id: &str,
        message_id: &str,
        payload: &MessagePayload,
    ) -> Result<RenderedMessage, PlatformError> {
        let url = self.message_url(identity, channel_id, message_id);
        let authorization = self.identity_authorization(identity)?;
        let body = DiscordMessageBody::from_payload(payload);
        let message: DiscordMessage = self
            .request_json("edit message", || {
                with_authorization(self.http.patch(&url).json(&body), authorization.as_deref())
            })
            .await?;
        Ok(message.into_rendered())
    }

    async fn send_message(
        &self,
        identity: &DeliveryIdentity,
        channel_id: &str,
        payload: &MessagePayload,
    ) -> Result<RenderedMessage, PlatformError> {
        let url = match identity {
            DeliveryIdentity::Bot => format!("{}/channels/{}/messages", self.api_base, channel_id),
            DeliveryIdentity::Webhook(credential) => format!(
                "{}/webhooks/{}/{}?wait=true",
                self.api_base, credential.id, credential.token
            ),
        };
        let authorization = self.identity_authorization(identity)?;
        let body = DiscordMessageBody::from_payload(payload);
        let message: DiscordMessage = self
            .request_json("send message", || {
                with_authorization(self.http.post(&url).json(&body), authorization.as_deref())
            })
            .await?;
        Ok(message.into_rendered())
    }

    async fn list_recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<RenderedMessage>, PlatformError> {
        let authorization = self.bot_authorization()?;
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let limit = limit.clamp(1, MAX_HISTORY_PAGE).to_string();
        let messages: Vec<DiscordMessage> = self
            .request_json("list recent messages", || {
                self.http
                    .get(&url)
                    .header(AUTHORIZATION, authorization.as_str())
                    .query(&[("limit", limit.as_str())])
            })
            .await?;
        Ok(messages
            .into_iter()
            .map(DiscordMessage::into_rendered)
            .collect())
    }

    async fn fetch_or_create_channel_webhook(
        &self,
        channel_id: &str,
        name: &str,
    ) -> Result<WebhookCredential, PlatformError> {
        let existing = self
            .list_channel_webhooks(channel_id)
            .await?
            .into_iter()
            .find_map(|webhook| {
                let token = webhook.token?;
                (webhook.name.as_deref() == Some(name)).then(|| WebhookCredential {
                    id: webhook.id,
                    token,
                    channel_id: webhook
                        .channel_id
                        .unwrap_or_else(|| channel_id.to_string()),
                })
            });
        if let Some(credential) = existing {
            return Ok(credential);
        }

        let authorization = self.bot_authorization()?;
        let url = format!("{}/channels/{}/webhooks", self.api_base, channel_id);
        let body = serde_json::json!({ "name": name });
        // Single attempt: a retried create can leave a duplicate webhook behind.
        let created: DiscordWebhook = self
            .request_json_with_attempts("create channel webhook", 1, || {
                self.http
                    .post(&url)
                    .header(AUTHORIZATION, authorization.as_str())
                    .json(&body)
            })
            .await?;
        tracing::debug!(channel_id, webhook_id = %created.id, "created channel webhook");
        let token = created.token.ok_or_else(|| {
            PlatformError::Decode("created webhook response did not include a token".to_string())
        })?;
        Ok(WebhookCredential {
            id: created.id,
            token,
            channel_id: created
                .channel_id
                .unwrap_or_else(|| channel_id.to_string()),
        })
    }

    async fn edit_interaction_reply(
        &self,
        interaction: &Interaction,
        payload: &MessagePayload,
    ) -> Result<RenderedMessage, PlatformError> {
        let url = self.interaction_reply_url(interaction);
        let body = DiscordMessageBody::from_payload(payload);
        let message: DiscordMessage = self
            .request_json("edit interaction reply", || self.http.patch(&url).json(&body))
            .await?;
        let mut reply = message.into_rendered();
        reply.author = MessageAuthor::Bot;
        Ok(reply)
    }

    async fn delete_interaction_reply(
        &self,
        interaction: &Interaction,
    ) -> Result<(), PlatformError> {
        let url = self.interaction_reply_url(interaction);
        self.send("delete interaction reply", self.retry_max_attempts, || {
            self.http.delete(&url)
        })
        .await?;
        Ok(())
    }
}

fn with_authorization(
    request: reqwest::RequestBuilder,
    authorization: Option<&str>,
) -> reqwest::RequestBuilder {
    match authorization {
        Some(value) => request.header(AUTHORIZATION, value),
        None => request,
    }
}

fn api_error(status: u16, body: &str) -> PlatformError {
    match serde_json::from_str::<DiscordErrorBody>(body) {
        Ok(parsed) => PlatformError::api(
            status,
            parsed.code,
            parsed
                .message
                .unwrap_or_else(|| truncate_for_error(body, 400)),
        ),
        Err(_) => PlatformError::api(status, None, truncate_for_error(body, 400)),
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get("retry-after")?.to_str().ok()?;
    let seconds = raw.trim().parse::<f64>().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds.min(300.0)))
}

fn retry_delay(base_delay_ms: u64, attempt: usize, retry_after: Option<Duration>) -> Duration {
    if let Some(delay) = retry_after {
        return delay.max(Duration::from_millis(base_delay_ms));
    }
    let exponent = attempt.saturating_sub(1).min(10) as u32;
    let scaled = base_delay_ms.saturating_mul(2_u64.saturating_pow(exponent));
    Duration::from_millis(scaled.min(30_000))
}

fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use httpmock::Method::{DELETE, GET, PATCH, POST};
    use httpmock::MockServer;
    use serde_json::json;

    use super::*;

    fn client(server: &MockServer) -> DiscordApiClient {
        DiscordApiClient::new(&DiscordApiConfig {
            api_base: server.base_url(),
            bot_token: Some("discord-token".to_string()),
            request_timeout_ms: 2_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 1,
        })
        .expect("client")
    }

    fn webhook() -> DeliveryIdentity {
        DeliveryIdentity::Webhook(WebhookCredential {
            id: "hook-1".to_string(),
            token: "hook-token".to_string(),
            channel_id: "room-1".to_string(),
        })
    }

    #[tokio::test]
    async fn functional_bot_edit_sends_payload_and_decodes_message() {
        let server = MockServer::start();
        let edit = server.mock(|when, then| {
            when.method(PATCH)
                .path("/channels/room-1/messages/m-1")
                .header("authorization", "Bot discord-token")
                .json_body(json!({
                    "content": "**Preparation status**",
                    "embeds": [],
                    "components": [{
                        "type": 1,
                        "components": [{
                            "type": 2,
                            "custom_id": "prep:refresh",
                            "label": "Refresh",
                            "style": 1,
                            "disabled": false
                        }]
                    }],
                    "allowed_mentions": {"parse": []}
                }));
            then.status(200).json_body(json!({
                "id": "m-1",
                "channel_id": "room-1",
                "content": "**Preparation status**",
                "embeds": [],
                "components": [{
                    "type": 1,
                    "components": [{"type": 2, "custom_id": "prep:refresh", "label": "Refresh", "style": 1}]
                }]
            }));
        });

        let payload = MessagePayload {
            content: "**Preparation status**".to_string(),
            embeds: Vec::new(),
            components: vec![Button::new("prep:refresh", "Refresh", ButtonStyle::Primary)],
        };
        let message = client(&server)
            .edit_message(&DeliveryIdentity::Bot, "room-1", "m-1", &payload)
            .await
            .expect("edit");

        edit.assert_calls(1);
        assert_eq!(message.author, MessageAuthor::Bot);
        assert_eq!(message.components, payload.components);
    }

    #[tokio::test]
    async fn functional_webhook_fetch_uses_webhook_route_without_bot_header() {
        let server = MockServer::start();
        let fetch = server.mock(|when, then| {
            when.method(GET).path("/webhooks/hook-1/hook-token/messages/m-2");
            then.status(200).json_body(json!({
                "id": "m-2",
                "channel_id": "room-1",
                "webhook_id": "hook-1",
                "content": "",
                "embeds": [{
                    "title": "Raid",
                    "url": "https://discord.com/events/1/2",
                    "footer": {"text": "event #42"},
                    "fields": [{"name": "Location", "value": "Main hall", "inline": true}]
                }]
            }));
        });

        let message = client(&server)
            .fetch_message(&webhook(), "room-1", "m-2")
            .await
            .expect("fetch");

        fetch.assert_calls(1);
        assert_eq!(message.author, MessageAuthor::Webhook);
        assert_eq!(message.embeds[0].footer.as_deref(), Some("event #42"));
        assert_eq!(message.embeds[0].fields[0].value, "Main hall");
    }

    #[tokio::test]
    async fn regression_server_errors_retry_until_attempts_exhausted() {
        let server = MockServer::start();
        let failing = server.mock(|when, then| {
            when.method(GET).path("/channels/room-1/messages/m-3");
            then.status(502).body("bad gateway");
        });

        let error = client(&server)
            .fetch_message(&DeliveryIdentity::Bot, "room-1", "m-3")
            .await
            .expect_err("exhausted retries");

        failing.assert_calls(3);
        assert!(matches!(error, PlatformError::Api { status: 502, .. }));
    }

    #[tokio::test]
    async fn functional_unknown_interaction_maps_error_code_without_retry() {
        let server = MockServer::start();
        let expired = server.mock(|when, then| {
            when.method(PATCH).path("/webhooks/app-1/expired-token/messages/@original");
            then.status(404)
                .json_body(json!({"code": 10062, "message": "Unknown interaction"}));
        });

        let interaction = Interaction::new("i-1", "app-1", "expired-token");
        let error = client(&server)
            .edit_interaction_reply(&interaction, &MessagePayload::text("late"))
            .await
            .expect_err("expired token");

        expired.assert_calls(1);
        assert!(error.is_unknown_interaction());
    }

    #[tokio::test]
    async fn functional_existing_named_webhook_is_reused() {
        let server = MockServer::start();
        let list = server.mock(|when, then| {
            when.method(GET)
                .path("/channels/room-1/webhooks")
                .header("authorization", "Bot discord-token");
            then.status(200).json_body(json!([
                {"id": "other", "name": "someone else", "token": "x", "channel_id": "room-1"},
                {"id": "hook-1", "name": "muster", "token": "hook-token", "channel_id": "room-1"}
            ]));
        });
        let create = server.mock(|when, then| {
            when.method(POST).path("/channels/room-1/webhooks");
            then.status(200).json_body(json!({"id": "new", "token": "t"}));
        });

        let credential = client(&server)
            .fetch_or_create_channel_webhook("room-1", "muster")
            .await
            .expect("webhook");

        list.assert_calls(1);
        create.assert_calls(0);
        assert_eq!(credential.id, "hook-1");
        assert_eq!(credential.token, "hook-token");
    }

    #[tokio::test]
    async fn functional_missing_webhook_is_created_once() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/channels/room-1/webhooks");
            then.status(200).json_body(json!([]));
        });
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/channels/room-1/webhooks")
                .json_body(json!({"name": "muster"}));
            then.status(200)
                .json_body(json!({"id": "hook-9", "token": "fresh", "channel_id": "room-1"}));
        });

        let credential = client(&server)
            .fetch_or_create_channel_webhook("room-1", "muster")
            .await
            .expect("webhook");

        create.assert_calls(1);
        assert_eq!(credential.id, "hook-9");
    }

    #[tokio::test]
    async fn regression_interaction_response_in_history_is_bot_owned() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/channels/room-1/messages")
                .query_param("limit", "2");
            then.status(200).json_body(json!([
                {
                    "id": "m-5",
                    "channel_id": "room-1",
                    "webhook_id": "app-1",
                    "application_id": "app-1",
                    "content": "**Preparation status**"
                },
                {
                    "id": "m-4",
                    "channel_id": "room-1",
                    "webhook_id": "hook-1",
                    "application_id": "app-1",
                    "content": "**Upcoming events**"
                }
            ]));
        });

        let messages = client(&server)
            .list_recent_messages("room-1", 2)
            .await
            .expect("history");

        assert_eq!(messages[0].author, MessageAuthor::Bot);
        assert_eq!(messages[1].author, MessageAuthor::Webhook);
    }

    #[tokio::test]
    async fn functional_history_listing_clamps_page_size() {
        let server = MockServer::start();
        let list = server.mock(|when, then| {
            when.method(GET)
                .path("/channels/room-1/messages")
                .query_param("limit", "100");
            then.status(200).json_body(json!([
                {"id": "m-9", "channel_id": "room-1", "content": "newest"},
                {"id": "m-8", "channel_id": "room-1", "content": "older"}
            ]));
        });

        let messages = client(&server)
            .list_recent_messages("room-1", 500)
            .await
            .expect("history");

        list.assert_calls(1);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "m-9");
    }

    #[tokio::test]
    async fn functional_delete_interaction_reply_accepts_no_content() {
        let server = MockServer::start();
        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/webhooks/app-1/tok/messages/@original");
            then.status(204);
        });

        client(&server)
            .delete_interaction_reply(&Interaction::new("i-2", "app-1", "tok"))
            .await
            .expect("delete");
        delete.assert_calls(1);
    }

    #[tokio::test]
    async fn regression_missing_bot_token_fails_before_any_request() {
        let server = MockServer::start();
        let any = server.mock(|when, then| {
            when.method(GET).path("/channels/room-1/messages");
            then.status(200).json_body(json!([]));
        });
        let client = DiscordApiClient::new(&DiscordApiConfig {
            api_base: server.base_url(),
            bot_token: Some("   ".to_string()),
            ..DiscordApiConfig::default()
        })
        .expect("client");

        let error = client
            .list_recent_messages("room-1", 10)
            .await
            .expect_err("no token");
        assert!(matches!(error, PlatformError::MissingCredential(_)));
        any.assert_calls(0);
    }

    #[test]
    fn unit_retry_delay_prefers_retry_after_and_caps_backoff() {
        assert_eq!(
            retry_delay(100, 1, Some(Duration::from_millis(1_500))),
            Duration::from_millis(1_500)
        );
        assert_eq!(retry_delay(100, 3, None), Duration::from_millis(400));
        assert_eq!(retry_delay(10_000, 10, None), Duration::from_millis(30_000));
    }
}
