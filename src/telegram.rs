// src/telegram.rs
//! Telegram Bot API client and update types.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{InlineArticle, MessageRef, MessagingGateway, Outgoing};

/// Seconds Telegram holds a `getUpdates` request open.
pub const LONG_POLL_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl User {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

/// The part of a callback's message we need, present even when Telegram
/// marks the message inaccessible.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackMessage {
    pub message_id: i64,
    pub chat: Chat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<CallbackMessage>,
    pub inline_message_id: Option<String>,
    pub data: Option<String>,
}

impl CallbackQuery {
    /// The message carrying the pressed button.
    pub fn origin(&self) -> Option<MessageRef> {
        if let Some(id) = &self.inline_message_id {
            return Some(MessageRef::Inline(id.clone()));
        }
        self.message.as_ref().map(|m| MessageRef::Chat {
            chat_id: m.chat.id,
            message_id: m.message_id,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InlineQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
    pub inline_query: Option<InlineQuery>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> GatewayResult<T> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(GatewayError::Api {
                code: self.error_code.unwrap_or_default(),
                description: self
                    .description
                    .unwrap_or_else(|| "empty response".to_string()),
            }),
        }
    }
}

/// Editing a message to identical content is reported as an error by
/// Telegram; for us it just means the tally didn't change.
fn is_not_modified(err: &GatewayError) -> bool {
    matches!(err, GatewayError::Api { code: 400, description } if description.contains("message is not modified"))
}

fn message_body(message: &Outgoing) -> serde_json::Map<String, Value> {
    let mut body = serde_json::Map::new();
    body.insert("text".to_string(), json!(message.text));
    if let Some(mode) = message.parse_mode {
        body.insert("parse_mode".to_string(), json!(mode));
    }
    if let Some(keyboard) = &message.keyboard {
        body.insert("reply_markup".to_string(), json!(keyboard));
    }
    body
}

#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> GatewayResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<P, R>(&self, method: &str, params: &P, timeout: Option<Duration>) -> GatewayResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .json(params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response: ApiResponse<R> = request.send().await?.json().await?;
        debug!(method, ok = response.ok, "Bot API call");
        response.into_result()
    }

    pub async fn get_me(&self) -> GatewayResult<User> {
        self.call("getMe", &json!({}), None).await
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64) -> GatewayResult<Vec<Update>> {
        let params = json!({
            "offset": offset,
            "timeout": LONG_POLL_SECS,
            "allowed_updates": ["message", "callback_query", "inline_query"],
        });
        let timeout = Duration::from_secs(LONG_POLL_SECS + 5);
        self.call("getUpdates", &params, Some(timeout)).await
    }

    /// Required before `getUpdates` works again after a webhook was set.
    pub async fn delete_webhook(&self) -> GatewayResult<bool> {
        self.call("deleteWebhook", &json!({}), None).await
    }

    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> GatewayResult<bool> {
        let mut params = json!({ "url": url });
        if let Some(secret) = secret {
            params["secret_token"] = json!(secret);
        }
        self.call("setWebhook", &params, None).await
    }
}

#[async_trait]
impl MessagingGateway for TelegramClient {
    async fn send_message(&self, chat_id: i64, message: Outgoing) -> GatewayResult<()> {
        let mut body = message_body(&message);
        body.insert("chat_id".to_string(), json!(chat_id));
        let _: Value = self.call("sendMessage", &body, None).await?;
        Ok(())
    }

    async fn edit_message(&self, target: &MessageRef, message: Outgoing) -> GatewayResult<()> {
        let mut body = message_body(&message);
        match target {
            MessageRef::Chat {
                chat_id,
                message_id,
            } => {
                body.insert("chat_id".to_string(), json!(chat_id));
                body.insert("message_id".to_string(), json!(message_id));
            }
            MessageRef::Inline(id) => {
                body.insert("inline_message_id".to_string(), json!(id));
            }
        }

        // Result is the edited Message, or `true` for inline messages.
        match self.call::<_, Value>("editMessageText", &body, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_not_modified(&err) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> GatewayResult<()> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        let _: Value = self.call("answerCallbackQuery", &body, None).await?;
        Ok(())
    }

    async fn answer_inline_query(
        &self,
        query_id: &str,
        results: Vec<InlineArticle>,
        cache_time: u32,
    ) -> GatewayResult<()> {
        let results: Vec<Value> = results
            .iter()
            .map(|article| {
                let mut content = serde_json::Map::new();
                content.insert("message_text".to_string(), json!(article.message.text));
                if let Some(mode) = article.message.parse_mode {
                    content.insert("parse_mode".to_string(), json!(mode));
                }

                let mut result = json!({
                    "type": "article",
                    "id": article.id,
                    "title": article.title,
                    "description": article.description,
                    "input_message_content": content,
                });
                if let Some(keyboard) = &article.message.keyboard {
                    result["reply_markup"] = json!(keyboard);
                }
                result
            })
            .collect();

        let body = json!({
            "inline_query_id": query_id,
            "results": results,
            "cache_time": cache_time,
            "is_personal": true,
        });
        let _: Value = self.call("answerInlineQuery", &body, None).await?;
        Ok(())
    }
}
