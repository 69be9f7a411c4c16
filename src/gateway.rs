// src/gateway.rs
//! Messaging gateway.
//!
//! The outbound half of the chat transport as the dispatcher sees it. The
//! Telegram client implements it for real; tests record calls instead.

use async_trait::async_trait;
use serde::Serialize;

use crate::callback::VoteCallback;
use crate::error::GatewayResult;
use crate::models::Poll;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    MarkdownV2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    /// One button per option, one option per row.
    pub fn for_poll(poll: &Poll) -> Self {
        let inline_keyboard = poll
            .options
            .iter()
            .enumerate()
            .map(|(idx, option)| {
                vec![InlineButton {
                    text: option.clone(),
                    callback_data: VoteCallback::new(poll.id, idx).to_string(),
                }]
            })
            .collect();
        Self { inline_keyboard }
    }
}

/// A message to send or to replace an existing one with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    pub keyboard: Option<InlineKeyboard>,
}

impl Outgoing {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: None,
            keyboard: None,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: Some(ParseMode::MarkdownV2),
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Where a vote button was pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRef {
    Chat { chat_id: i64, message_id: i64 },
    /// Message posted through an inline query.
    Inline(String),
}

/// One entry in an inline query answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineArticle {
    pub id: String,
    pub title: String,
    pub description: String,
    pub message: Outgoing,
}

#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_message(&self, chat_id: i64, message: Outgoing) -> GatewayResult<()>;

    async fn edit_message(&self, target: &MessageRef, message: Outgoing) -> GatewayResult<()>;

    /// Stop the button spinner, optionally with a toast.
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> GatewayResult<()>;

    async fn answer_inline_query(
        &self,
        query_id: &str,
        results: Vec<InlineArticle>,
        cache_time: u32,
    ) -> GatewayResult<()>;
}
