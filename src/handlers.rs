// src/handlers.rs
//! Command dispatcher.
//!
//! Turns Telegram updates into engine calls and engine results into chat
//! replies. Every engine call runs under the configured request timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::callback::VoteCallback;
use crate::config::Config;
use crate::error::{GatewayResult, PollError, PollResult, StoreError};
use crate::gateway::{InlineArticle, InlineKeyboard, MessageRef, MessagingGateway, Outgoing};
use crate::locks::KeyedLocks;
use crate::models::{Poll, PollState, Voter};
use crate::poll::PollLifecycle;
use crate::store::{PollStore, VoteStore};
use crate::tally::{escape_markdown, poll_command, Tally};
use crate::telegram::{CallbackQuery, InlineQuery, Message, Update, User};
use crate::voting::{VoteReceipt, VoteToggle};

/// Seconds Telegram may cache an inline query answer.
const INLINE_CACHE_SECS: u32 = 20;

const HELP: &str = "I help you run polls.\n\n\
/create - start a new poll\n\
/done - publish the poll you are writing\n\
/polls - your last polls\n\
/poll_<id> - show a poll with its votes\n\
/close_<id> - stop accepting votes\n\
/report <text> - send feedback to the admins\n\n\
Type @ and my name in any chat to share one of your open polls.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Hello,
    Me,
    Report(String),
    Create,
    Done,
    Polls,
    Poll(String),
    Close(String),
    Unknown(String),
}

impl Command {
    /// Parse a slash command. Plain text returns `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.strip_prefix('/')?;
        let (head, payload) = match rest.split_once(char::is_whitespace) {
            Some((head, payload)) => (head, payload.trim()),
            None => (rest, ""),
        };
        // "/create@my_bot" in group chats
        let name = head.split('@').next().unwrap_or_default();

        let command = match name {
            "start" => Command::Start,
            "help" => Command::Help,
            "hello" => Command::Hello,
            "me" => Command::Me,
            "report" => Command::Report(payload.to_string()),
            "create" => Command::Create,
            "done" => Command::Done,
            "polls" => Command::Polls,
            _ => {
                if let Some(prefix) = name.strip_prefix("poll_") {
                    Command::Poll(prefix.to_string())
                } else if let Some(prefix) = name.strip_prefix("close_") {
                    Command::Close(prefix.to_string())
                } else {
                    Command::Unknown(name.to_string())
                }
            }
        };
        Some(command)
    }
}

pub struct Dispatcher {
    lifecycle: PollLifecycle,
    voting: VoteToggle,
    gateway: Arc<dyn MessagingGateway>,
    /// Held from tally read to message edit, per poll.
    refresh_locks: KeyedLocks<Uuid>,
    admins: Vec<i64>,
    recent_limit: u32,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        polls: Arc<dyn PollStore>,
        votes: Arc<dyn VoteStore>,
        gateway: Arc<dyn MessagingGateway>,
        config: &Config,
    ) -> Self {
        Self {
            lifecycle: PollLifecycle::new(polls.clone()),
            voting: VoteToggle::new(polls, votes),
            gateway,
            refresh_locks: KeyedLocks::new(),
            admins: config.admins.clone(),
            recent_limit: config.recent_limit,
            timeout: config.request_timeout,
        }
    }

    /// Handle one update end to end. Failures are logged, never returned.
    pub async fn handle_update(&self, update: Update) {
        let update_id = update.update_id;
        let result = if let Some(message) = update.message {
            self.on_message(message).await
        } else if let Some(callback) = update.callback_query {
            self.on_callback(callback).await
        } else if let Some(query) = update.inline_query {
            self.on_inline_query(query).await
        } else {
            debug!(update_id, "Ignoring unsupported update");
            Ok(())
        };

        if let Err(err) = result {
            error!(update_id, error = %err, "Failed to deliver reply");
        }
    }

    /// Send `text` to every admin. Returns how many deliveries failed.
    pub async fn notify_admins(&self, text: &str) -> usize {
        let mut failed = 0;
        for &admin in &self.admins {
            if let Err(err) = self.gateway.send_message(admin, Outgoing::text(text)).await {
                warn!(admin, error = %err, "Failed to notify admin");
                failed += 1;
            }
        }
        failed
    }

    async fn run<T, F>(&self, op: F) -> PollResult<T>
    where
        F: Future<Output = PollResult<T>>,
    {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(PollError::Storage(StoreError::Timeout(self.timeout))),
        }
    }

    async fn reply(&self, chat_id: i64, text: impl Into<String>) -> GatewayResult<()> {
        self.gateway.send_message(chat_id, Outgoing::text(text)).await
    }

    async fn reply_error(&self, chat_id: i64, err: &PollError) -> GatewayResult<()> {
        log_failure(err);
        self.reply(chat_id, err.user_message()).await
    }

    async fn on_message(&self, message: Message) -> GatewayResult<()> {
        debug!(chat_id = message.chat.id, message_id = message.message_id, "Incoming message");
        let (Some(sender), Some(text)) = (message.from, message.text) else {
            return Ok(());
        };
        if sender.is_bot {
            return Ok(());
        }
        let chat_id = message.chat.id;

        match Command::parse(&text) {
            None => self.on_text(chat_id, sender.id, &text).await,
            Some(Command::Start) | Some(Command::Help) => self.reply(chat_id, HELP).await,
            Some(Command::Hello) => {
                let name = sender.username.clone().unwrap_or_else(|| sender.full_name());
                self.reply(chat_id, format!("Hello, {}!", name)).await
            }
            Some(Command::Me) => self.on_me(chat_id, &sender).await,
            Some(Command::Report(payload)) => self.on_report(chat_id, &sender, &payload).await,
            Some(Command::Create) => self.on_create(chat_id, sender.id).await,
            Some(Command::Done) => self.on_done(chat_id, sender.id).await,
            Some(Command::Polls) => self.on_polls(chat_id, sender.id).await,
            Some(Command::Poll(prefix)) => self.on_poll_info(chat_id, sender.id, &prefix).await,
            Some(Command::Close(prefix)) => self.on_close(chat_id, sender.id, &prefix).await,
            Some(Command::Unknown(name)) => {
                debug!(command = %name, "Unknown command");
                self.reply(chat_id, "Unknown command, send /help").await
            }
        }
    }

    async fn on_text(&self, chat_id: i64, author_id: i64, text: &str) -> GatewayResult<()> {
        match self.run(self.lifecycle.submit_text(author_id, text)).await {
            Ok(prompt) => self.reply(chat_id, prompt.message()).await,
            Err(err) => self.reply_error(chat_id, &err).await,
        }
    }

    async fn on_me(&self, chat_id: i64, sender: &User) -> GatewayResult<()> {
        let name = match &sender.username {
            Some(username) => format!("@{}", escape_markdown(username)),
            None => escape_markdown(&sender.full_name()),
        };
        let text = format!("Hello, {}\\!\nYour id is `{}`\n", name, sender.id);
        self.gateway
            .send_message(chat_id, Outgoing::markdown(text))
            .await
    }

    async fn on_report(&self, chat_id: i64, sender: &User, payload: &str) -> GatewayResult<()> {
        if payload.is_empty() {
            return self.reply(chat_id, "Usage: /report <text>").await;
        }

        info!(reporter = sender.id, "Forwarding report to admins");
        if self.notify_admins(&format!("New report:\n{}", payload)).await > 0 {
            return self.reply(chat_id, "Please try again").await;
        }
        self.reply(chat_id, "Thank for your report").await
    }

    async fn on_create(&self, chat_id: i64, author_id: i64) -> GatewayResult<()> {
        match self.run(self.lifecycle.start_poll(author_id)).await {
            Ok(_) => self.reply(chat_id, "Good. Now send me the question.").await,
            Err(err) => self.reply_error(chat_id, &err).await,
        }
    }

    async fn on_done(&self, chat_id: i64, author_id: i64) -> GatewayResult<()> {
        match self.run(self.lifecycle.finish_poll(author_id)).await {
            Ok(poll) => {
                self.reply(chat_id, "Your poll is created!").await?;
                self.send_poll(chat_id, &poll).await
            }
            Err(err) => self.reply_error(chat_id, &err).await,
        }
    }

    async fn on_polls(&self, chat_id: i64, author_id: i64) -> GatewayResult<()> {
        let polls = match self
            .run(self.lifecycle.list_recent_polls(author_id, self.recent_limit))
            .await
        {
            Ok(polls) => polls,
            Err(err) => return self.reply_error(chat_id, &err).await,
        };

        if polls.is_empty() {
            return self
                .reply(chat_id, "You have no polls.\nSend /create to start new poll")
                .await;
        }

        let mut message = "Your last polls:\n".to_string();
        for poll in &polls {
            message += &format!("• /poll_{} {}\n", poll.short_id(), poll.question_text());
        }
        self.reply(chat_id, message).await
    }

    async fn on_poll_info(&self, chat_id: i64, author_id: i64, prefix: &str) -> GatewayResult<()> {
        match self
            .run(self.lifecycle.resolve_poll_by_prefix(author_id, prefix))
            .await
        {
            Ok(poll) => self.send_poll(chat_id, &poll).await,
            Err(err) => self.reply_error(chat_id, &err).await,
        }
    }

    async fn on_close(&self, chat_id: i64, author_id: i64, prefix: &str) -> GatewayResult<()> {
        match self.run(self.lifecycle.close_poll(author_id, prefix)).await {
            Ok(poll) => {
                self.reply(chat_id, "Poll closed, final results:").await?;
                self.send_poll(chat_id, &poll).await
            }
            Err(err) => self.reply_error(chat_id, &err).await,
        }
    }

    /// Header, tally and (for open polls) the vote buttons.
    async fn send_poll(&self, chat_id: i64, poll: &Poll) -> GatewayResult<()> {
        let tally = self.tally(poll).await;
        let text = format!("Poll {}\n\n{}", poll_command(poll), tally.render());
        self.gateway
            .send_message(chat_id, poll_message(poll, text))
            .await
    }

    async fn tally(&self, poll: &Poll) -> Tally {
        match tokio::time::timeout(self.timeout, self.voting.tally(poll)).await {
            Ok(tally) => tally,
            Err(_) => {
                warn!(poll_id = %poll.id, "Timed out reading votes, rendering ballot only");
                Tally::unavailable(poll)
            }
        }
    }

    async fn on_callback(&self, callback: CallbackQuery) -> GatewayResult<()> {
        let Some(data) = callback.data.as_deref() else {
            return self.gateway.answer_callback(&callback.id, None).await;
        };

        let request = match data.parse::<VoteCallback>() {
            Ok(request) => request,
            Err(err) => {
                debug!(data, error = %err, "Rejected callback payload");
                return self
                    .gateway
                    .answer_callback(&callback.id, Some(err.user_message()))
                    .await;
            }
        };

        let voter = Voter::new(
            callback.from.id,
            callback.from.username.clone(),
            callback.from.full_name(),
        );
        let receipt = match self
            .run(self.voting.cast_or_toggle_vote(request, &voter))
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                log_failure(&err);
                return self
                    .gateway
                    .answer_callback(&callback.id, Some(err.user_message()))
                    .await;
            }
        };

        if let Some(origin) = callback.origin() {
            self.refresh(&origin, &receipt).await;
        }

        self.gateway
            .answer_callback(&callback.id, Some(receipt.outcome.message()))
            .await
    }

    /// Re-render the tally into the message the button lives in.
    ///
    /// The vote is already stored, so a failed edit is only logged. Reading
    /// and editing under one lock per poll keeps an older tally from landing
    /// after a newer one.
    async fn refresh(&self, origin: &MessageRef, receipt: &VoteReceipt) {
        let _guard = self.refresh_locks.lock(receipt.poll.id).await;

        let tally = self.tally(&receipt.poll).await;
        debug!(
            poll_id = %receipt.poll.id,
            vote_id = ?receipt.vote.as_ref().map(|v| v.id),
            counts = ?tally.counts(),
            "Refreshing poll message"
        );
        let message = poll_message(&receipt.poll, tally.render());
        if let Err(err) = self.gateway.edit_message(origin, message).await {
            warn!(poll_id = %receipt.poll.id, error = %err, "Failed to refresh poll message");
        }
    }

    async fn on_inline_query(&self, query: InlineQuery) -> GatewayResult<()> {
        let polls = match self
            .run(
                self.lifecycle
                    .find_open_polls_by_author(query.from.id, self.recent_limit),
            )
            .await
        {
            Ok(polls) => polls,
            Err(err) => {
                log_failure(&err);
                Vec::new()
            }
        };

        let needle = query.query.trim().to_lowercase();
        let mut results = Vec::new();
        for poll in polls
            .iter()
            .filter(|p| needle.is_empty() || p.question_text().to_lowercase().contains(&needle))
        {
            let tally = self.tally(poll).await;
            results.push(InlineArticle {
                id: results.len().to_string(),
                title: poll.question_text().to_string(),
                description: poll.options.join(" / "),
                message: poll_message(poll, tally.render()),
            });
        }

        self.gateway
            .answer_inline_query(&query.id, results, INLINE_CACHE_SECS)
            .await
    }
}

/// Markdown message for a poll, with vote buttons while it is open.
fn poll_message(poll: &Poll, text: String) -> Outgoing {
    let message = Outgoing::markdown(text);
    if poll.state == PollState::Open {
        message.with_keyboard(InlineKeyboard::for_poll(poll))
    } else {
        message
    }
}

fn log_failure(err: &PollError) {
    if err.is_storage() {
        error!(error = %err, "Engine call failed");
    } else {
        debug!(error = %err, "Request rejected");
    }
}
