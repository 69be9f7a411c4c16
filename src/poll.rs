// src/poll.rs
//! Poll lifecycle engine.
//!
//! Drives a poll from an empty draft through question and answer authoring to
//! publication and closing. All draft mutations for one author run under that
//! author's lock.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{PollError, PollResult, StoreError};
use crate::locks::KeyedLocks;
use crate::models::{Poll, PollState};
use crate::store::PollStore;

pub const NO_DRAFT: &str = "You have no new poll, send /create to start new poll";
pub const DRAFT_EXISTS: &str = "You already have new poll, please finish it before creating new.";
pub const TOO_FEW_OPTIONS: &str = "You need two or more variants to finish poll";
pub const UNKNOWN_POLL: &str = "Poll not found, send /polls to see your polls";
const ALREADY_CLOSED: &str = "This poll is already closed";

/// Minimum number of answers a poll needs before it can be published.
pub const MIN_OPTIONS: usize = 2;

/// What the author should send next after a `submit_text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftPrompt {
    FirstAnswer,
    AnotherAnswer,
}

impl DraftPrompt {
    pub fn message(self) -> &'static str {
        match self {
            DraftPrompt::FirstAnswer => "Good, now send me first answer",
            DraftPrompt::AnotherAnswer => "Good, now send me another answer",
        }
    }
}

pub struct PollLifecycle {
    polls: Arc<dyn PollStore>,
    author_locks: KeyedLocks<i64>,
}

impl PollLifecycle {
    pub fn new(polls: Arc<dyn PollStore>) -> Self {
        Self {
            polls,
            author_locks: KeyedLocks::new(),
        }
    }

    /// Open a fresh draft for the author.
    pub async fn start_poll(&self, author_id: i64) -> PollResult<Poll> {
        let _guard = self.author_locks.lock(author_id).await;

        if self.polls.find_draft(author_id).await?.is_some() {
            return Err(PollError::conflict(DRAFT_EXISTS));
        }

        // The store's own single-draft constraint covers other instances.
        let poll = self
            .polls
            .insert(&Poll::draft(author_id))
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => PollError::conflict(DRAFT_EXISTS),
                other => PollError::Storage(other),
            })?;

        info!(author_id, poll_id = %poll.id, "Draft poll created");
        Ok(poll)
    }

    /// Feed one plain-text message into the author's draft.
    ///
    /// The first text becomes the question; every later one is appended as
    /// the next answer option.
    pub async fn submit_text(&self, author_id: i64, text: &str) -> PollResult<DraftPrompt> {
        let _guard = self.author_locks.lock(author_id).await;

        // States only move forward, so a lost race ends after a re-read or two.
        loop {
            let poll = self.current_draft(author_id).await?;
            let written = match poll.state {
                PollState::New => self
                    .polls
                    .set_question(poll.id, text)
                    .await?
                    .map(|saved| (saved, DraftPrompt::FirstAnswer)),
                PollState::Collecting => self
                    .polls
                    .append_option(poll.id, text)
                    .await?
                    .map(|saved| (saved, DraftPrompt::AnotherAnswer)),
                PollState::Open | PollState::Closed => return Err(PollError::not_found(NO_DRAFT)),
            };

            let Some((saved, prompt)) = written else {
                debug!(author_id, poll_id = %poll.id, "Draft changed underneath us, retrying");
                continue;
            };
            debug!(
                author_id,
                poll_id = %saved.id,
                options = saved.options.len(),
                "Draft updated"
            );
            return Ok(prompt);
        }
    }

    /// Publish the author's draft.
    pub async fn finish_poll(&self, author_id: i64) -> PollResult<Poll> {
        let _guard = self.author_locks.lock(author_id).await;

        let poll = self.current_draft(author_id).await?;
        match poll.state {
            PollState::Collecting if poll.options.len() >= MIN_OPTIONS => {}
            PollState::Collecting => return Err(PollError::validation(TOO_FEW_OPTIONS)),
            _ => return Err(PollError::not_found(NO_DRAFT)),
        }

        // Options only grow, so the count check above still holds.
        let poll = self
            .polls
            .transition(poll.id, PollState::Collecting, PollState::Open)
            .await?
            .ok_or_else(|| PollError::not_found(NO_DRAFT))?;
        info!(author_id, poll_id = %poll.id, options = poll.options.len(), "Poll opened");
        Ok(poll)
    }

    /// Stop accepting votes on one of the author's open polls.
    pub async fn close_poll(&self, author_id: i64, id_prefix: &str) -> PollResult<Poll> {
        let _guard = self.author_locks.lock(author_id).await;

        let poll = self.resolve(author_id, id_prefix).await?;
        match poll.state {
            PollState::Open => {}
            PollState::Closed => return Err(PollError::conflict(ALREADY_CLOSED)),
            PollState::New | PollState::Collecting => {
                return Err(PollError::validation(
                    "This poll is not published yet, send /done to finish it",
                ))
            }
        }

        let poll = self
            .polls
            .transition(poll.id, PollState::Open, PollState::Closed)
            .await?
            .ok_or_else(|| PollError::conflict(ALREADY_CLOSED))?;
        info!(author_id, poll_id = %poll.id, "Poll closed");
        Ok(poll)
    }

    /// The author's polls, most recently touched first.
    pub async fn list_recent_polls(&self, author_id: i64, limit: u32) -> PollResult<Vec<Poll>> {
        Ok(self.polls.list_by_author(author_id, None, limit).await?)
    }

    /// The author's published polls, most recently touched first.
    pub async fn find_open_polls_by_author(
        &self,
        author_id: i64,
        limit: u32,
    ) -> PollResult<Vec<Poll>> {
        Ok(self
            .polls
            .list_by_author(author_id, Some(PollState::Open), limit)
            .await?)
    }

    /// Find the one poll of the author whose id starts with `id_prefix`.
    pub async fn resolve_poll_by_prefix(&self, author_id: i64, id_prefix: &str) -> PollResult<Poll> {
        self.resolve(author_id, id_prefix).await
    }

    async fn resolve(&self, author_id: i64, id_prefix: &str) -> PollResult<Poll> {
        let prefix = normalize_prefix(id_prefix)?;

        // Two rows are enough to tell unique from ambiguous.
        let mut matches = self.polls.find_by_prefix(author_id, &prefix, 2).await?;
        match matches.len() {
            0 => Err(PollError::not_found(UNKNOWN_POLL)),
            1 => Ok(matches.remove(0)),
            _ => Err(PollError::validation(
                "More than one poll matches, use a longer id",
            )),
        }
    }

    async fn current_draft(&self, author_id: i64) -> PollResult<Poll> {
        self.polls
            .find_draft(author_id)
            .await?
            .ok_or_else(|| PollError::not_found(NO_DRAFT))
    }
}

/// Lowercase the prefix and make sure it can only ever match a uuid.
fn normalize_prefix(raw: &str) -> PollResult<String> {
    let prefix = raw.trim().to_ascii_lowercase();
    let valid = !prefix.is_empty()
        && prefix.len() <= 36
        && prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
    if valid {
        Ok(prefix)
    } else {
        Err(PollError::validation("Poll id should look like /poll_1a2b3c4d"))
    }
}
