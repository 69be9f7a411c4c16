// src/store/mod.rs
//! Poll and vote persistence.
//!
//! The engines only see these traits; `postgres` backs them with sqlx and
//! `memory` keeps everything in process for tests and database-less runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{NewVote, Poll, PollState, Vote};

pub use memory::{MemoryPollStore, MemoryVoteStore};
pub use postgres::{PgPollStore, PgVoteStore};

#[async_trait]
pub trait PollStore: Send + Sync {
    /// Persist a new draft. Fails with `UniqueViolation` if the author
    /// already has one.
    async fn insert(&self, poll: &Poll) -> StoreResult<Poll>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Poll>>;

    /// The author's poll in `new` or `collecting` state, if any.
    async fn find_draft(&self, author_id: i64) -> StoreResult<Option<Poll>>;

    /// Author's polls whose id starts with `prefix`, most recently updated
    /// first, at most `limit` rows.
    async fn find_by_prefix(&self, author_id: i64, prefix: &str, limit: u32)
        -> StoreResult<Vec<Poll>>;

    /// Author's polls, optionally filtered by state, most recently updated first.
    async fn list_by_author(
        &self,
        author_id: i64,
        state: Option<PollState>,
        limit: u32,
    ) -> StoreResult<Vec<Poll>>;

    // The writes below are conditional single-row updates. Each bumps
    // `updated_at` and returns the new row, or `None` when the poll is not
    // in the state the write expects.

    /// Set the question of a `new` draft and move it to `collecting`.
    async fn set_question(&self, id: Uuid, question: &str) -> StoreResult<Option<Poll>>;

    /// Append one answer option to a `collecting` draft.
    async fn append_option(&self, id: Uuid, option: &str) -> StoreResult<Option<Poll>>;

    /// Move a poll from `from` to `to`, leaving question and options alone.
    /// Only forward moves out of the draft states are supported.
    async fn transition(&self, id: Uuid, from: PollState, to: PollState)
        -> StoreResult<Option<Poll>>;
}

#[async_trait]
pub trait VoteStore: Send + Sync {
    async fn find_by_voter(&self, poll_id: Uuid, voter_id: i64) -> StoreResult<Option<Vote>>;

    /// Every vote on the poll in insertion order.
    async fn list_by_poll(&self, poll_id: Uuid) -> StoreResult<Vec<Vote>>;

    async fn list_by_option(&self, poll_id: Uuid, option_index: i32) -> StoreResult<Vec<Vote>>;

    /// Fails with `UniqueViolation` if the voter already has a vote on the poll.
    async fn insert(&self, vote: NewVote) -> StoreResult<Vote>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: i64) -> StoreResult<bool>;

    /// Remove vote `old_id` and insert `vote` as one atomic step.
    async fn replace(&self, old_id: i64, vote: NewVote) -> StoreResult<Vote>;
}
