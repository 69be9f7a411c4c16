// src/store/postgres.rs
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{PollStore, VoteStore};
use crate::error::{StoreError, StoreResult};
use crate::models::{NewVote, Poll, PollState, Vote};

const POLL_COLUMNS: &str = "id, author_id, question, options, state, created_at, updated_at";
const VOTE_COLUMNS: &str = "id, poll_id, voter_id, option_index, voter_handle, voter_name";

#[derive(Debug, Clone)]
pub struct PgPollStore {
    pool: PgPool,
}

impl PgPollStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PollStore for PgPollStore {
    async fn insert(&self, poll: &Poll) -> StoreResult<Poll> {
        let sql = format!(
            "INSERT INTO polls (id, author_id, question, options, state) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {POLL_COLUMNS}"
        );
        sqlx::query_as::<_, Poll>(&sql)
            .bind(poll.id)
            .bind(poll.author_id)
            .bind(&poll.question)
            .bind(&poll.options)
            .bind(poll.state)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Poll>> {
        let sql = format!("SELECT {POLL_COLUMNS} FROM polls WHERE id = $1");
        sqlx::query_as::<_, Poll>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_draft(&self, author_id: i64) -> StoreResult<Option<Poll>> {
        let sql = format!(
            "SELECT {POLL_COLUMNS} FROM polls \
             WHERE author_id = $1 AND state IN ('new', 'collecting') \
             LIMIT 1"
        );
        sqlx::query_as::<_, Poll>(&sql)
            .bind(author_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_by_prefix(
        &self,
        author_id: i64,
        prefix: &str,
        limit: u32,
    ) -> StoreResult<Vec<Poll>> {
        // Callers only pass hex and dashes, so LIKE wildcards can't sneak in.
        let pattern = format!("{}%", prefix.to_ascii_lowercase());
        let sql = format!(
            "SELECT {POLL_COLUMNS} FROM polls \
             WHERE author_id = $1 AND id::text LIKE $2 \
             ORDER BY updated_at DESC \
             LIMIT $3"
        );
        sqlx::query_as::<_, Poll>(&sql)
            .bind(author_id)
            .bind(pattern)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn list_by_author(
        &self,
        author_id: i64,
        state: Option<PollState>,
        limit: u32,
    ) -> StoreResult<Vec<Poll>> {
        let sql = format!(
            "SELECT {POLL_COLUMNS} FROM polls \
             WHERE author_id = $1 AND ($2::poll_state IS NULL OR state = $2) \
             ORDER BY updated_at DESC \
             LIMIT $3"
        );
        sqlx::query_as::<_, Poll>(&sql)
            .bind(author_id)
            .bind(state)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn set_question(&self, id: Uuid, question: &str) -> StoreResult<Option<Poll>> {
        let sql = format!(
            "UPDATE polls \
             SET question = $2, state = 'collecting', updated_at = now() \
             WHERE id = $1 AND state = 'new' \
             RETURNING {POLL_COLUMNS}"
        );
        sqlx::query_as::<_, Poll>(&sql)
            .bind(id)
            .bind(question)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn append_option(&self, id: Uuid, option: &str) -> StoreResult<Option<Poll>> {
        // array_append runs against the locked row, so concurrent appends
        // from other instances all land.
        let sql = format!(
            "UPDATE polls \
             SET options = array_append(options, $2), updated_at = now() \
             WHERE id = $1 AND state = 'collecting' \
             RETURNING {POLL_COLUMNS}"
        );
        sqlx::query_as::<_, Poll>(&sql)
            .bind(id)
            .bind(option)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: PollState,
        to: PollState,
    ) -> StoreResult<Option<Poll>> {
        let sql = format!(
            "UPDATE polls \
             SET state = $3, updated_at = now() \
             WHERE id = $1 AND state = $2 \
             RETURNING {POLL_COLUMNS}"
        );
        sqlx::query_as::<_, Poll>(&sql)
            .bind(id)
            .bind(from)
            .bind(to)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }
}

#[derive(Debug, Clone)]
pub struct PgVoteStore {
    pool: PgPool,
}

impl PgVoteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn insert_sql() -> String {
        format!(
            "INSERT INTO votes (poll_id, voter_id, option_index, voter_handle, voter_name) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {VOTE_COLUMNS}"
        )
    }
}

#[async_trait]
impl VoteStore for PgVoteStore {
    async fn find_by_voter(&self, poll_id: Uuid, voter_id: i64) -> StoreResult<Option<Vote>> {
        let sql = format!("SELECT {VOTE_COLUMNS} FROM votes WHERE poll_id = $1 AND voter_id = $2");
        sqlx::query_as::<_, Vote>(&sql)
            .bind(poll_id)
            .bind(voter_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn list_by_poll(&self, poll_id: Uuid) -> StoreResult<Vec<Vote>> {
        let sql = format!("SELECT {VOTE_COLUMNS} FROM votes WHERE poll_id = $1 ORDER BY id");
        sqlx::query_as::<_, Vote>(&sql)
            .bind(poll_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn list_by_option(&self, poll_id: Uuid, option_index: i32) -> StoreResult<Vec<Vote>> {
        let sql = format!(
            "SELECT {VOTE_COLUMNS} FROM votes \
             WHERE poll_id = $1 AND option_index = $2 \
             ORDER BY id"
        );
        sqlx::query_as::<_, Vote>(&sql)
            .bind(poll_id)
            .bind(option_index)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn insert(&self, vote: NewVote) -> StoreResult<Vote> {
        sqlx::query_as::<_, Vote>(&Self::insert_sql())
            .bind(vote.poll_id)
            .bind(vote.voter_id)
            .bind(vote.option_index)
            .bind(vote.voter_handle)
            .bind(vote.voter_name)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM votes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace(&self, old_id: i64, vote: NewVote) -> StoreResult<Vote> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        sqlx::query("DELETE FROM votes WHERE id = $1")
            .bind(old_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;

        let row = sqlx::query_as::<_, Vote>(&Self::insert_sql())
            .bind(vote.poll_id)
            .bind(vote.voter_id)
            .bind(vote.option_index)
            .bind(vote.voter_handle)
            .bind(vote.voter_name)
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(row)
    }
}
