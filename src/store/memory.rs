// src/store/memory.rs
//! In-process stores.
//!
//! Mirror the Postgres constraints: one draft per author and one vote per
//! (poll, voter).

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{PollStore, VoteStore};
use crate::error::{StoreError, StoreResult};
use crate::models::{NewVote, Poll, PollState, Vote};

#[derive(Debug, Default)]
pub struct MemoryPollStore {
    polls: RwLock<HashMap<Uuid, Poll>>,
}

impl MemoryPollStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `edit` to poll `id` only if it is in state `expected`.
    fn update_if<F>(&self, id: Uuid, expected: PollState, edit: F) -> Option<Poll>
    where
        F: FnOnce(&mut Poll),
    {
        let mut polls = self.polls.write();
        let stored = polls.get_mut(&id).filter(|p| p.state == expected)?;
        edit(stored);
        // Strictly increasing so "recent" ordering is stable within a clock tick.
        let now = Utc::now();
        stored.updated_at = if now > stored.updated_at {
            now
        } else {
            stored.updated_at + chrono::Duration::microseconds(1)
        };
        Some(stored.clone())
    }

    fn newest_first(mut polls: Vec<Poll>, limit: u32) -> Vec<Poll> {
        polls.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        polls.truncate(limit as usize);
        polls
    }
}

#[async_trait]
impl PollStore for MemoryPollStore {
    async fn insert(&self, poll: &Poll) -> StoreResult<Poll> {
        let mut polls = self.polls.write();
        let has_draft = polls
            .values()
            .any(|p| p.author_id == poll.author_id && p.state.is_draft());
        if has_draft && poll.state.is_draft() {
            return Err(StoreError::UniqueViolation("polls_one_draft_per_author".to_string()));
        }
        if polls.contains_key(&poll.id) {
            return Err(StoreError::UniqueViolation("polls_pkey".to_string()));
        }
        polls.insert(poll.id, poll.clone());
        Ok(poll.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Poll>> {
        Ok(self.polls.read().get(&id).cloned())
    }

    async fn find_draft(&self, author_id: i64) -> StoreResult<Option<Poll>> {
        let polls = self.polls.read();
        Ok(polls
            .values()
            .find(|p| p.author_id == author_id && p.state.is_draft())
            .cloned())
    }

    async fn find_by_prefix(
        &self,
        author_id: i64,
        prefix: &str,
        limit: u32,
    ) -> StoreResult<Vec<Poll>> {
        let prefix = prefix.to_ascii_lowercase();
        let matches: Vec<Poll> = self
            .polls
            .read()
            .values()
            .filter(|p| p.author_id == author_id && p.id.to_string().starts_with(&prefix))
            .cloned()
            .collect();
        Ok(Self::newest_first(matches, limit))
    }

    async fn list_by_author(
        &self,
        author_id: i64,
        state: Option<PollState>,
        limit: u32,
    ) -> StoreResult<Vec<Poll>> {
        let matches: Vec<Poll> = self
            .polls
            .read()
            .values()
            .filter(|p| p.author_id == author_id)
            .filter(|p| state.map_or(true, |s| p.state == s))
            .cloned()
            .collect();
        Ok(Self::newest_first(matches, limit))
    }

    async fn set_question(&self, id: Uuid, question: &str) -> StoreResult<Option<Poll>> {
        Ok(self.update_if(id, PollState::New, |poll| {
            poll.question = Some(question.to_string());
            poll.state = PollState::Collecting;
        }))
    }

    async fn append_option(&self, id: Uuid, option: &str) -> StoreResult<Option<Poll>> {
        Ok(self.update_if(id, PollState::Collecting, |poll| {
            poll.options.push(option.to_string());
        }))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: PollState,
        to: PollState,
    ) -> StoreResult<Option<Poll>> {
        Ok(self.update_if(id, from, |poll| poll.state = to))
    }
}

#[derive(Debug, Default)]
struct VoteTable {
    next_id: i64,
    rows: BTreeMap<i64, Vote>,
}

impl VoteTable {
    fn insert(&mut self, vote: NewVote) -> StoreResult<Vote> {
        let taken = self
            .rows
            .values()
            .any(|v| v.poll_id == vote.poll_id && v.voter_id == vote.voter_id);
        if taken {
            return Err(StoreError::UniqueViolation("votes_poll_voter_key".to_string()));
        }

        self.next_id += 1;
        let row = Vote {
            id: self.next_id,
            poll_id: vote.poll_id,
            voter_id: vote.voter_id,
            option_index: vote.option_index,
            voter_handle: vote.voter_handle,
            voter_name: vote.voter_name,
        };
        self.rows.insert(row.id, row.clone());
        Ok(row)
    }
}

/// Rows are keyed by id in a `BTreeMap`, so listing is in insertion order.
#[derive(Debug, Default)]
pub struct MemoryVoteStore {
    table: RwLock<VoteTable>,
}

impl MemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows for a (poll, voter) pair. Only meaningful in tests, where it
    /// should never exceed one.
    #[cfg(test)]
    pub fn count_for(&self, poll_id: Uuid, voter_id: i64) -> usize {
        self.table
            .read()
            .rows
            .values()
            .filter(|v| v.poll_id == poll_id && v.voter_id == voter_id)
            .count()
    }
}

#[async_trait]
impl VoteStore for MemoryVoteStore {
    async fn find_by_voter(&self, poll_id: Uuid, voter_id: i64) -> StoreResult<Option<Vote>> {
        Ok(self
            .table
            .read()
            .rows
            .values()
            .find(|v| v.poll_id == poll_id && v.voter_id == voter_id)
            .cloned())
    }

    async fn list_by_poll(&self, poll_id: Uuid) -> StoreResult<Vec<Vote>> {
        Ok(self
            .table
            .read()
            .rows
            .values()
            .filter(|v| v.poll_id == poll_id)
            .cloned()
            .collect())
    }

    async fn list_by_option(&self, poll_id: Uuid, option_index: i32) -> StoreResult<Vec<Vote>> {
        Ok(self
            .table
            .read()
            .rows
            .values()
            .filter(|v| v.poll_id == poll_id && v.option_index == option_index)
            .cloned()
            .collect())
    }

    async fn insert(&self, vote: NewVote) -> StoreResult<Vote> {
        self.table.write().insert(vote)
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        Ok(self.table.write().rows.remove(&id).is_some())
    }

    async fn replace(&self, old_id: i64, vote: NewVote) -> StoreResult<Vote> {
        let mut table = self.table.write();
        let old = table.rows.remove(&old_id);
        match table.insert(vote) {
            Ok(row) => Ok(row),
            Err(err) => {
                // Roll back the delete.
                if let Some(old) = old {
                    table.rows.insert(old.id, old);
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_vote(poll_id: Uuid, voter_id: i64, option_index: i32) -> NewVote {
        NewVote {
            poll_id,
            voter_id,
            option_index,
            voter_handle: Some(format!("user{}", voter_id)),
            voter_name: format!("User {}", voter_id),
        }
    }

    #[tokio::test]
    async fn test_second_draft_is_rejected() {
        let store = MemoryPollStore::new();
        store.insert(&Poll::draft(1)).await.unwrap();

        let result = store.insert(&Poll::draft(1)).await;
        assert!(matches!(result, Err(StoreError::UniqueViolation(_))));

        // Other authors are unaffected
        assert!(store.insert(&Poll::draft(2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_draft_edits_bump_updated_at() {
        let store = MemoryPollStore::new();
        let poll = store.insert(&Poll::draft(1)).await.unwrap();

        let asked = store.set_question(poll.id, "Tea?").await.unwrap().unwrap();
        assert!(asked.updated_at > poll.updated_at);
        assert_eq!(asked.created_at, poll.created_at);
        assert_eq!(asked.question.as_deref(), Some("Tea?"));
        assert_eq!(asked.state, PollState::Collecting);

        let grown = store.append_option(poll.id, "Yes").await.unwrap().unwrap();
        assert!(grown.updated_at > asked.updated_at);
        assert_eq!(grown.options, vec!["Yes"]);
    }

    #[tokio::test]
    async fn test_writes_check_expected_state() {
        let store = MemoryPollStore::new();
        let poll = store.insert(&Poll::draft(1)).await.unwrap();

        // No question yet, so no options and no publishing
        assert!(store.append_option(poll.id, "Yes").await.unwrap().is_none());
        let early = store
            .transition(poll.id, PollState::Collecting, PollState::Open)
            .await
            .unwrap();
        assert!(early.is_none());

        store.set_question(poll.id, "Tea?").await.unwrap().unwrap();
        assert!(store.set_question(poll.id, "Coffee?").await.unwrap().is_none());
        store.append_option(poll.id, "Yes").await.unwrap().unwrap();

        let opened = store
            .transition(poll.id, PollState::Collecting, PollState::Open)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(opened.state, PollState::Open);
        assert_eq!(opened.question.as_deref(), Some("Tea?"));
        assert_eq!(opened.options, vec!["Yes"]);
        assert!(store.append_option(poll.id, "No").await.unwrap().is_none());

        assert!(store.set_question(Uuid::new_v4(), "Q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_author_orders_and_filters() {
        let store = MemoryPollStore::new();
        let first = store
            .insert(&Poll {
                state: PollState::Open,
                ..Poll::draft(1)
            })
            .await
            .unwrap();
        let second = store.insert(&Poll::draft(1)).await.unwrap();
        store.insert(&Poll::draft(2)).await.unwrap();

        let all = store.list_by_author(1, None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);

        let open = store.list_by_author(1, Some(PollState::Open), 10).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, first.id);

        let limited = store.list_by_author(1, None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_find_by_prefix_is_scoped_to_author() {
        let store = MemoryPollStore::new();
        let poll = store.insert(&Poll::draft(1)).await.unwrap();
        let prefix = poll.short_id();

        assert_eq!(store.find_by_prefix(1, &prefix, 2).await.unwrap().len(), 1);
        assert!(store.find_by_prefix(2, &prefix, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vote_unique_per_poll_and_voter() {
        let store = MemoryVoteStore::new();
        let poll_id = Uuid::new_v4();
        store.insert(new_vote(poll_id, 1, 0)).await.unwrap();

        let result = store.insert(new_vote(poll_id, 1, 1)).await;
        assert!(matches!(result, Err(StoreError::UniqueViolation(_))));
        assert_eq!(store.count_for(poll_id, 1), 1);
    }

    #[tokio::test]
    async fn test_replace_swaps_vote() {
        let store = MemoryVoteStore::new();
        let poll_id = Uuid::new_v4();
        let old = store.insert(new_vote(poll_id, 1, 0)).await.unwrap();

        let new = store.replace(old.id, new_vote(poll_id, 1, 1)).await.unwrap();
        assert_ne!(new.id, old.id);
        assert_eq!(new.option_index, 1);
        assert!(store.list_by_option(poll_id, 0).await.unwrap().is_empty());
        assert_eq!(store.list_by_option(poll_id, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_rolls_back_on_conflict() {
        let store = MemoryVoteStore::new();
        let poll_id = Uuid::new_v4();
        let first = store.insert(new_vote(poll_id, 1, 0)).await.unwrap();
        store.insert(new_vote(poll_id, 2, 0)).await.unwrap();

        // Replacing voter 1's row with a row for voter 2 collides
        let result = store.replace(first.id, new_vote(poll_id, 2, 1)).await;
        assert!(result.is_err());
        assert_eq!(store.count_for(poll_id, 1), 1);
    }

    #[tokio::test]
    async fn test_list_by_poll_in_insertion_order() {
        let store = MemoryVoteStore::new();
        let poll_id = Uuid::new_v4();
        for voter in [5, 3, 9] {
            store.insert(new_vote(poll_id, voter, 0)).await.unwrap();
        }

        let voters: Vec<i64> = store
            .list_by_poll(poll_id)
            .await
            .unwrap()
            .iter()
            .map(|v| v.voter_id)
            .collect();
        assert_eq!(voters, vec![5, 3, 9]);
    }
}
