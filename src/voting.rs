// src/voting.rs
//! Vote toggle engine.
//!
//! A voter has at most one vote per poll. Pressing a new option casts or moves
//! the vote; pressing the option already chosen takes it back.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::callback::VoteCallback;
use crate::error::{PollError, PollResult, StoreError};
use crate::locks::KeyedLocks;
use crate::models::{NewVote, Poll, PollState, Vote, Voter};
use crate::store::{PollStore, VoteStore};
use crate::tally::Tally;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// New vote, or an existing one moved to another option.
    Accepted,
    /// The voter pressed their current option again.
    Removed,
}

impl VoteOutcome {
    pub fn message(self) -> &'static str {
        match self {
            VoteOutcome::Accepted => "Vote accepted",
            VoteOutcome::Removed => "Vote removed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VoteReceipt {
    pub outcome: VoteOutcome,
    pub poll: Poll,
    /// The voter's vote after the toggle, if any.
    pub vote: Option<Vote>,
}

pub struct VoteToggle {
    polls: Arc<dyn PollStore>,
    votes: Arc<dyn VoteStore>,
    voter_locks: KeyedLocks<(Uuid, i64)>,
}

impl VoteToggle {
    pub fn new(polls: Arc<dyn PollStore>, votes: Arc<dyn VoteStore>) -> Self {
        Self {
            polls,
            votes,
            voter_locks: KeyedLocks::new(),
        }
    }

    /// Apply one button press.
    pub async fn cast_or_toggle_vote(
        &self,
        request: VoteCallback,
        voter: &Voter,
    ) -> PollResult<VoteReceipt> {
        let _guard = self.voter_locks.lock((request.poll_id, voter.id)).await;

        // Read under the lock so a poll closed while we waited is seen as closed.
        let poll = self
            .polls
            .find_by_id(request.poll_id)
            .await?
            .ok_or_else(|| PollError::not_found("Unknown poll"))?;

        if poll.state != PollState::Open {
            return Err(PollError::conflict("This poll is closed"));
        }
        if !poll.has_option(request.option_index) {
            return Err(PollError::validation("Unknown answer"));
        }
        let option_index = i32::try_from(request.option_index)
            .map_err(|_| PollError::validation("Unknown answer"))?;

        let new_vote = NewVote {
            poll_id: poll.id,
            voter_id: voter.id,
            option_index,
            voter_handle: voter.handle.clone(),
            voter_name: voter.name.clone(),
        };

        let (outcome, vote) = match self.votes.find_by_voter(poll.id, voter.id).await? {
            None => {
                let vote = self.votes.insert(new_vote).await.map_err(concurrent_vote)?;
                (VoteOutcome::Accepted, Some(vote))
            }
            Some(existing) if existing.option_index == option_index => {
                self.votes.delete(existing.id).await?;
                (VoteOutcome::Removed, None)
            }
            Some(existing) => {
                let vote = self
                    .votes
                    .replace(existing.id, new_vote)
                    .await
                    .map_err(concurrent_vote)?;
                (VoteOutcome::Accepted, Some(vote))
            }
        };

        info!(
            poll_id = %poll.id,
            voter_id = voter.id,
            option = option_index,
            outcome = ?outcome,
            "Vote toggled"
        );
        Ok(VoteReceipt {
            outcome,
            poll,
            vote,
        })
    }

    /// Current tally for display.
    ///
    /// If the votes can't be read the poll is still shown, just without
    /// counts, rather than with counts that might be wrong.
    pub async fn tally(&self, poll: &Poll) -> Tally {
        match self.votes.list_by_poll(poll.id).await {
            Ok(votes) => Tally::count(poll, &votes),
            Err(err) => {
                warn!(poll_id = %poll.id, error = %err, "Failed to read votes, rendering ballot only");
                Tally::unavailable(poll)
            }
        }
    }
}

/// A unique violation here means another instance raced us on the same voter.
fn concurrent_vote(err: StoreError) -> PollError {
    match err {
        StoreError::UniqueViolation(_) => {
            PollError::conflict("Your previous vote is still being counted, try again")
        }
        other => PollError::Storage(other),
    }
}
