// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a poll.
///
/// `New` has no question yet; `Collecting` has a question and is accepting
/// answer options. Both are drafts. `Open` polls take votes, `Closed` ones no
/// longer do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "poll_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PollState {
    New,
    Collecting,
    Open,
    Closed,
}

impl PollState {
    pub fn is_draft(self) -> bool {
        matches!(self, PollState::New | PollState::Collecting)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Poll {
    pub id: Uuid,
    pub author_id: i64,
    pub question: Option<String>,
    pub options: Vec<String>,
    pub state: PollState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Poll {
    /// Fresh draft with no question, as written by `PollStore::insert`.
    pub fn draft(author_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            author_id,
            question: None,
            options: Vec::new(),
            state: PollState::New,
            created_at: now,
            updated_at: now,
        }
    }

    /// First 8 characters of the id, used in `/poll_` and `/close_` commands.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    pub fn question_text(&self) -> &str {
        self.question.as_deref().unwrap_or_default()
    }

    pub fn has_option(&self, index: usize) -> bool {
        index < self.options.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: i64,
    pub poll_id: Uuid,
    pub voter_id: i64,
    pub option_index: i32,
    pub voter_handle: Option<String>,
    pub voter_name: String,
}

/// Vote row before the store assigns it an id.
#[derive(Debug, Clone)]
pub struct NewVote {
    pub poll_id: Uuid,
    pub voter_id: i64,
    pub option_index: i32,
    pub voter_handle: Option<String>,
    pub voter_name: String,
}

/// Identity of the person pressing a vote button, as supplied by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voter {
    pub id: i64,
    pub handle: Option<String>,
    pub name: String,
}

impl Voter {
    pub fn new(id: i64, handle: Option<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            handle: handle.filter(|h| !h.is_empty()),
            name: name.into(),
        }
    }
}
