// src/callback.rs
//! Vote button payloads.
//!
//! Telegram hands `callback_data` back verbatim when a button is pressed. We
//! encode `vote|<poll uuid>|<option index>` and parse it once at the edge.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::PollError;

pub const VOTE_TAG: &str = "vote";
const SEPARATOR: char = '|';

/// Telegram's upper bound on `callback_data`.
pub const MAX_PAYLOAD_BYTES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteCallback {
    pub poll_id: Uuid,
    pub option_index: usize,
}

impl VoteCallback {
    pub fn new(poll_id: Uuid, option_index: usize) -> Self {
        Self {
            poll_id,
            option_index,
        }
    }
}

impl fmt::Display for VoteCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{VOTE_TAG}{SEPARATOR}{}{SEPARATOR}{}",
            self.poll_id, self.option_index
        )
    }
}

impl FromStr for VoteCallback {
    type Err = PollError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        if data.len() > MAX_PAYLOAD_BYTES {
            return Err(PollError::validation("Unknown button"));
        }
        let fields: Vec<&str> = data.split(SEPARATOR).collect();
        let [tag, poll_id, option] = fields.as_slice() else {
            return Err(PollError::validation("Unknown button"));
        };

        if *tag != VOTE_TAG {
            return Err(PollError::validation("Unknown button"));
        }
        let poll_id =
            Uuid::parse_str(poll_id).map_err(|_| PollError::validation("Unknown poll"))?;
        let option_index = option
            .parse::<usize>()
            .map_err(|_| PollError::validation("Unknown answer"))?;

        Ok(Self::new(poll_id, option_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_and_parse() {
        let poll_id = Uuid::new_v4();
        let payload = VoteCallback::new(poll_id, 3).to_string();
        assert_eq!(payload, format!("vote|{}|3", poll_id));
        assert!(payload.len() <= MAX_PAYLOAD_BYTES);

        let parsed: VoteCallback = payload.parse().unwrap();
        assert_eq!(parsed, VoteCallback::new(poll_id, 3));
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        let id = Uuid::new_v4();
        let bad = [
            String::new(),
            "vote".to_string(),
            format!("vote|{}", id),
            format!("vote|{}|1|2", id),
            format!("other|{}|1", id),
            "vote|not-a-uuid|1".to_string(),
            format!("vote|{}|one", id),
            format!("vote|{}|-1", id),
            format!("vote|{}|{}", id, "1".repeat(40)),
        ];
        for payload in bad {
            let result = payload.parse::<VoteCallback>();
            assert!(
                matches!(result, Err(PollError::Validation(_))),
                "accepted {payload:?}"
            );
        }
    }

    #[test]
    fn test_longest_payload_fits() {
        let payload = VoteCallback::new(Uuid::from_u128(u128::MAX), 999).to_string();
        assert!(payload.len() <= MAX_PAYLOAD_BYTES);
    }
}
