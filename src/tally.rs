// src/tally.rs
//! Ballot and result rendering.
//!
//! Output is Telegram MarkdownV2; every piece of user text goes through
//! [`escape_markdown`].

use crate::models::{Poll, PollState, Vote};

/// Characters MarkdownV2 requires to be backslash-escaped.
const MARKDOWN_SPECIAL: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// How a voter is shown next to an option.
fn voter_tag(vote: &Vote) -> String {
    match vote.voter_handle.as_deref() {
        Some(handle) if !handle.is_empty() => format!("@{}", escape_markdown(handle)),
        _ => {
            let name = if vote.voter_name.trim().is_empty() {
                vote.voter_id.to_string()
            } else {
                vote.voter_name.clone()
            };
            format!("[{}](tg://user?id={})", escape_markdown(&name), vote.voter_id)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionTally {
    pub text: String,
    /// Rendered voter tags in vote order.
    pub voters: Vec<String>,
}

/// Per-option view of a poll's votes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub question: String,
    pub options: Vec<OptionTally>,
    pub closed: bool,
    /// False when votes could not be read; then only the ballot is shown.
    pub counted: bool,
}

impl Tally {
    pub fn count(poll: &Poll, votes: &[Vote]) -> Self {
        let options = poll
            .options
            .iter()
            .enumerate()
            .map(|(idx, text)| OptionTally {
                text: text.clone(),
                voters: votes
                    .iter()
                    .filter(|v| v.poll_id == poll.id && v.option_index as usize == idx)
                    .map(voter_tag)
                    .collect(),
            })
            .collect();

        Self {
            question: poll.question_text().to_string(),
            options,
            closed: poll.state == PollState::Closed,
            counted: true,
        }
    }

    pub fn unavailable(poll: &Poll) -> Self {
        Self {
            counted: false,
            ..Self::count(poll, &[])
        }
    }

    /// Votes per option in option order, or `None` if votes weren't read.
    pub fn counts(&self) -> Option<Vec<usize>> {
        self.counted
            .then(|| self.options.iter().map(|o| o.voters.len()).collect())
    }

    pub fn render(&self) -> String {
        let mut message = format!("Question: *{}*\n\n", escape_markdown(&self.question));

        for option in &self.options {
            message += "\t • ";
            message += &escape_markdown(&option.text);
            if self.counted {
                message += &format!(" – {}\n", option.voters.len());
                if !option.voters.is_empty() {
                    message += &option.voters.join(", ");
                    message += "\n";
                }
            } else {
                message += "\n";
            }
        }

        if self.closed {
            message += "\n_Poll closed_\n";
        }
        message
    }
}

/// `/poll_<short id>` with the underscore escaped for MarkdownV2.
pub fn poll_command(poll: &Poll) -> String {
    format!("/poll\\_{}", poll.short_id())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll(options: &[&str]) -> Poll {
        Poll {
            question: Some("Lunch?".to_string()),
            options: options.iter().map(|o| o.to_string()).collect(),
            state: PollState::Open,
            ..Poll::draft(1)
        }
    }

    fn vote(poll: &Poll, id: i64, voter_id: i64, option: i32, handle: Option<&str>) -> Vote {
        Vote {
            id,
            poll_id: poll.id,
            voter_id,
            option_index: option,
            voter_handle: handle.map(str::to_string),
            voter_name: format!("Voter {}", voter_id),
        }
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a.b!"), "a\\.b\\!");
        assert_eq!(escape_markdown("1+1=2"), "1\\+1\\=2");
        assert_eq!(escape_markdown("plain"), "plain");
        assert_eq!(escape_markdown("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_counts_per_option() {
        let poll = poll(&["Pizza", "Sushi", "Soup"]);
        let votes = vec![
            vote(&poll, 1, 10, 0, Some("v1")),
            vote(&poll, 2, 20, 1, Some("v2")),
            vote(&poll, 3, 30, 0, Some("v3")),
        ];

        let tally = Tally::count(&poll, &votes);
        assert_eq!(tally.counts(), Some(vec![2, 1, 0]));
        assert_eq!(tally.options[0].voters, vec!["@v1", "@v3"]);
        assert_eq!(tally.options[1].voters, vec!["@v2"]);
        assert!(tally.options[2].voters.is_empty());
    }

    #[test]
    fn test_render_layout() {
        let poll = poll(&["Pizza", "Sushi"]);
        let votes = vec![
            vote(&poll, 1, 10, 0, Some("bob")),
            vote(&poll, 2, 20, 0, None),
        ];

        let text = Tally::count(&poll, &votes).render();
        assert_eq!(
            text,
            "Question: *Lunch?*\n\n\
             \t • Pizza – 2\n\
             @bob, [Voter 20](tg://user?id=20)\n\
             \t • Sushi – 0\n"
        );
    }

    #[test]
    fn test_unavailable_renders_ballot_only() {
        let poll = poll(&["Pizza", "Sushi"]);
        let tally = Tally::unavailable(&poll);
        assert_eq!(tally.counts(), None);
        assert_eq!(
            tally.render(),
            "Question: *Lunch?*\n\n\t • Pizza\n\t • Sushi\n"
        );
    }

    #[test]
    fn test_closed_poll_is_marked() {
        let poll = Poll {
            state: PollState::Closed,
            ..poll(&["a", "b"])
        };
        let text = Tally::count(&poll, &[]).render();
        assert!(text.ends_with("_Poll closed_\n"));
    }

    #[test]
    fn test_voter_without_handle_or_name_uses_id() {
        let poll = poll(&["a", "b"]);
        let mut anonymous = vote(&poll, 1, 77, 1, None);
        anonymous.voter_name = String::new();

        let tally = Tally::count(&poll, &[anonymous]);
        assert_eq!(tally.options[1].voters, vec!["[77](tg://user?id=77)"]);
    }

    #[test]
    fn test_user_text_is_escaped() {
        let poll = Poll {
            question: Some("1.5 or 2?".to_string()),
            ..poll(&["(a)", "b_c"])
        };
        let text = Tally::count(&poll, &[]).render();
        assert!(text.contains("*1\\.5 or 2?*"));
        assert!(text.contains("\\(a\\)"));
        assert!(text.contains("b\\_c"));
    }
}
