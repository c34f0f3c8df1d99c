//! Comment-history parsing.
//!
//! There is no database of invitations: the submission's comment thread is
//! the log. This module turns that thread into an ordered list of
//! [`ReviewEvent`]s which the state machine replays to find the current
//! review phase.
//!
//! The phrases below form a contract with the comments the bot posts. The
//! invitation marker in particular must not change, or threads started by
//! older versions stop being recognised.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::debug;

use crate::handle::Handle;
use crate::response::{classify, Response};

/// Literal phrase that identifies an invitation comment.
pub const INVITE_MARKER: &str = "Please reply to this message only with Yes or No by";

/// Phrase carried by the acknowledgement posted after a decline.
pub const DECLINE_ACK_MARKER: &str = "Thank you for letting us know";

/// Phrase carried by the notice posted when an invitation expires unanswered.
pub const TIMEOUT_MARKER: &str = "did not receive a reply before the deadline";

/// Phrase carried by the confirmation posted after an acceptance.
pub const ACCEPTED_MARKER: &str = "Thank you for agreeing to review";

/// Days an invited reviewer has to answer.
pub const RESPONSE_WINDOW_DAYS: i64 = 7;

/// Format used for deadlines in invitation comments.
pub const DEADLINE_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Deadline implied by an invitation posted at `at`.
pub fn invitation_deadline(at: DateTime<Utc>) -> DateTime<Utc> {
    at + Duration::days(RESPONSE_WINDOW_DAYS)
}

pub fn format_deadline(deadline: DateTime<Utc>) -> String {
    deadline.format(DEADLINE_FORMAT).to_string()
}

/// One comment of a submission's thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineComment {
    pub author: Handle,
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// True when the comment was posted by the bot itself.
    pub from_controller: bool,
}

/// Something that happened in a submission's thread, as far as reviewer
/// assignment is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewEvent {
    /// The bot invited `reviewer`.
    Invited { reviewer: Handle, at: DateTime<Utc> },

    /// A human replied.
    Responded {
        author: Handle,
        response: Response,
        text: String,
        at: DateTime<Utc>,
    },

    /// The bot posted a follow-up to an invitation.
    FollowedUp { kind: FollowUp, at: DateTime<Utc> },
}

/// Which follow-up the bot posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FollowUp {
    DeclineAcknowledged,
    TimeoutNotice,
    AcceptanceConfirmed,
}

impl FollowUp {
    /// Recognise a follow-up from the marker phrase in a bot comment.
    pub fn from_body(body: &str) -> Option<Self> {
        if body.contains(ACCEPTED_MARKER) {
            Some(FollowUp::AcceptanceConfirmed)
        } else if body.contains(DECLINE_ACK_MARKER) {
            Some(FollowUp::DeclineAcknowledged)
        } else if body.contains(TIMEOUT_MARKER) {
            Some(FollowUp::TimeoutNotice)
        } else {
            None
        }
    }
}

impl ReviewEvent {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            ReviewEvent::Invited { at, .. }
            | ReviewEvent::Responded { at, .. }
            | ReviewEvent::FollowedUp { at, .. } => *at,
        }
    }

    /// Build a response event by classifying `text`.
    pub fn response(author: Handle, text: impl Into<String>, at: DateTime<Utc>) -> Self {
        let text = text.into();
        ReviewEvent::Responded {
            author,
            response: classify(&text),
            text,
            at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// The newest invitation comment has no `@handle` after the marker.
    #[error("invitation comment posted at {at} does not mention a reviewer")]
    MissingMention { at: DateTime<Utc> },
}

/// Events recovered from a comment thread, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    pub events: Vec<ReviewEvent>,
}

impl History {
    pub fn new(events: Vec<ReviewEvent>) -> Self {
        Self { events }
    }

    /// The most recent invitation, if any.
    pub fn current_invitation(&self) -> Option<(&Handle, DateTime<Utc>)> {
        self.events.iter().rev().find_map(|event| match event {
            ReviewEvent::Invited { reviewer, at } => Some((reviewer, *at)),
            _ => None,
        })
    }

    /// Every handle ever invited on this thread, oldest first, without repeats.
    pub fn previously_invited(&self) -> Vec<Handle> {
        let mut invited: Vec<Handle> = Vec::new();
        for event in &self.events {
            if let ReviewEvent::Invited { reviewer, .. } = event {
                if !invited.contains(reviewer) {
                    invited.push(reviewer.clone());
                }
            }
        }
        invited
    }

    /// Follow-ups posted since the current invitation, oldest first.
    pub fn follow_ups(&self) -> Vec<FollowUp> {
        if self.current_invitation().is_none() {
            return Vec::new();
        }
        let mut kinds: Vec<FollowUp> = self
            .events
            .iter()
            .rev()
            .take_while(|event| !matches!(event, ReviewEvent::Invited { .. }))
            .filter_map(|event| match event {
                ReviewEvent::FollowedUp { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect();
        kinds.reverse();
        kinds
    }

    /// True when the bot already followed up on the current invitation.
    pub fn followed_up(&self) -> bool {
        !self.follow_ups().is_empty()
    }

    /// True when the bot already confirmed an acceptance of the current
    /// invitation. A timeout notice or decline acknowledgement does not count.
    pub fn confirmed_acceptance(&self) -> bool {
        self.follow_ups().contains(&FollowUp::AcceptanceConfirmed)
    }

    /// True when `author` already has a reply with exactly this text.
    pub fn has_reply(&self, author: &Handle, text: &str) -> bool {
        self.events.iter().any(|event| {
            matches!(event, ReviewEvent::Responded { author: a, text: t, .. } if a == author && t.trim() == text.trim())
        })
    }

    /// Append an event, keeping chronological order.
    pub fn push(&mut self, event: ReviewEvent) {
        let at = event.at();
        let index = self.events.partition_point(|existing| existing.at() <= at);
        self.events.insert(index, event);
    }
}

/// Parse a thread given newest comment first.
///
/// The first bot comment carrying [`INVITE_MARKER`] is the current
/// invitation; its reviewer is the first `@handle` after the marker. Older
/// invitations without a mention are skipped, but a current invitation
/// without one is an error because the phase cannot be known.
pub fn parse_history(newest_first: &[TimelineComment]) -> Result<History, HistoryError> {
    let mut events = Vec::new();
    let mut seen_invitation = false;

    for comment in newest_first {
        if comment.from_controller {
            if comment.body.contains(INVITE_MARKER) {
                match mention_after_marker(&comment.body, INVITE_MARKER) {
                    Some(reviewer) => {
                        events.push(ReviewEvent::Invited {
                            reviewer,
                            at: comment.created_at,
                        });
                    }
                    None if !seen_invitation => {
                        return Err(HistoryError::MissingMention {
                            at: comment.created_at,
                        });
                    }
                    None => {
                        debug!(
                            "Ignoring older invitation at {} without a mention",
                            comment.created_at
                        );
                    }
                }
                seen_invitation = true;
            } else if let Some(kind) = FollowUp::from_body(&comment.body) {
                events.push(ReviewEvent::FollowedUp {
                    kind,
                    at: comment.created_at,
                });
            }
        } else {
            events.push(ReviewEvent::response(
                comment.author.clone(),
                comment.body.clone(),
                comment.created_at,
            ));
        }
    }

    events.reverse();
    Ok(History { events })
}

/// First `@handle` token after `marker` in `body`.
pub fn mention_after_marker(body: &str, marker: &str) -> Option<Handle> {
    let start = body.find(marker)? + marker.len();
    first_mention(&body[start..])
}

/// First `@handle` token in `text`. An `@` glued to a preceding word
/// character (as in an e-mail address) is not a mention.
pub fn first_mention(text: &str) -> Option<Handle> {
    let mut previous: Option<char> = None;
    for (index, c) in text.char_indices() {
        if c == '@' && !previous.is_some_and(is_handle_char) {
            let rest = &text[index + 1..];
            let end = rest
                .char_indices()
                .find(|(_, c)| !is_handle_char(*c))
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            let login = rest[..end].trim_end_matches('-');
            if !login.is_empty() {
                return Some(Handle::new(login));
            }
        }
        previous = Some(c);
    }
    None
}

fn is_handle_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn bot(body: &str, day: u32) -> TimelineComment {
        TimelineComment {
            author: Handle::from("ear-bot[bot]"),
            body: body.to_string(),
            created_at: at(day),
            from_controller: true,
        }
    }

    fn human(author: &str, body: &str, day: u32) -> TimelineComment {
        TimelineComment {
            author: Handle::from(author),
            body: body.to_string(),
            created_at: at(day),
            from_controller: false,
        }
    }

    fn invite(reviewer: &str, day: u32) -> TimelineComment {
        bot(
            &format!(
                "Do you agree to review this assembly?\n\n{} {}\n\nInvited reviewer: @{}",
                INVITE_MARKER,
                format_deadline(invitation_deadline(at(day))),
                reviewer
            ),
            day,
        )
    }

    #[test]
    fn test_empty_thread_has_no_invitation() {
        let history = parse_history(&[]).unwrap();
        assert!(history.current_invitation().is_none());
        assert!(history.previously_invited().is_empty());
    }

    #[test]
    fn test_newest_invitation_is_current() {
        let comments = vec![invite("bob", 10), human("alice", "no", 5), invite("alice", 2)];
        let history = parse_history(&comments).unwrap();

        let (reviewer, when) = history.current_invitation().unwrap();
        assert_eq!(reviewer, &Handle::from("bob"));
        assert_eq!(when, at(10));
        assert_eq!(
            history.previously_invited(),
            vec![Handle::from("alice"), Handle::from("bob")]
        );
    }

    #[test]
    fn test_events_are_oldest_first() {
        let comments = vec![human("alice", "yes", 4), invite("alice", 2)];
        let history = parse_history(&comments).unwrap();
        assert!(matches!(history.events[0], ReviewEvent::Invited { .. }));
        assert!(matches!(
            history.events[1],
            ReviewEvent::Responded {
                response: Response::Accept,
                ..
            }
        ));
    }

    #[test]
    fn test_current_invitation_without_mention_fails() {
        let comments = vec![bot(&format!("{} tomorrow", INVITE_MARKER), 3)];
        assert_eq!(
            parse_history(&comments),
            Err(HistoryError::MissingMention { at: at(3) })
        );
    }

    #[test]
    fn test_older_invitation_without_mention_is_skipped() {
        let comments = vec![invite("bob", 10), bot(&format!("{} tomorrow", INVITE_MARKER), 3)];
        let history = parse_history(&comments).unwrap();
        assert_eq!(history.previously_invited(), vec![Handle::from("bob")]);
    }

    #[test]
    fn test_mention_before_marker_is_not_used() {
        let body = format!("Hi @alice! {} 2024-03-10 @bob", INVITE_MARKER);
        assert_eq!(
            mention_after_marker(&body, INVITE_MARKER),
            Some(Handle::from("bob"))
        );
    }

    #[test]
    fn test_human_marker_text_is_a_response_not_an_invitation() {
        let comments = vec![human("mallory", &format!("{} @mallory", INVITE_MARKER), 3)];
        let history = parse_history(&comments).unwrap();
        assert!(history.current_invitation().is_none());
    }

    #[test]
    fn test_first_mention_ignores_email_addresses() {
        assert_eq!(
            first_mention("write to me@example.org or ask @carol."),
            Some(Handle::from("carol"))
        );
        assert_eq!(first_mention("no mentions here"), None);
        assert_eq!(first_mention("a lone @ sign"), None);
    }

    #[test]
    fn test_followed_up_only_counts_after_current_invitation() {
        let ack = bot(&format!("{}, @alice.", DECLINE_ACK_MARKER), 6);
        let comments = vec![ack.clone(), human("alice", "no", 5), invite("alice", 2)];
        assert!(parse_history(&comments).unwrap().followed_up());

        let comments = vec![invite("bob", 7), ack, human("alice", "no", 5), invite("alice", 2)];
        assert!(!parse_history(&comments).unwrap().followed_up());
    }

    #[test]
    fn test_timeout_notice_is_not_a_confirmed_acceptance() {
        let notice = bot(&format!("We {} from @alice.", TIMEOUT_MARKER), 10);
        let comments = vec![human("alice", "yes", 11), notice, invite("alice", 2)];
        let history = parse_history(&comments).unwrap();
        assert!(history.followed_up());
        assert!(!history.confirmed_acceptance());
        assert_eq!(history.follow_ups(), vec![FollowUp::TimeoutNotice]);

        let mut comments = comments;
        comments.insert(0, bot(&format!("{}, @alice!", ACCEPTED_MARKER), 12));
        let history = parse_history(&comments).unwrap();
        assert!(history.confirmed_acceptance());
        assert_eq!(
            history.follow_ups(),
            vec![FollowUp::TimeoutNotice, FollowUp::AcceptanceConfirmed]
        );
    }

    #[test]
    fn test_push_keeps_chronological_order() {
        let mut history = parse_history(&[invite("alice", 2)]).unwrap();
        history.push(ReviewEvent::response(Handle::from("alice"), "yes", at(4)));
        assert!(history.has_reply(&Handle::from("ALICE"), "yes"));
        assert_eq!(history.events.last().unwrap().at(), at(4));
    }

    #[test]
    fn test_deadline_is_seven_days_after_invitation() {
        assert_eq!(invitation_deadline(at(1)), at(8));
        assert_eq!(format_deadline(at(8)), "2024-03-08 12:00:00 UTC");
    }
}
