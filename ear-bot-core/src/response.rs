//! Classification of a reviewer's free-text reply to an invitation.

use std::fmt;

/// Substring that marks a reply as an acceptance.
pub const ACCEPT_MARKER: &str = "yes";

/// Substring that marks a reply as a refusal.
pub const DECLINE_MARKER: &str = "no";

/// A reviewer's answer to an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Response {
    Accept,
    Decline,
    /// Neither marker is present; the reply is ignored.
    Invalid,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Accept => write!(f, "accept"),
            Response::Decline => write!(f, "decline"),
            Response::Invalid => write!(f, "invalid"),
        }
    }
}

/// Classify a reply by case-insensitive substring match.
///
/// The accept marker is checked first, so a reply containing both markers
/// is an acceptance. Matching is on raw substrings: "nope" and "know" both
/// contain the decline marker.
pub fn classify(text: &str) -> Response {
    let lowered = text.to_lowercase();
    if lowered.contains(ACCEPT_MARKER) {
        Response::Accept
    } else if lowered.contains(DECLINE_MARKER) {
        Response::Decline
    } else {
        Response::Invalid
    }
}
