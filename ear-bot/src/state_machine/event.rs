//! Replaying review events into a phase.

use chrono::{DateTime, Utc};

use ear_bot_core::history::invitation_deadline;
use ear_bot_core::{Response, ReviewEvent};

use super::state::ReviewPhase;

/// Fold an oldest-first event list into the phase it implies at `now`.
///
/// Only the latest invitation matters. The first Accept or Decline from the
/// invitee after it decides the outcome; replies from anyone else and
/// Invalid replies are ignored. Without a decisive reply the invitation
/// times out strictly after its deadline.
pub fn phase_from_events(events: &[ReviewEvent], now: DateTime<Utc>) -> ReviewPhase {
    let Some(index) = events
        .iter()
        .rposition(|event| matches!(event, ReviewEvent::Invited { .. }))
    else {
        return ReviewPhase::AwaitingInvite;
    };
    let ReviewEvent::Invited { reviewer, at } = &events[index] else {
        return ReviewPhase::AwaitingInvite;
    };

    let decisive = events[index + 1..].iter().find_map(|event| match event {
        ReviewEvent::Responded {
            author, response, ..
        } if author == reviewer && *response != Response::Invalid => Some(*response),
        _ => None,
    });

    match decisive {
        Some(Response::Accept) => ReviewPhase::Accepted,
        Some(Response::Decline) => ReviewPhase::Declined,
        _ if now > invitation_deadline(*at) => ReviewPhase::TimedOut,
        _ => ReviewPhase::Invited,
    }
}
