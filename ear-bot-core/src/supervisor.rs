//! Supervisor picking for initial triage.

use rand::seq::IndexedRandom;
use rand::Rng;

use crate::handle::Handle;

/// Pick a random supervisor other than the submitter.
///
/// Returns `None` when no supervisor is eligible.
pub fn pick_supervisor<R: Rng + ?Sized>(
    supervisors: &[Handle],
    submitter: &Handle,
    rng: &mut R,
) -> Option<Handle> {
    let eligible: Vec<&Handle> = supervisors
        .iter()
        .filter(|supervisor| *supervisor != submitter)
        .collect();
    eligible.choose(rng).map(|supervisor| (*supervisor).clone())
}
