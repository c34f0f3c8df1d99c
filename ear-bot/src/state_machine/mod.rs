//! Reviewer assignment as an explicit state machine.
//!
//! - **State**: the review phase derived from the comment thread (`ReviewPhase`)
//! - **Events**: what the thread says happened (`ReviewEvent`)
//! - **Effects**: what to do about it (`Effect`)
//! - **Transition**: pure functions from a decision bundle to effects
//!
//! The interpreter executes effects against the platform and the in-memory
//! roster.

pub mod effect;
pub mod event;
pub mod interpreter;
pub mod reconstruct;
pub mod state;
pub mod transition;

pub use effect::*;
pub use event::*;
pub use reconstruct::*;
pub use state::*;
pub use transition::*;
