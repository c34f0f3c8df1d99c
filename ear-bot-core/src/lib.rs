pub mod handle;
pub mod history;
pub mod ledger;
pub mod response;
pub mod roster;
pub mod selection;
pub mod submission;
pub mod supervisor;

pub use handle::Handle;
pub use history::{
    parse_history, FollowUp, History, HistoryError, ReviewEvent, TimelineComment,
    RESPONSE_WINDOW_DAYS,
};
pub use ledger::{CompletionRecord, Ledger, LedgerError};
pub use response::{classify, Response};
pub use roster::{ReviewerRecord, Roster, RosterError, RosterFile};
pub use selection::{select, Selection};
pub use submission::{parse_metadata, MetadataError, Submission, SubmissionId, SubmissionMetadata};
pub use supervisor::pick_supervisor;
