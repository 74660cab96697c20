pub mod config;
pub mod types;

pub use config::Config;
pub use types::{
    CandidateItem, EngagementSnapshot, NewPendingReply, PendingReply, Provenance, RepliedAuthor,
    ReplyOption, ReplyPayload, ReplyStatus, SourceKind, SourceStatus, TrackedSource,
};
