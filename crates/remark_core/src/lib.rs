//! Core comment & moderation logic for the content site.
//! This crate is the single source of truth for comment invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sort;
pub mod vote;

pub use config::CommentSettings;
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::comment::{
    validate_submission, ArticleId, Comment, CommentBody, CommentId, CommentValidationError,
    InvalidTransition, ModerationStatus, Reply, TopLevelComment, VoteCounts, VoteKey,
};
pub use repo::comment_repo::{
    ArticleRef, CommentGateway, DeletedComment, GatewayError, GatewayResult, ModerationItem,
    ModerationRepository, NewCommentRecord, SqliteCommentGateway, Visibility,
};
pub use repo::identity_repo::{
    IdentityError, IdentityStore, MemoryIdentityStore, SqliteIdentityStore, ViewerIdentity,
};
pub use service::moderation_service::{
    filter_comments, BulkFailure, BulkOutcome, DeleteConfirmation, ModerationChange,
    ModerationError, ModerationResult, ModerationWorkflow, StatusFilter, BULK_CHUNK_SIZE,
};
pub use service::thread_service::{CommentThreadStore, ReportReceipt, ThreadError, ThreadResult};
pub use sort::{sort_comments, SortMode};
pub use vote::{Vote, VoteChange, VoteLedger};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
