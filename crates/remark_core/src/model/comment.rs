//! Comment domain model.
//!
//! # Responsibility
//! - Define the two-level comment tree shared by store, gateway and
//!   moderation layers.
//! - Own submission validation and moderation status transitions.
//!
//! # Invariants
//! - A `Reply` cannot carry replies; thread depth is fixed at two levels.
//! - `CommentId` values grow with creation order and double as a time proxy.
//! - `pending` is only ever an initial status, never a transition target.
//! - Vote counters never go below zero.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Monotonic comment identifier assigned at creation time.
pub type CommentId = i64;

/// Foreign reference to the article a comment belongs to.
pub type ArticleId = Uuid;

/// Moderation state governing public visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    /// Awaiting a moderator decision. Only reachable at creation.
    Pending,
    /// Publicly visible.
    Approved,
    /// Hidden from the public thread.
    Rejected,
}

impl ModerationStatus {
    /// Stable lowercase name used in storage and wire payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Returns whether `self -> target` is an allowed moderation move.
    ///
    /// Re-applying `approved` or `rejected` is accepted as a no-op move.
    pub fn can_transition_to(self, target: ModerationStatus) -> bool {
        !matches!(target, Self::Pending)
    }

    /// Validates `self -> target` and returns the resulting status.
    pub fn transition_to(
        self,
        target: ModerationStatus,
    ) -> Result<ModerationStatus, InvalidTransition> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(InvalidTransition { from: self, to: target })
        }
    }
}

impl Display for ModerationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModerationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!(
                "unsupported moderation status `{other}`; expected pending|approved|rejected"
            )),
        }
    }
}

/// Rejected moderation move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ModerationStatus,
    pub to: ModerationStatus,
}

impl Display for InvalidTransition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot move comment from `{}` to `{}`", self.from, self.to)
    }
}

impl Error for InvalidTransition {}

/// Like/dislike counters carried by every comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteCounts {
    pub like_count: u32,
    pub dislike_count: u32,
}

/// Fields shared by top-level comments and replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentBody {
    pub id: CommentId,
    pub article_id: ArticleId,
    pub author_name: String,
    pub author_email: Option<String>,
    pub content: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    pub status: ModerationStatus,
    #[serde(flatten)]
    pub votes: VoteCounts,
}

/// Comment attached directly to an article; the only kind that holds replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopLevelComment {
    #[serde(flatten)]
    pub body: CommentBody,
    /// Insertion-ordered, append-only.
    pub replies: Vec<Reply>,
}

impl TopLevelComment {
    /// Wraps a body as a top-level comment with no replies.
    pub fn new(body: CommentBody) -> Self {
        Self {
            body,
            replies: Vec::new(),
        }
    }

    pub fn id(&self) -> CommentId {
        self.body.id
    }

    /// Finds one of this comment's replies by id.
    pub fn reply_mut(&mut self, reply_id: CommentId) -> Option<&mut Reply> {
        self.replies.iter_mut().find(|reply| reply.body.id == reply_id)
    }
}

/// Comment attached to a top-level comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(flatten)]
    pub body: CommentBody,
    pub parent_id: CommentId,
}

/// Tagged union over both comment levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Comment {
    TopLevel(TopLevelComment),
    Reply(Reply),
}

impl Comment {
    pub fn body(&self) -> &CommentBody {
        match self {
            Self::TopLevel(comment) => &comment.body,
            Self::Reply(reply) => &reply.body,
        }
    }

    pub fn id(&self) -> CommentId {
        self.body().id
    }

    pub fn parent_id(&self) -> Option<CommentId> {
        match self {
            Self::TopLevel(_) => None,
            Self::Reply(reply) => Some(reply.parent_id),
        }
    }

    /// Ledger key addressing this comment's own vote state.
    pub fn vote_key(&self) -> VoteKey {
        match self {
            Self::TopLevel(comment) => VoteKey::Comment(comment.body.id),
            Self::Reply(reply) => VoteKey::Reply(reply.body.id),
        }
    }
}

/// Namespaced vote identity. A reply is keyed by its own id, never its
/// parent's, so reply votes cannot leak into parent counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VoteKey {
    Comment(CommentId),
    Reply(CommentId),
}

impl Display for VoteKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Comment(id) => write!(f, "comment-{id}"),
            Self::Reply(id) => write!(f, "reply-{id}"),
        }
    }
}

impl FromStr for VoteKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parse_id = |raw: &str| {
            raw.parse::<CommentId>()
                .map_err(|_| format!("invalid vote key `{value}`"))
        };
        if let Some(raw) = value.strip_prefix("comment-") {
            return parse_id(raw).map(Self::Comment);
        }
        if let Some(raw) = value.strip_prefix("reply-") {
            return parse_id(raw).map(Self::Reply);
        }
        Err(format!("invalid vote key `{value}`"))
    }
}

/// Submission validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentValidationError {
    /// Author name is blank after trim.
    EmptyAuthorName,
    /// Content is blank after trim.
    EmptyContent,
    /// Email is present but does not look like `local@domain.tld`.
    InvalidEmail(String),
}

impl Display for CommentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyAuthorName => write!(f, "author name must not be empty"),
            Self::EmptyContent => write!(f, "comment content must not be empty"),
            Self::InvalidEmail(value) => write!(f, "invalid email address: `{value}`"),
        }
    }
}

impl Error for CommentValidationError {}

/// Normalized, validated submission input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSubmission {
    pub author_name: String,
    pub author_email: Option<String>,
    pub content: String,
}

/// Validates raw submission fields before any mutation happens.
///
/// Name and content are trimmed. A blank email counts as absent.
pub fn validate_submission(
    author_name: &str,
    content: &str,
    author_email: Option<&str>,
) -> Result<ValidSubmission, CommentValidationError> {
    let author_name = author_name.trim();
    if author_name.is_empty() {
        return Err(CommentValidationError::EmptyAuthorName);
    }

    let content = content.trim();
    if content.is_empty() {
        return Err(CommentValidationError::EmptyContent);
    }

    let author_email = match author_email.map(str::trim) {
        None | Some("") => None,
        Some(email) if EMAIL_RE.is_match(email) => Some(email.to_string()),
        Some(email) => return Err(CommentValidationError::InvalidEmail(email.to_string())),
    };

    Ok(ValidSubmission {
        author_name: author_name.to_string(),
        author_email,
        content: content.to_string(),
    })
}
