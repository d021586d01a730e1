//! Admin-side moderation workflow.
//!
//! # Responsibility
//! - Keep a snapshot of every article's comments for the moderation table.
//! - Filter the snapshot by text and status.
//! - Apply status transitions, confirmed deletes and bulk status changes.
//!
//! # Invariants
//! - `pending` is only an initial status; no transition leads back to it.
//! - The snapshot changes only after the backing store confirms a write.
//! - Delete requires a matching confirmation obtained from `request_delete`.
//! - Every mutation names the article whose comment panel must refetch.

use crate::model::comment::{ArticleId, CommentId, InvalidTransition, ModerationStatus};
use crate::repo::comment_repo::{DeletedComment, GatewayError, ModerationItem, ModerationRepository};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Bulk actions are written in chunks of this many comments.
pub const BULK_CHUNK_SIZE: usize = 20;

pub type ModerationResult<T> = Result<T, ModerationError>;

/// Errors from moderation actions.
#[derive(Debug)]
pub enum ModerationError {
    /// Target comment does not exist.
    CommentNotFound(CommentId),
    /// Requested move is not allowed from the current status.
    InvalidTransition(InvalidTransition),
    /// `confirm_delete` was called without a matching request.
    ConfirmationMismatch {
        expected: Option<CommentId>,
        actual: CommentId,
    },
    /// Backing store failure.
    Gateway(GatewayError),
}

impl Display for ModerationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CommentNotFound(id) => write!(f, "comment not found: {id}"),
            Self::InvalidTransition(err) => write!(f, "{err}"),
            Self::ConfirmationMismatch {
                expected: Some(expected),
                actual,
            } => write!(
                f,
                "delete confirmation for comment {actual} does not match pending request for {expected}"
            ),
            Self::ConfirmationMismatch {
                expected: None,
                actual,
            } => write!(f, "no pending delete request for comment {actual}"),
            Self::Gateway(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ModerationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidTransition(err) => Some(err),
            Self::Gateway(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GatewayError> for ModerationError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::NotFound(id) => Self::CommentNotFound(id),
            other => Self::Gateway(other),
        }
    }
}

impl From<InvalidTransition> for ModerationError {
    fn from(value: InvalidTransition) -> Self {
        Self::InvalidTransition(value)
    }
}

/// Status selector for the moderation table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(ModerationStatus),
}

impl StatusFilter {
    pub fn matches(self, status: ModerationStatus) -> bool {
        match self {
            Self::All => true,
            Self::Only(expected) => expected == status,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        value.parse().map(Self::Only)
    }
}

/// Result of one successful status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModerationChange {
    pub comment_id: CommentId,
    /// Article whose public thread must be refetched.
    pub article_id: ArticleId,
    pub previous: ModerationStatus,
    pub status: ModerationStatus,
}

impl ModerationChange {
    /// Whether the backing store was actually written.
    pub fn is_noop(&self) -> bool {
        self.previous == self.status
    }
}

/// Pending delete awaiting explicit confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteConfirmation {
    pub comment_id: CommentId,
    pub article_title: String,
    /// Replies removed along with the comment, as seen in the snapshot.
    pub reply_count: usize,
}

/// One failed item in a bulk action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    pub comment_id: CommentId,
    pub message: String,
}

/// Partial-success report for bulk actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub succeeded: Vec<ModerationChange>,
    pub failed: Vec<BulkFailure>,
}

impl BulkOutcome {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Case-insensitive text + status filter over moderation items.
///
/// Text matches against content, author name and author email as a plain
/// substring, whitespace included. An empty search matches everything.
pub fn filter_comments<'a>(
    items: &'a [ModerationItem],
    search: &str,
    status: StatusFilter,
) -> Vec<&'a ModerationItem> {
    let needle = search.to_lowercase();
    items
        .iter()
        .filter(|item| status.matches(item.comment.status))
        .filter(|item| {
            needle.is_empty()
                || item.comment.content.to_lowercase().contains(&needle)
                || item.comment.author_name.to_lowercase().contains(&needle)
                || item
                    .comment
                    .author_email
                    .as_deref()
                    .is_some_and(|email| email.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Moderation engine over a repository implementation.
pub struct ModerationWorkflow<R: ModerationRepository> {
    repo: R,
    items: Vec<ModerationItem>,
    pending_delete: Option<DeleteConfirmation>,
}

impl<R: ModerationRepository> ModerationWorkflow<R> {
    /// Creates a workflow with an empty snapshot. Call `refresh` to load.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            items: Vec::new(),
            pending_delete: None,
        }
    }

    /// Reloads the snapshot from the backing store.
    pub fn refresh(&mut self) -> ModerationResult<&[ModerationItem]> {
        self.items = self.repo.list_for_moderation()?;
        info!(
            "event=moderation_refresh module=moderation status=ok items={}",
            self.items.len()
        );
        Ok(&self.items)
    }

    /// Current snapshot, newest first.
    pub fn items(&self) -> &[ModerationItem] {
        &self.items
    }

    /// Filters the current snapshot without mutating it.
    pub fn filter(&self, search: &str, status: StatusFilter) -> Vec<&ModerationItem> {
        filter_comments(&self.items, search, status)
    }

    pub fn approve(&mut self, comment_id: CommentId) -> ModerationResult<ModerationChange> {
        self.transition(comment_id, ModerationStatus::Approved)
    }

    pub fn reject(&mut self, comment_id: CommentId) -> ModerationResult<ModerationChange> {
        self.transition(comment_id, ModerationStatus::Rejected)
    }

    /// Moves one comment to `target`.
    ///
    /// The current status is read from the backing store, not the snapshot.
    /// Re-applying the current `approved`/`rejected` status is a no-op.
    pub fn transition(
        &mut self,
        comment_id: CommentId,
        target: ModerationStatus,
    ) -> ModerationResult<ModerationChange> {
        match self.apply_transition(comment_id, target) {
            Ok(change) => {
                info!(
                    "event=moderation_transition module=moderation status=ok comment_id={} from={} to={} noop={}",
                    comment_id,
                    change.previous,
                    change.status,
                    change.is_noop()
                );
                Ok(change)
            }
            Err(err) => {
                warn!(
                    "event=moderation_transition module=moderation status=error comment_id={} to={} error={}",
                    comment_id, target, err
                );
                Err(err)
            }
        }
    }

    /// Starts a delete; nothing is removed until `confirm_delete`.
    ///
    /// A newer request replaces any earlier unconfirmed one.
    pub fn request_delete(
        &mut self,
        comment_id: CommentId,
    ) -> ModerationResult<DeleteConfirmation> {
        let item = self
            .repo
            .get_item(comment_id)?
            .ok_or(ModerationError::CommentNotFound(comment_id))?;
        // Counted in the store: the snapshot may be stale or never loaded.
        let reply_count = if item.parent_id.is_none() {
            self.repo.count_replies(comment_id)?
        } else {
            0
        };

        let confirmation = DeleteConfirmation {
            comment_id,
            article_title: item.article_title,
            reply_count,
        };
        self.pending_delete = Some(confirmation.clone());
        Ok(confirmation)
    }

    /// Drops the pending delete request, if any.
    pub fn cancel_delete(&mut self) -> Option<DeleteConfirmation> {
        self.pending_delete.take()
    }

    /// Performs the delete previously returned by `request_delete`.
    ///
    /// Removing a top-level comment also removes its replies.
    pub fn confirm_delete(
        &mut self,
        confirmation: &DeleteConfirmation,
    ) -> ModerationResult<DeletedComment> {
        match self.pending_delete.as_ref() {
            Some(pending) if pending == confirmation => {}
            other => {
                return Err(ModerationError::ConfirmationMismatch {
                    expected: other.map(|pending| pending.comment_id),
                    actual: confirmation.comment_id,
                });
            }
        }

        let deleted = match self.repo.delete_comment(confirmation.comment_id) {
            Ok(deleted) => deleted,
            Err(err) => {
                error!(
                    "event=moderation_delete module=moderation status=error comment_id={} error={}",
                    confirmation.comment_id, err
                );
                return Err(err.into());
            }
        };
        self.pending_delete = None;

        self.items.retain(|item| {
            item.comment.id != deleted.comment_id
                && !deleted.removed_replies.contains(&item.comment.id)
        });
        info!(
            "event=moderation_delete module=moderation status=ok comment_id={} article_id={} removed_replies={}",
            deleted.comment_id,
            deleted.article_id,
            deleted.removed_replies.len()
        );
        Ok(deleted)
    }

    /// Applies `target` to many comments, chunk by chunk.
    ///
    /// Failures are collected per comment; successful items are kept even
    /// when others fail.
    pub fn bulk_transition(
        &mut self,
        comment_ids: &[CommentId],
        target: ModerationStatus,
    ) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for (chunk_index, chunk) in comment_ids.chunks(BULK_CHUNK_SIZE).enumerate() {
            let failed_before = outcome.failed.len();
            for &comment_id in chunk {
                match self.apply_transition(comment_id, target) {
                    Ok(change) => outcome.succeeded.push(change),
                    Err(err) => outcome.failed.push(BulkFailure {
                        comment_id,
                        message: err.to_string(),
                    }),
                }
            }
            info!(
                "event=moderation_bulk_chunk module=moderation status=ok chunk={} size={} failed={} to={}",
                chunk_index,
                chunk.len(),
                outcome.failed.len() - failed_before,
                target
            );
        }
        outcome
    }

    fn apply_transition(
        &mut self,
        comment_id: CommentId,
        target: ModerationStatus,
    ) -> ModerationResult<ModerationChange> {
        let item = self
            .repo
            .get_item(comment_id)?
            .ok_or(ModerationError::CommentNotFound(comment_id))?;
        let previous = item.comment.status;
        let next = previous.transition_to(target)?;

        if next != previous {
            self.repo.set_status(comment_id, next)?;
        }

        if let Some(cached) = self
            .items
            .iter_mut()
            .find(|cached| cached.comment.id == comment_id)
        {
            cached.comment.status = next;
        }

        Ok(ModerationChange {
            comment_id,
            article_id: item.comment.article_id,
            previous,
            status: next,
        })
    }
}
