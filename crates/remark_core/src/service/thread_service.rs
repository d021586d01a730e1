//! Comment thread store for one article.
//!
//! # Responsibility
//! - Hold the two-level comment tree shown by the comment panel.
//! - Validate and create comments/replies, remembering the commenter
//!   identity for the next submission.
//! - Route vote presses through a borrowed per-viewer `VoteLedger`.
//!
//! # Invariants
//! - Validation runs before any mutation; a rejected submission leaves the
//!   tree untouched.
//! - New top-level comments go to the head when the sort mode is `newest`
//!   and to the tail otherwise.
//! - Replies are appended to their parent and never change the top-level
//!   collection.
//! - Ids handed out by the store are strictly increasing.

use crate::config::CommentSettings;
use crate::model::comment::{
    validate_submission, ArticleId, Comment, CommentBody, CommentId, CommentValidationError,
    ModerationStatus, Reply, TopLevelComment, VoteCounts, VoteKey,
};
use crate::repo::identity_repo::{IdentityError, IdentityStore, ViewerIdentity};
use crate::sort::{sort_comments, SortMode};
use crate::vote::{VoteChange, VoteLedger};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

const REPORT_ACK_MESSAGE: &str = "Thanks, a moderator has been notified.";

pub type ThreadResult<T> = Result<T, ThreadError>;

/// Errors from comment thread operations.
#[derive(Debug)]
pub enum ThreadError {
    /// Comment panel is switched off by site settings.
    CommentsDisabled,
    /// Submission failed field validation.
    Validation(CommentValidationError),
    /// Reply target is not a top-level comment of this thread.
    ParentNotFound(CommentId),
    /// Addressed comment is not in this thread.
    CommentNotFound(VoteKey),
    /// Comment id is already present in this thread.
    DuplicateComment(CommentId),
    /// Comment belongs to another article's thread.
    ForeignArticle {
        expected: ArticleId,
        actual: ArticleId,
    },
    /// Identity slot could not be read.
    Identity(IdentityError),
}

impl Display for ThreadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CommentsDisabled => write!(f, "comments are disabled for this site"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::ParentNotFound(id) => write!(f, "reply parent not found: {id}"),
            Self::CommentNotFound(key) => write!(f, "comment not found: {key}"),
            Self::DuplicateComment(id) => write!(f, "comment {id} is already in this thread"),
            Self::ForeignArticle { expected, actual } => write!(
                f,
                "comment belongs to article {actual}, not this thread's {expected}"
            ),
            Self::Identity(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ThreadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Identity(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CommentValidationError> for ThreadError {
    fn from(value: CommentValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<IdentityError> for ThreadError {
    fn from(value: IdentityError) -> Self {
        Self::Identity(value)
    }
}

/// Acknowledgement returned by `report`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportReceipt {
    pub key: VoteKey,
    pub message: &'static str,
}

/// In-memory comment tree for one article.
pub struct CommentThreadStore<I: IdentityStore> {
    article_id: ArticleId,
    initial_status: ModerationStatus,
    sort_mode: SortMode,
    comments: Vec<TopLevelComment>,
    next_id: CommentId,
    identity: I,
}

impl<I: IdentityStore> CommentThreadStore<I> {
    /// Creates an empty thread.
    ///
    /// `initial_status` is stamped on every comment created here; pass
    /// `Approved` for the local-only, always-visible variant.
    pub fn new(article_id: ArticleId, initial_status: ModerationStatus, identity: I) -> Self {
        Self {
            article_id,
            initial_status,
            sort_mode: SortMode::default(),
            comments: Vec::new(),
            next_id: 1,
            identity,
        }
    }

    /// Creates an empty thread honoring site comment settings.
    pub fn for_settings(
        article_id: ArticleId,
        settings: &CommentSettings,
        identity: I,
    ) -> ThreadResult<Self> {
        if !settings.enable_comments {
            return Err(ThreadError::CommentsDisabled);
        }
        Ok(Self::new(article_id, settings.initial_status(), identity))
    }

    /// Replaces the tree with a fetched one, ordered by the current mode.
    pub fn hydrate(&mut self, tree: Vec<TopLevelComment>) {
        let max_id = tree
            .iter()
            .flat_map(|comment| {
                std::iter::once(comment.body.id)
                    .chain(comment.replies.iter().map(|reply| reply.body.id))
            })
            .max()
            .unwrap_or(0);
        self.next_id = self.next_id.max(max_id.saturating_add(1));
        self.comments = sort_comments(&tree, self.sort_mode);
    }

    pub fn article_id(&self) -> ArticleId {
        self.article_id
    }

    pub fn sort_mode(&self) -> SortMode {
        self.sort_mode
    }

    /// Changes the mode used for future insertions and `sorted()`.
    pub fn set_sort_mode(&mut self, mode: SortMode) {
        self.sort_mode = mode;
    }

    /// Top-level comments in store order.
    pub fn comments(&self) -> &[TopLevelComment] {
        &self.comments
    }

    /// Top-level comments ordered by the current sort mode.
    pub fn sorted(&self) -> Vec<TopLevelComment> {
        sort_comments(&self.comments, self.sort_mode)
    }

    /// Total comments including replies.
    pub fn total_count(&self) -> usize {
        self.comments
            .iter()
            .map(|comment| 1 + comment.replies.len())
            .sum()
    }

    /// Identity remembered from the last successful submission.
    pub fn remembered_identity(&self) -> ThreadResult<Option<ViewerIdentity>> {
        Ok(self.identity.load()?)
    }

    /// Creates a top-level comment.
    pub fn submit_comment(
        &mut self,
        name: &str,
        content: &str,
        email: Option<&str>,
    ) -> ThreadResult<&TopLevelComment> {
        let valid = validate_submission(name, content, email)?;
        let body = self.next_body(valid.author_name, valid.author_email, valid.content);
        let comment_id = body.id;
        self.remember_identity(&body);

        let comment = TopLevelComment::new(body);
        let position = if self.sort_mode == SortMode::Newest {
            self.comments.insert(0, comment);
            0
        } else {
            self.comments.push(comment);
            self.comments.len() - 1
        };

        info!(
            "event=comment_submit module=thread status=ok article_id={} comment_id={} position={}",
            self.article_id, comment_id, position
        );
        Ok(&self.comments[position])
    }

    /// Appends a reply to an existing top-level comment.
    pub fn submit_reply(
        &mut self,
        parent_id: CommentId,
        name: &str,
        content: &str,
        email: Option<&str>,
    ) -> ThreadResult<&Reply> {
        let valid = validate_submission(name, content, email)?;
        let position = self
            .comments
            .iter()
            .position(|comment| comment.body.id == parent_id)
            .ok_or(ThreadError::ParentNotFound(parent_id))?;

        let body = self.next_body(valid.author_name, valid.author_email, valid.content);
        let reply_id = body.id;
        self.remember_identity(&body);

        let parent = &mut self.comments[position];
        parent.replies.push(Reply { body, parent_id });

        info!(
            "event=reply_submit module=thread status=ok article_id={} comment_id={} parent_id={}",
            self.article_id, reply_id, parent_id
        );
        let replies = &self.comments[position].replies;
        Ok(&replies[replies.len() - 1])
    }

    /// Places a comment persisted through the gateway into the local tree.
    ///
    /// Fails without touching the store when the comment is already present,
    /// belongs to another article, or is a reply whose parent is missing.
    pub fn absorb(&mut self, comment: Comment) -> ThreadResult<()> {
        let comment_id = comment.id();
        let article_id = comment.body().article_id;
        if article_id != self.article_id {
            return Err(ThreadError::ForeignArticle {
                expected: self.article_id,
                actual: article_id,
            });
        }
        if self.contains_id(comment_id) {
            return Err(ThreadError::DuplicateComment(comment_id));
        }

        match comment {
            Comment::TopLevel(top_level) => {
                if self.sort_mode == SortMode::Newest {
                    self.comments.insert(0, top_level);
                } else {
                    self.comments.push(top_level);
                }
            }
            Comment::Reply(reply) => {
                let parent_id = reply.parent_id;
                let parent = self
                    .comments
                    .iter_mut()
                    .find(|comment| comment.body.id == parent_id)
                    .ok_or(ThreadError::ParentNotFound(parent_id))?;
                parent.replies.push(reply);
            }
        }
        self.next_id = self.next_id.max(comment_id.saturating_add(1));
        Ok(())
    }

    fn contains_id(&self, comment_id: CommentId) -> bool {
        self.comments.iter().any(|comment| {
            comment.body.id == comment_id
                || comment.replies.iter().any(|reply| reply.body.id == comment_id)
        })
    }

    /// Acknowledges a report. Comment state is not changed and no
    /// moderation queue entry is created.
    pub fn report(&self, key: VoteKey) -> ThreadResult<ReportReceipt> {
        if self.find_body(key).is_none() {
            return Err(ThreadError::CommentNotFound(key));
        }
        info!(
            "event=comment_report module=thread status=ok article_id={} key={}",
            self.article_id, key
        );
        Ok(ReportReceipt {
            key,
            message: REPORT_ACK_MESSAGE,
        })
    }

    /// Presses "like" for this viewer on the addressed comment or reply.
    pub fn toggle_like(
        &mut self,
        ledger: &mut VoteLedger,
        key: VoteKey,
    ) -> ThreadResult<(VoteChange, VoteCounts)> {
        let body = self
            .find_body_mut(key)
            .ok_or(ThreadError::CommentNotFound(key))?;
        let change = ledger.toggle_like(key, &mut body.votes);
        Ok((change, body.votes))
    }

    /// Presses "dislike" for this viewer on the addressed comment or reply.
    pub fn toggle_dislike(
        &mut self,
        ledger: &mut VoteLedger,
        key: VoteKey,
    ) -> ThreadResult<(VoteChange, VoteCounts)> {
        let body = self
            .find_body_mut(key)
            .ok_or(ThreadError::CommentNotFound(key))?;
        let change = ledger.toggle_dislike(key, &mut body.votes);
        Ok((change, body.votes))
    }

    /// Mirrors a moderation delete locally.
    ///
    /// Removing a top-level comment removes its replies too; every removed
    /// key is forgotten by `ledger`. Returns the removed ids.
    pub fn remove_comment(
        &mut self,
        ledger: &mut VoteLedger,
        comment_id: CommentId,
    ) -> ThreadResult<Vec<CommentId>> {
        if let Some(position) = self
            .comments
            .iter()
            .position(|comment| comment.body.id == comment_id)
        {
            let removed = self.comments.remove(position);
            ledger.forget(VoteKey::Comment(comment_id));
            let mut ids = vec![comment_id];
            for reply in removed.replies {
                ledger.forget(VoteKey::Reply(reply.body.id));
                ids.push(reply.body.id);
            }
            return Ok(ids);
        }

        for comment in &mut self.comments {
            if let Some(position) = comment
                .replies
                .iter()
                .position(|reply| reply.body.id == comment_id)
            {
                comment.replies.remove(position);
                ledger.forget(VoteKey::Reply(comment_id));
                return Ok(vec![comment_id]);
            }
        }

        Err(ThreadError::CommentNotFound(VoteKey::Comment(comment_id)))
    }

    fn next_body(
        &mut self,
        author_name: String,
        author_email: Option<String>,
        content: String,
    ) -> CommentBody {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        CommentBody {
            id,
            article_id: self.article_id,
            author_name,
            author_email,
            content,
            created_at: now_epoch_ms(),
            status: self.initial_status,
            votes: VoteCounts::default(),
        }
    }

    fn remember_identity(&self, body: &CommentBody) {
        let identity = ViewerIdentity {
            name: body.author_name.clone(),
            email: body.author_email.clone(),
        };
        if let Err(err) = self.identity.save(&identity) {
            warn!(
                "event=identity_save module=thread status=error comment_id={} error={}",
                body.id, err
            );
        }
    }

    fn find_body(&self, key: VoteKey) -> Option<&CommentBody> {
        match key {
            VoteKey::Comment(id) => self
                .comments
                .iter()
                .find(|comment| comment.body.id == id)
                .map(|comment| &comment.body),
            VoteKey::Reply(id) => self
                .comments
                .iter()
                .flat_map(|comment| comment.replies.iter())
                .find(|reply| reply.body.id == id)
                .map(|reply| &reply.body),
        }
    }

    fn find_body_mut(&mut self, key: VoteKey) -> Option<&mut CommentBody> {
        match key {
            VoteKey::Comment(id) => self
                .comments
                .iter_mut()
                .find(|comment| comment.body.id == id)
                .map(|comment| &mut comment.body),
            VoteKey::Reply(id) => self
                .comments
                .iter_mut()
                .find_map(|comment| comment.reply_mut(id))
                .map(|reply| &mut reply.body),
        }
    }
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{CommentThreadStore, ThreadError};
    use crate::model::comment::{CommentValidationError, ModerationStatus, VoteKey};
    use crate::repo::identity_repo::MemoryIdentityStore;
    use crate::sort::SortMode;
    use uuid::Uuid;

    fn store() -> CommentThreadStore<MemoryIdentityStore> {
        CommentThreadStore::new(
            Uuid::new_v4(),
            ModerationStatus::Approved,
            MemoryIdentityStore::new(),
        )
    }

    #[test]
    fn newest_mode_inserts_at_head_and_others_at_tail() {
        let mut thread = store();
        let first = thread.submit_comment("Ada", "one", None).unwrap().body.id;
        let second = thread.submit_comment("Ada", "two", None).unwrap().body.id;
        assert_eq!(thread.comments()[0].body.id, second);

        thread.set_sort_mode(SortMode::Oldest);
        let third = thread.submit_comment("Ada", "three", None).unwrap().body.id;
        let ids: Vec<_> = thread.comments().iter().map(|c| c.body.id).collect();
        assert_eq!(ids, vec![second, first, third]);
    }

    #[test]
    fn empty_content_is_rejected_without_mutation() {
        let mut thread = store();
        thread.submit_comment("Ada", "kept", None).unwrap();

        let err = thread.submit_comment("Ada", "   ", None).unwrap_err();
        assert!(matches!(
            err,
            ThreadError::Validation(CommentValidationError::EmptyContent)
        ));
        assert_eq!(thread.total_count(), 1);
    }

    #[test]
    fn report_requires_existing_comment() {
        let mut thread = store();
        let id = thread.submit_comment("Ada", "hi", None).unwrap().body.id;

        let receipt = thread.report(VoteKey::Comment(id)).unwrap();
        assert!(!receipt.message.is_empty());
        assert!(matches!(
            thread.report(VoteKey::Reply(id)),
            Err(ThreadError::CommentNotFound(VoteKey::Reply(_)))
        ));
    }
}
