//! Comment gateway contracts and SQLite backing store.
//!
//! # Responsibility
//! - Define the gateway contract the rendering surface uses to fetch and
//!   persist comment trees.
//! - Define the moderation query surface (comment joined with article
//!   title) and status/delete mutations.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths validate submissions before SQL mutations.
//! - A reply's `parent_id` must reference a top-level comment of the same
//!   article; replies to replies are rejected.
//! - Deleting a top-level comment cascades to its replies.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::{ensure_schema_ready, DbError};
use crate::model::comment::{
    validate_submission, ArticleId, Comment, CommentBody, CommentId, CommentValidationError,
    ModerationStatus, Reply, TopLevelComment, VoteCounts,
};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const COMMENT_SELECT_SQL: &str = "SELECT
    id,
    article_uuid,
    parent_id,
    author_name,
    author_email,
    content,
    status,
    like_count,
    dislike_count,
    created_at
FROM comments";

const MODERATION_SELECT_SQL: &str = "SELECT
    c.id,
    c.article_uuid,
    c.parent_id,
    c.author_name,
    c.author_email,
    c.content,
    c.status,
    c.like_count,
    c.dislike_count,
    c.created_at,
    a.title AS article_title
FROM comments c
INNER JOIN articles a ON a.uuid = c.article_uuid";

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors from gateway fetch/persist and moderation store operations.
#[derive(Debug)]
pub enum GatewayError {
    /// Submission failed field validation.
    Validation(CommentValidationError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target comment does not exist.
    NotFound(CommentId),
    /// Reply target is missing, is itself a reply, or belongs elsewhere.
    ParentNotFound(CommentId),
    /// Target article reference is unknown to the store.
    ArticleNotFound(ArticleId),
    /// Persisted data cannot be converted to a valid comment.
    InvalidData(String),
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "comment not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "reply parent not found: {id}"),
            Self::ArticleNotFound(id) => write!(f, "article not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted comment data: {message}"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CommentValidationError> for GatewayError {
    fn from(value: CommentValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for GatewayError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Which statuses a thread fetch returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// What readers see: approved comments, and approved replies under an
    /// approved parent.
    #[default]
    Public,
    /// Every status; for previews and moderation tooling.
    All,
}

impl Visibility {
    pub fn shows(self, status: ModerationStatus) -> bool {
        match self {
            Self::Public => status == ModerationStatus::Approved,
            Self::All => true,
        }
    }
}

/// Inbound wire record for a new comment or reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommentRecord {
    pub article_id: ArticleId,
    pub author_name: String,
    pub author_email: Option<String>,
    pub content: String,
    pub user_id: Option<String>,
    pub parent_id: Option<CommentId>,
}

/// Article reference owned by the external article subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRef {
    pub id: ArticleId,
    pub title: String,
}

/// Moderation read model: one comment plus its article title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationItem {
    #[serde(flatten)]
    pub comment: CommentBody,
    pub parent_id: Option<CommentId>,
    pub article_title: String,
}

/// Summary of a hard delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedComment {
    pub comment_id: CommentId,
    pub article_id: ArticleId,
    /// Replies removed together with a top-level comment.
    pub removed_replies: Vec<CommentId>,
}

/// Gateway contract consumed by the rendering surface.
///
/// No push or subscription exists: after `post_comment` callers refetch or
/// append the returned comment locally.
pub trait CommentGateway {
    /// Loads the public two-level tree for one article, oldest first.
    fn fetch_comments(&self, article_id: ArticleId) -> GatewayResult<Vec<TopLevelComment>> {
        self.fetch_thread(article_id, Visibility::Public)
    }
    /// Loads the tree restricted to `visibility`, oldest first.
    fn fetch_thread(
        &self,
        article_id: ArticleId,
        visibility: Visibility,
    ) -> GatewayResult<Vec<TopLevelComment>>;
    /// Persists one comment or reply and returns the hydrated record.
    fn post_comment(&self, record: &NewCommentRecord) -> GatewayResult<Comment>;
    /// Overwrites vote counters (last write wins).
    fn update_vote_counts(&self, comment_id: CommentId, counts: VoteCounts) -> GatewayResult<()>;
}

/// Moderation query surface over every article's comments.
pub trait ModerationRepository {
    /// Lists all comments joined with article title, newest first.
    fn list_for_moderation(&self) -> GatewayResult<Vec<ModerationItem>>;
    /// Loads one comment with its article title.
    fn get_item(&self, comment_id: CommentId) -> GatewayResult<Option<ModerationItem>>;
    /// Counts the replies a delete of `comment_id` would cascade to.
    fn count_replies(&self, comment_id: CommentId) -> GatewayResult<usize>;
    /// Writes a new status for one comment.
    fn set_status(&self, comment_id: CommentId, status: ModerationStatus) -> GatewayResult<()>;
    /// Hard-deletes one comment, cascading to replies of a top-level one.
    fn delete_comment(&self, comment_id: CommentId) -> GatewayResult<DeletedComment>;
}

/// SQLite-backed comment gateway and moderation repository.
pub struct SqliteCommentGateway<'conn> {
    conn: &'conn Connection,
    initial_status: ModerationStatus,
}

impl<'conn> SqliteCommentGateway<'conn> {
    /// Creates a gateway over a migrated connection.
    ///
    /// `initial_status` is applied to every comment this gateway persists.
    pub fn try_new(
        conn: &'conn Connection,
        initial_status: ModerationStatus,
    ) -> GatewayResult<Self> {
        ensure_schema_ready(conn, &["articles", "comments"])?;
        Ok(Self {
            conn,
            initial_status,
        })
    }

    /// Upserts an article reference so comments can attach to it.
    pub fn register_article(&self, article: &ArticleRef) -> GatewayResult<()> {
        self.conn.execute(
            "INSERT INTO articles (uuid, title) VALUES (?1, ?2)
             ON CONFLICT(uuid) DO UPDATE SET title = excluded.title;",
            params![article.id.to_string(), article.title.as_str()],
        )?;
        Ok(())
    }

    /// Loads one comment by id.
    pub fn get_comment(&self, comment_id: CommentId) -> GatewayResult<Option<Comment>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{COMMENT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([comment_id])?;
        if let Some(row) = rows.next()? {
            let parsed = parse_comment_row(row)?;
            return Ok(Some(match parsed.parent_id {
                None => Comment::TopLevel(TopLevelComment::new(parsed.body)),
                Some(parent_id) => Comment::Reply(Reply {
                    body: parsed.body,
                    parent_id,
                }),
            }));
        }
        Ok(None)
    }
}

impl CommentGateway for SqliteCommentGateway<'_> {
    fn fetch_thread(
        &self,
        article_id: ArticleId,
        visibility: Visibility,
    ) -> GatewayResult<Vec<TopLevelComment>> {
        let mut stmt = self.conn.prepare(&format!(
            "{COMMENT_SELECT_SQL}
             WHERE article_uuid = ?1
             ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([article_id.to_string()])?;

        let mut top_level = Vec::new();
        let mut replies = Vec::new();
        let mut hidden = 0usize;
        while let Some(row) = rows.next()? {
            let parsed = parse_comment_row(row)?;
            if !visibility.shows(parsed.body.status) {
                hidden += 1;
                continue;
            }
            match parsed.parent_id {
                None => top_level.push(TopLevelComment::new(parsed.body)),
                Some(parent_id) => replies.push(Reply {
                    body: parsed.body,
                    parent_id,
                }),
            }
        }

        let index: HashMap<CommentId, usize> = top_level
            .iter()
            .enumerate()
            .map(|(position, comment)| (comment.body.id, position))
            .collect();
        for reply in replies {
            match index.get(&reply.parent_id) {
                Some(&position) => top_level[position].replies.push(reply),
                // Parent exists but is not visible; the reply goes with it.
                None if visibility == Visibility::Public => hidden += 1,
                None => warn!(
                    "event=comments_fetch module=gateway status=skip reason=orphan_reply comment_id={} parent_id={}",
                    reply.body.id, reply.parent_id
                ),
            }
        }

        info!(
            "event=comments_fetch module=gateway status=ok article_id={} visibility={:?} top_level={} hidden={}",
            article_id,
            visibility,
            top_level.len(),
            hidden
        );
        Ok(top_level)
    }

    fn post_comment(&self, record: &NewCommentRecord) -> GatewayResult<Comment> {
        let valid = validate_submission(
            &record.author_name,
            &record.content,
            record.author_email.as_deref(),
        )?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_article_exists(&tx, record.article_id)?;
        if let Some(parent_id) = record.parent_id {
            ensure_top_level_parent(&tx, record.article_id, parent_id)?;
        }

        tx.execute(
            "INSERT INTO comments (
                article_uuid,
                parent_id,
                author_name,
                author_email,
                user_id,
                content,
                status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                record.article_id.to_string(),
                record.parent_id,
                valid.author_name,
                valid.author_email,
                record.user_id.as_deref(),
                valid.content,
                self.initial_status.as_str(),
            ],
        )?;
        let comment_id = tx.last_insert_rowid();
        tx.commit()?;

        info!(
            "event=comment_post module=gateway status=ok comment_id={} article_id={} is_reply={} initial_status={}",
            comment_id,
            record.article_id,
            record.parent_id.is_some(),
            self.initial_status
        );

        self.get_comment(comment_id)?
            .ok_or_else(|| {
                GatewayError::InvalidData(format!("comment {comment_id} missing after insert"))
            })
    }

    fn update_vote_counts(&self, comment_id: CommentId, counts: VoteCounts) -> GatewayResult<()> {
        let changed = self.conn.execute(
            "UPDATE comments
             SET like_count = ?2,
                 dislike_count = ?3
             WHERE id = ?1;",
            params![comment_id, counts.like_count, counts.dislike_count],
        )?;
        if changed == 0 {
            return Err(GatewayError::NotFound(comment_id));
        }
        Ok(())
    }
}

impl ModerationRepository for SqliteCommentGateway<'_> {
    fn list_for_moderation(&self) -> GatewayResult<Vec<ModerationItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MODERATION_SELECT_SQL}
             ORDER BY c.created_at DESC, c.id DESC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_moderation_row(row)?);
        }
        Ok(items)
    }

    fn get_item(&self, comment_id: CommentId) -> GatewayResult<Option<ModerationItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MODERATION_SELECT_SQL} WHERE c.id = ?1;"))?;
        let mut rows = stmt.query([comment_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_moderation_row(row)?));
        }
        Ok(None)
    }

    fn count_replies(&self, comment_id: CommentId) -> GatewayResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE parent_id = ?1;",
            [comment_id],
            |row| row.get(0),
        )?;
        usize::try_from(count)
            .map_err(|_| GatewayError::InvalidData(format!("invalid reply count `{count}`")))
    }

    fn set_status(&self, comment_id: CommentId, status: ModerationStatus) -> GatewayResult<()> {
        let changed = self.conn.execute(
            "UPDATE comments SET status = ?2 WHERE id = ?1;",
            params![comment_id, status.as_str()],
        )?;
        if changed == 0 {
            return Err(GatewayError::NotFound(comment_id));
        }
        Ok(())
    }

    fn delete_comment(&self, comment_id: CommentId) -> GatewayResult<DeletedComment> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let article_text: Option<String> = tx
            .query_row(
                "SELECT article_uuid FROM comments WHERE id = ?1;",
                [comment_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(article_text) = article_text else {
            return Err(GatewayError::NotFound(comment_id));
        };
        let article_id = parse_uuid(&article_text)?;

        let removed_replies = {
            let mut stmt =
                tx.prepare("SELECT id FROM comments WHERE parent_id = ?1 ORDER BY id ASC;")?;
            let ids = stmt
                .query_map([comment_id], |row| row.get::<_, CommentId>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        // Replies go through the `parent_id` ON DELETE CASCADE.
        tx.execute("DELETE FROM comments WHERE id = ?1;", [comment_id])?;
        tx.commit()?;

        Ok(DeletedComment {
            comment_id,
            article_id,
            removed_replies,
        })
    }
}

struct ParsedComment {
    body: CommentBody,
    parent_id: Option<CommentId>,
}

fn parse_comment_row(row: &Row<'_>) -> GatewayResult<ParsedComment> {
    let article_text: String = row.get("article_uuid")?;
    let status_text: String = row.get("status")?;

    let body = CommentBody {
        id: row.get("id")?,
        article_id: parse_uuid(&article_text)?,
        author_name: row.get("author_name")?,
        author_email: row.get("author_email")?,
        content: row.get("content")?,
        created_at: row.get("created_at")?,
        status: parse_status(&status_text)?,
        votes: VoteCounts {
            like_count: parse_counter(row, "like_count")?,
            dislike_count: parse_counter(row, "dislike_count")?,
        },
    };

    Ok(ParsedComment {
        body,
        parent_id: row.get("parent_id")?,
    })
}

fn parse_moderation_row(row: &Row<'_>) -> GatewayResult<ModerationItem> {
    let parsed = parse_comment_row(row)?;
    Ok(ModerationItem {
        comment: parsed.body,
        parent_id: parsed.parent_id,
        article_title: row.get("article_title")?,
    })
}

fn parse_counter(row: &Row<'_>, column: &'static str) -> GatewayResult<u32> {
    let value: i64 = row.get(column)?;
    u32::try_from(value).map_err(|_| {
        GatewayError::InvalidData(format!("invalid counter `{value}` in comments.{column}"))
    })
}

fn parse_status(value: &str) -> GatewayResult<ModerationStatus> {
    value.parse().map_err(|_| {
        GatewayError::InvalidData(format!("invalid status `{value}` in comments.status"))
    })
}

fn parse_uuid(value: &str) -> GatewayResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| {
        GatewayError::InvalidData(format!("invalid uuid `{value}` in comments.article_uuid"))
    })
}

fn ensure_article_exists(conn: &Connection, article_id: ArticleId) -> GatewayResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM articles WHERE uuid = ?1);",
        [article_id.to_string()],
        |row| row.get(0),
    )?;
    if exists == 1 {
        Ok(())
    } else {
        Err(GatewayError::ArticleNotFound(article_id))
    }
}

fn ensure_top_level_parent(
    conn: &Connection,
    article_id: ArticleId,
    parent_id: CommentId,
) -> GatewayResult<()> {
    let parent: Option<(String, Option<CommentId>)> = conn
        .query_row(
            "SELECT article_uuid, parent_id FROM comments WHERE id = ?1;",
            [parent_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match parent {
        Some((article_text, None)) if article_text == article_id.to_string() => Ok(()),
        _ => Err(GatewayError::ParentNotFound(parent_id)),
    }
}
