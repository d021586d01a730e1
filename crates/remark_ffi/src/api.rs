//! FFI use-case API for the comment panel and moderation table.
//!
//! # Responsibility
//! - Expose stable, use-case-level functions to Dart via FRB.
//! - Translate core errors into envelope messages the UI can show as-is.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Every DB-backed call opens its own connection; no connection is
//!   cached between calls.
//! - Vote state lives in one session ledger for the process lifetime.

use log::warn;
use once_cell::sync::Lazy;
use remark_core::db::open_db;
use remark_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    ArticleId, ArticleRef, Comment, CommentBody, CommentGateway, CommentSettings, IdentityStore,
    ModerationItem, ModerationStatus, ModerationWorkflow, NewCommentRecord, SortMode,
    SqliteCommentGateway, SqliteIdentityStore, StatusFilter, TopLevelComment, ViewerIdentity,
    VoteChange, VoteKey, VoteLedger,
};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

const DB_FILE_NAME: &str = "remark.sqlite3";
const DB_PATH_ENV: &str = "REMARK_DB_PATH";
static DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static SETTINGS: Lazy<Mutex<CommentSettings>> =
    Lazy::new(|| Mutex::new(CommentSettings::default()));
static SESSION_VOTES: Lazy<Mutex<VoteLedger>> = Lazy::new(|| Mutex::new(VoteLedger::new()));

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir`.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Pins the SQLite file used by every DB-backed call.
///
/// Must run before the first DB-backed call; afterwards only the same path
/// is accepted. Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn configure_db_path(path: String) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return "db path cannot be empty".to_string();
    }
    let requested = PathBuf::from(trimmed);
    let active = DB_PATH.get_or_init(|| requested.clone());
    if *active == requested {
        String::new()
    } else {
        format!(
            "db path already set to `{}`; refusing to switch",
            active.display()
        )
    }
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// Affected comment ID, when there is one.
    pub comment_id: Option<i64>,
    /// Article the UI must refetch, when there is one.
    pub article_id: Option<String>,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            comment_id: None,
            article_id: None,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            comment_id: None,
            article_id: None,
            message: message.into(),
        }
    }

    fn with_comment(mut self, comment_id: i64, article_id: ArticleId) -> Self {
        self.comment_id = Some(comment_id);
        self.article_id = Some(article_id.to_string());
        self
    }
}

/// Replaces the site comment settings used by later posts.
#[flutter_rust_bridge::frb(sync)]
pub fn configure_comments(enable_comments: bool, moderate_comments: bool) -> ActionResponse {
    let settings = CommentSettings {
        enable_comments,
        moderate_comments,
    };
    match SETTINGS.lock() {
        Ok(mut guard) => {
            *guard = settings;
            ActionResponse::success("Comment settings updated.")
        }
        Err(_) => ActionResponse::failure("configure_comments failed: settings lock poisoned"),
    }
}

/// Registers (or renames) the article comments attach to.
#[flutter_rust_bridge::frb(sync)]
pub fn article_register(article_id: String, title: String) -> ActionResponse {
    let result = parse_article_id(&article_id).and_then(|id| {
        with_gateway(|gateway| {
            gateway
                .register_article(&ArticleRef {
                    id,
                    title: title.trim().to_string(),
                })
                .map_err(|err| err.to_string())
        })
    });
    match result {
        Ok(()) => ActionResponse::success("Article registered."),
        Err(err) => ActionResponse::failure(format!("article_register failed: {err}")),
    }
}

/// One comment as rendered by the comment panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentView {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub author_name: String,
    pub content: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// `pending|approved|rejected`.
    pub status: String,
    pub like_count: u32,
    pub dislike_count: u32,
    /// Session viewer has liked this comment.
    pub liked: bool,
    /// Session viewer has disliked this comment.
    pub disliked: bool,
}

/// A top-level comment with its replies in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentThreadView {
    pub comment: CommentView,
    pub replies: Vec<CommentView>,
}

/// Fetch response envelope for one article thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentsResponse {
    pub ok: bool,
    pub threads: Vec<CommentThreadView>,
    /// Effective applied sort mode.
    pub sort: String,
    pub message: String,
}

/// Loads one article's public comment tree ordered by `sort`
/// (`newest|oldest|popular`, default `newest`).
///
/// Only approved comments are returned; a reply is shown only under an
/// approved parent.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics; a failed fetch returns `ok=false` and no threads, and the
///   UI retries by calling again.
#[flutter_rust_bridge::frb(sync)]
pub fn comments_fetch(article_id: String, sort: Option<String>) -> CommentsResponse {
    let mode = match sort.as_deref().map(str::parse::<SortMode>) {
        None => SortMode::default(),
        Some(Ok(mode)) => mode,
        Some(Err(err)) => return CommentsResponse::failure(SortMode::default(), err),
    };

    let tree = parse_article_id(&article_id).and_then(|id| {
        with_gateway(|gateway| gateway.fetch_comments(id).map_err(|err| err.to_string()))
    });
    let tree = match tree {
        Ok(tree) => tree,
        Err(err) => return CommentsResponse::failure(mode, err),
    };

    let ledger = match SESSION_VOTES.lock() {
        Ok(ledger) => ledger,
        Err(_) => return CommentsResponse::failure(mode, "vote ledger lock poisoned"),
    };
    let threads = remark_core::sort_comments(&tree, mode)
        .iter()
        .map(|top| to_thread_view(top, &ledger))
        .collect::<Vec<_>>();
    let message = if threads.is_empty() {
        "No comments yet.".to_string()
    } else {
        format!("Loaded {} thread(s).", threads.len())
    };
    CommentsResponse {
        ok: true,
        threads,
        sort: mode.to_string(),
        message,
    }
}

impl CommentsResponse {
    fn failure(mode: SortMode, err: impl std::fmt::Display) -> Self {
        Self {
            ok: false,
            threads: Vec::new(),
            sort: mode.to_string(),
            message: format!("comments_fetch failed: {err}"),
        }
    }
}

/// Posts a comment, or a reply when `parent_id` is set.
///
/// New comments start `pending` while moderation is on. The submitted name
/// and email are remembered for the next form on success.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
/// - Returns the created comment ID on success.
#[flutter_rust_bridge::frb(sync)]
pub fn comment_post(
    article_id: String,
    author_name: String,
    content: String,
    author_email: Option<String>,
    parent_id: Option<i64>,
) -> ActionResponse {
    let settings = match current_settings() {
        Ok(settings) => settings,
        Err(err) => return ActionResponse::failure(format!("comment_post failed: {err}")),
    };
    if !settings.enable_comments {
        return ActionResponse::failure("comment_post failed: comments are disabled");
    }
    let article_id = match parse_article_id(&article_id) {
        Ok(id) => id,
        Err(err) => return ActionResponse::failure(format!("comment_post failed: {err}")),
    };
    let record = NewCommentRecord {
        article_id,
        author_name,
        author_email,
        content,
        user_id: None,
        parent_id,
    };

    let result = with_connection(|conn| {
        let gateway = SqliteCommentGateway::try_new(conn, settings.initial_status())
            .map_err(|err| format!("comment gateway init failed: {err}"))?;
        let created = gateway.post_comment(&record).map_err(|err| err.to_string())?;
        remember_identity(conn, created.body());
        Ok(created)
    });

    match result {
        Ok(created) => {
            let message = match (&created, settings.publishes_immediately()) {
                (Comment::Reply(_), true) => "Reply posted.",
                (Comment::Reply(_), false) => "Reply submitted for review.",
                (Comment::TopLevel(_), true) => "Comment posted.",
                (Comment::TopLevel(_), false) => "Comment submitted for review.",
            };
            ActionResponse::success(message).with_comment(created.id(), article_id)
        }
        Err(err) => ActionResponse::failure(format!("comment_post failed: {err}")),
    }
}

/// Remembered viewer identity for pre-filling the comment form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityResponse {
    pub ok: bool,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub message: String,
}

/// Returns the last successfully submitted name and email, if any.
#[flutter_rust_bridge::frb(sync)]
pub fn viewer_identity() -> IdentityResponse {
    let loaded = with_connection(|conn| {
        SqliteIdentityStore::try_new(conn)
            .and_then(|store| store.load())
            .map_err(|err| err.to_string())
    });
    match loaded {
        Ok(identity) => IdentityResponse {
            ok: true,
            message: if identity.is_some() {
                "Identity loaded.".to_string()
            } else {
                "No remembered identity.".to_string()
            },
            author_name: identity.as_ref().map(|value| value.name.clone()),
            author_email: identity.and_then(|value| value.email),
        },
        Err(err) => IdentityResponse {
            ok: false,
            author_name: None,
            author_email: None,
            message: format!("viewer_identity failed: {err}"),
        },
    }
}

/// Vote response envelope carrying the counters after the toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteResponse {
    pub ok: bool,
    pub like_count: u32,
    pub dislike_count: u32,
    pub liked: bool,
    pub disliked: bool,
    pub message: String,
}

/// Likes (`like=true`) or dislikes a comment or reply for this session.
///
/// Repeating the same vote is a no-op; the opposite vote switches it.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
/// - `is_reply` must match the stored comment kind.
#[flutter_rust_bridge::frb(sync)]
pub fn comment_vote(comment_id: i64, is_reply: bool, like: bool) -> VoteResponse {
    let key = if is_reply {
        VoteKey::Reply(comment_id)
    } else {
        VoteKey::Comment(comment_id)
    };
    let mut ledger = match SESSION_VOTES.lock() {
        Ok(ledger) => ledger,
        Err(_) => return VoteResponse::failure("vote ledger lock poisoned"),
    };

    let result = with_gateway(|gateway| {
        let comment = gateway
            .get_comment(comment_id)
            .map_err(|err| err.to_string())?
            .filter(|comment| comment.vote_key() == key)
            .ok_or_else(|| format!("comment `{key}` not found"))?;
        let mut counts = comment.body().votes;
        let mut staged = ledger.clone();
        let change = if like {
            staged.toggle_like(key, &mut counts)
        } else {
            staged.toggle_dislike(key, &mut counts)
        };
        if change != VoteChange::Unchanged {
            gateway
                .update_vote_counts(comment_id, counts)
                .map_err(|err| err.to_string())?;
        }
        *ledger = staged;
        Ok((change, counts))
    });

    match result {
        Ok((change, counts)) => VoteResponse {
            ok: true,
            like_count: counts.like_count,
            dislike_count: counts.dislike_count,
            liked: ledger.is_liked(key),
            disliked: ledger.is_disliked(key),
            message: match change {
                VoteChange::Applied => "Vote recorded.",
                VoteChange::Switched => "Vote switched.",
                VoteChange::Unchanged => "Vote already recorded.",
            }
            .to_string(),
        },
        Err(err) => VoteResponse::failure(err),
    }
}

impl VoteResponse {
    fn failure(err: impl std::fmt::Display) -> Self {
        Self {
            ok: false,
            like_count: 0,
            dislike_count: 0,
            liked: false,
            disliked: false,
            message: format!("comment_vote failed: {err}"),
        }
    }
}

/// One row of the moderation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationRow {
    pub comment_id: i64,
    pub parent_id: Option<i64>,
    pub article_id: String,
    pub article_title: String,
    pub author_name: String,
    pub author_email: Option<String>,
    pub content: String,
    pub status: String,
    pub created_at: i64,
}

/// Moderation table response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationListResponse {
    pub ok: bool,
    pub rows: Vec<ModerationRow>,
    /// Rows before search/status filtering.
    pub total: u32,
    pub message: String,
}

/// Lists comments across all articles, newest first, filtered by a
/// case-insensitive `search` over content/name/email and by `status`
/// (`all|pending|approved|rejected`, default `all`).
#[flutter_rust_bridge::frb(sync)]
pub fn moderation_list(search: String, status: Option<String>) -> ModerationListResponse {
    let filter = match status.as_deref().map(str::parse::<StatusFilter>) {
        None => StatusFilter::All,
        Some(Ok(filter)) => filter,
        Some(Err(err)) => return ModerationListResponse::failure(err),
    };

    let result = with_workflow(|workflow| {
        workflow.refresh().map_err(|err| err.to_string())?;
        let rows = workflow
            .filter(&search, filter)
            .into_iter()
            .map(to_moderation_row)
            .collect::<Vec<_>>();
        Ok((rows, workflow.items().len()))
    });

    match result {
        Ok((rows, total)) => ModerationListResponse {
            message: format!("Showing {} of {} comment(s).", rows.len(), total),
            rows,
            total: u32::try_from(total).unwrap_or(u32::MAX),
            ok: true,
        },
        Err(err) => ModerationListResponse::failure(err),
    }
}

impl ModerationListResponse {
    fn failure(err: impl std::fmt::Display) -> Self {
        Self {
            ok: false,
            rows: Vec::new(),
            total: 0,
            message: format!("moderation_list failed: {err}"),
        }
    }
}

/// Moves a comment to `approved` or `rejected`.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
/// - `pending` is never accepted as a target.
#[flutter_rust_bridge::frb(sync)]
pub fn moderation_set_status(comment_id: i64, status: String) -> ActionResponse {
    let target = match status.parse::<ModerationStatus>() {
        Ok(target) => target,
        Err(err) => return ActionResponse::failure(format!("moderation_set_status failed: {err}")),
    };

    match with_workflow(|workflow| {
        workflow
            .transition(comment_id, target)
            .map_err(|err| err.to_string())
    }) {
        Ok(change) => {
            let message = if change.is_noop() {
                format!("Comment already {}.", change.status)
            } else {
                format!("Comment {}.", change.status)
            };
            ActionResponse::success(message).with_comment(change.comment_id, change.article_id)
        }
        Err(err) => ActionResponse::failure(format!("moderation_set_status failed: {err}")),
    }
}

/// Deletes a comment after explicit confirmation.
///
/// With `confirmed=false` nothing is deleted: the response message describes
/// what would be removed so the UI can ask the moderator. With
/// `confirmed=true` the comment and, for a top-level comment, its replies
/// are removed permanently.
#[flutter_rust_bridge::frb(sync)]
pub fn moderation_delete(comment_id: i64, confirmed: bool) -> ActionResponse {
    let result = with_workflow(|workflow| {
        workflow.refresh().map_err(|err| err.to_string())?;
        let confirmation = workflow
            .request_delete(comment_id)
            .map_err(|err| err.to_string())?;
        if !confirmed {
            workflow.cancel_delete();
            return Ok(Err(confirmation));
        }
        workflow
            .confirm_delete(&confirmation)
            .map(Ok)
            .map_err(|err| err.to_string())
    });

    match result {
        Ok(Ok(deleted)) => ActionResponse::success(format!(
            "Comment deleted with {} repl(ies).",
            deleted.removed_replies.len()
        ))
        .with_comment(deleted.comment_id, deleted.article_id),
        Ok(Err(confirmation)) => ActionResponse {
            ok: false,
            comment_id: Some(confirmation.comment_id),
            article_id: None,
            message: format!(
                "Confirm deleting comment {} on \"{}\" and {} repl(ies).",
                confirmation.comment_id, confirmation.article_title, confirmation.reply_count
            ),
        },
        Err(err) => ActionResponse::failure(format!("moderation_delete failed: {err}")),
    }
}

fn resolve_db_path() -> PathBuf {
    DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var(DB_PATH_ENV) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(DB_FILE_NAME)
        })
        .clone()
}

fn current_settings() -> Result<CommentSettings, String> {
    SETTINGS
        .lock()
        .map(|guard| *guard)
        .map_err(|_| "settings lock poisoned".to_string())
}

fn parse_article_id(raw: &str) -> Result<ArticleId, String> {
    raw.trim()
        .parse::<ArticleId>()
        .map_err(|err| format!("invalid article id `{}`: {err}", raw.trim()))
}

fn with_connection<T>(
    f: impl FnOnce(&Connection) -> Result<T, String>,
) -> Result<T, String> {
    let conn = open_db(resolve_db_path()).map_err(|err| format!("DB open failed: {err}"))?;
    f(&conn)
}

fn with_gateway<T>(
    f: impl FnOnce(&SqliteCommentGateway<'_>) -> Result<T, String>,
) -> Result<T, String> {
    let settings = current_settings()?;
    with_connection(|conn| {
        let gateway = SqliteCommentGateway::try_new(conn, settings.initial_status())
            .map_err(|err| format!("comment gateway init failed: {err}"))?;
        f(&gateway)
    })
}

fn with_workflow<T>(
    f: impl FnOnce(&mut ModerationWorkflow<SqliteCommentGateway<'_>>) -> Result<T, String>,
) -> Result<T, String> {
    let settings = current_settings()?;
    with_connection(|conn| {
        let gateway = SqliteCommentGateway::try_new(conn, settings.initial_status())
            .map_err(|err| format!("comment gateway init failed: {err}"))?;
        let mut workflow = ModerationWorkflow::new(gateway);
        f(&mut workflow)
    })
}

fn remember_identity(conn: &Connection, body: &CommentBody) {
    let identity = ViewerIdentity {
        name: body.author_name.clone(),
        email: body.author_email.clone(),
    };
    if let Err(err) = SqliteIdentityStore::try_new(conn).and_then(|store| store.save(&identity)) {
        warn!("event=identity_save module=ffi status=error error={err}");
    }
}

fn to_comment_view(
    body: &CommentBody,
    parent_id: Option<i64>,
    key: VoteKey,
    ledger: &VoteLedger,
) -> CommentView {
    CommentView {
        id: body.id,
        parent_id,
        author_name: body.author_name.clone(),
        content: body.content.clone(),
        created_at: body.created_at,
        status: body.status.to_string(),
        like_count: body.votes.like_count,
        dislike_count: body.votes.dislike_count,
        liked: ledger.is_liked(key),
        disliked: ledger.is_disliked(key),
    }
}

fn to_thread_view(top: &TopLevelComment, ledger: &VoteLedger) -> CommentThreadView {
    CommentThreadView {
        comment: to_comment_view(&top.body, None, VoteKey::Comment(top.id()), ledger),
        replies: top
            .replies
            .iter()
            .map(|reply| {
                to_comment_view(
                    &reply.body,
                    Some(reply.parent_id),
                    VoteKey::Reply(reply.body.id),
                    ledger,
                )
            })
            .collect(),
    }
}

fn to_moderation_row(item: &ModerationItem) -> ModerationRow {
    ModerationRow {
        comment_id: item.comment.id,
        parent_id: item.parent_id,
        article_id: item.comment.article_id.to_string(),
        article_title: item.article_title.clone(),
        author_name: item.comment.author_name.clone(),
        author_email: item.comment.author_email.clone(),
        content: item.comment.content.clone(),
        status: item.comment.status.to_string(),
        created_at: item.comment.created_at,
    }
}
