//! Top-level comment ordering.
//!
//! # Invariants
//! - Sorting never mutates its input.
//! - Reply order inside a parent is insertion order and is never re-sorted.
//! - `Popular` uses a stable sort: comments with equal like counts keep
//!   their relative input order.

use crate::model::comment::TopLevelComment;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Ordering mode for the top-level collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Descending id (creation order proxy).
    #[default]
    Newest,
    /// Ascending id.
    Oldest,
    /// Descending like count.
    Popular,
}

impl SortMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::Oldest => "oldest",
            Self::Popular => "popular",
        }
    }
}

impl Display for SortMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "popular" => Ok(Self::Popular),
            other => Err(format!(
                "unsupported sort mode `{other}`; expected newest|oldest|popular"
            )),
        }
    }
}

/// Returns a newly ordered copy of `comments` for `mode`.
pub fn sort_comments(comments: &[TopLevelComment], mode: SortMode) -> Vec<TopLevelComment> {
    let mut sorted = comments.to_vec();
    match mode {
        SortMode::Newest => sorted.sort_by_key(|comment| Reverse(comment.body.id)),
        SortMode::Oldest => sorted.sort_by_key(|comment| comment.body.id),
        SortMode::Popular => sorted.sort_by_key(|comment| Reverse(comment.body.votes.like_count)),
    }
    sorted
}

#[cfg(test)]
mod tests {
    use super::{sort_comments, SortMode};
    use crate::model::comment::{
        CommentBody, ModerationStatus, Reply, TopLevelComment, VoteCounts,
    };
    use uuid::Uuid;

    fn body(id: i64, likes: u32) -> CommentBody {
        CommentBody {
            id,
            article_id: Uuid::nil(),
            author_name: format!("author-{id}"),
            author_email: None,
            content: format!("content-{id}"),
            created_at: id * 1_000,
            status: ModerationStatus::Approved,
            votes: VoteCounts {
                like_count: likes,
                dislike_count: 0,
            },
        }
    }

    fn comment(id: i64, likes: u32) -> TopLevelComment {
        TopLevelComment::new(body(id, likes))
    }

    fn ids(comments: &[TopLevelComment]) -> Vec<i64> {
        comments.iter().map(|comment| comment.body.id).collect()
    }

    #[test]
    fn popular_orders_by_likes_descending() {
        let thread = vec![comment(1, 5), comment(2, 8)];
        assert_eq!(ids(&sort_comments(&thread, SortMode::Popular)), vec![2, 1]);
        assert_eq!(ids(&sort_comments(&thread, SortMode::Oldest)), vec![1, 2]);
    }

    #[test]
    fn popular_keeps_input_order_among_ties() {
        let thread = vec![comment(3, 2), comment(1, 4), comment(2, 2)];
        assert_eq!(
            ids(&sort_comments(&thread, SortMode::Popular)),
            vec![1, 3, 2]
        );
    }

    #[test]
    fn newest_then_oldest_restores_ascending_ids() {
        let thread = vec![comment(2, 0), comment(5, 1), comment(1, 9), comment(4, 3)];
        let newest = sort_comments(&thread, SortMode::Newest);
        assert_eq!(ids(&newest), vec![5, 4, 2, 1]);
        assert_eq!(ids(&sort_comments(&newest, SortMode::Oldest)), vec![1, 2, 4, 5]);
    }

    #[test]
    fn sorting_leaves_input_and_reply_order_untouched() {
        let mut parent = comment(1, 0);
        for (id, likes) in [(10, 0), (11, 7), (12, 3)] {
            parent.replies.push(Reply {
                body: body(id, likes),
                parent_id: 1,
            });
        }
        let thread = vec![parent, comment(2, 1)];

        let sorted = sort_comments(&thread, SortMode::Popular);

        assert_eq!(ids(&thread), vec![1, 2]);
        let reply_ids: Vec<i64> = sorted[1].replies.iter().map(|reply| reply.body.id).collect();
        assert_eq!(reply_ids, vec![10, 11, 12]);
    }

    #[test]
    fn sort_mode_parses_case_insensitively() {
        assert_eq!(" Popular ".parse::<SortMode>(), Ok(SortMode::Popular));
        assert!("hot".parse::<SortMode>().is_err());
    }
}
