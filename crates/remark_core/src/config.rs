//! Site-setting inputs consumed by the comment core.
//!
//! The settings subsystem owns these flags; core only reads them. Stores and
//! gateway posts receive the derived initial status explicitly instead of
//! looking the flags up themselves.

use crate::model::comment::ModerationStatus;
use serde::{Deserialize, Serialize};

/// Comment-related site flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentSettings {
    /// Whether the comment panel is shown at all.
    pub enable_comments: bool,
    /// Whether new comments wait for a moderator before becoming visible.
    pub moderate_comments: bool,
}

impl Default for CommentSettings {
    fn default() -> Self {
        Self {
            enable_comments: true,
            moderate_comments: true,
        }
    }
}

impl CommentSettings {
    /// Status assigned to newly created comments.
    pub fn initial_status(&self) -> ModerationStatus {
        if self.moderate_comments {
            ModerationStatus::Pending
        } else {
            ModerationStatus::Approved
        }
    }

    /// Returns whether newly created comments are publicly visible.
    pub fn publishes_immediately(&self) -> bool {
        self.initial_status() == ModerationStatus::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::CommentSettings;
    use crate::model::comment::ModerationStatus;

    #[test]
    fn moderated_sites_start_comments_pending() {
        assert_eq!(
            CommentSettings::default().initial_status(),
            ModerationStatus::Pending
        );
        let open = CommentSettings {
            moderate_comments: false,
            ..CommentSettings::default()
        };
        assert_eq!(open.initial_status(), ModerationStatus::Approved);
        assert!(open.publishes_immediately());
    }
}
