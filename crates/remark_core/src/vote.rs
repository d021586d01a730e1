//! Per-viewer vote ledger.
//!
//! # Responsibility
//! - Remember, per viewer session, which comments were liked or disliked.
//! - Apply vote presses to comment counters as one state transition.
//!
//! # Invariants
//! - A key maps to at most one `Vote`, so liked and disliked can never both
//!   hold for the same comment.
//! - Pressing the active polarity again is a no-op.
//! - Counters saturate at zero instead of underflowing.
//!
//! The ledger only knows this viewer's votes. Concurrent votes by other
//! viewers reach the backing store independently and the last write wins.

use crate::model::comment::{VoteCounts, VoteKey};
use log::debug;
use std::collections::HashMap;

/// One viewer's vote on one comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Liked,
    Disliked,
}

/// Result of a vote press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteChange {
    /// Neutral -> voted.
    Applied,
    /// Opposite polarity withdrawn and new polarity applied.
    Switched,
    /// Same polarity pressed again.
    Unchanged,
}

/// Session-scoped vote state for a single viewer.
#[derive(Debug, Clone, Default)]
pub struct VoteLedger {
    votes: HashMap<VoteKey, Vote>,
}

impl VoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current vote for `key`, if any.
    pub fn vote_for(&self, key: VoteKey) -> Option<Vote> {
        self.votes.get(&key).copied()
    }

    pub fn is_liked(&self, key: VoteKey) -> bool {
        self.vote_for(key) == Some(Vote::Liked)
    }

    pub fn is_disliked(&self, key: VoteKey) -> bool {
        self.vote_for(key) == Some(Vote::Disliked)
    }

    /// Presses "like" on `key`, updating `counts` in place.
    pub fn toggle_like(&mut self, key: VoteKey, counts: &mut VoteCounts) -> VoteChange {
        self.press(key, Vote::Liked, counts)
    }

    /// Presses "dislike" on `key`, updating `counts` in place.
    pub fn toggle_dislike(&mut self, key: VoteKey, counts: &mut VoteCounts) -> VoteChange {
        self.press(key, Vote::Disliked, counts)
    }

    /// Drops any vote recorded for `key`. Counters are not touched.
    pub fn forget(&mut self, key: VoteKey) -> Option<Vote> {
        self.votes.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    fn press(&mut self, key: VoteKey, vote: Vote, counts: &mut VoteCounts) -> VoteChange {
        let previous = self.vote_for(key);
        if previous == Some(vote) {
            return VoteChange::Unchanged;
        }

        // Both counters are computed before either is written so a switch
        // is observed as a single transition.
        let mut next = *counts;
        if let Some(old) = previous {
            *counter_mut(&mut next, old) = counter(&next, old).saturating_sub(1);
        }
        *counter_mut(&mut next, vote) = counter(&next, vote).saturating_add(1);
        *counts = next;
        self.votes.insert(key, vote);

        let change = if previous.is_some() {
            VoteChange::Switched
        } else {
            VoteChange::Applied
        };
        debug!(
            "event=vote_press module=vote status=ok key={} change={:?} likes={} dislikes={}",
            key, change, counts.like_count, counts.dislike_count
        );
        change
    }
}

fn counter(counts: &VoteCounts, vote: Vote) -> u32 {
    match vote {
        Vote::Liked => counts.like_count,
        Vote::Disliked => counts.dislike_count,
    }
}

fn counter_mut(counts: &mut VoteCounts, vote: Vote) -> &mut u32 {
    match vote {
        Vote::Liked => &mut counts.like_count,
        Vote::Disliked => &mut counts.dislike_count,
    }
}
