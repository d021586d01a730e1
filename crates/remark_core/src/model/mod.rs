//! Comment domain model.
//!
//! # Responsibility
//! - Define canonical comment/reply shapes used by every core layer.
//! - Keep thread depth limits expressed in types, not conventions.
//!
//! # Invariants
//! - Every comment is identified by a monotonic `CommentId`.
//! - Replies never hold replies.

pub mod comment;
