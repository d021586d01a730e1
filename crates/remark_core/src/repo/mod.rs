//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the comment gateway and moderation query contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes validate submissions before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `ParentNotFound`)
//!   in addition to DB transport errors.

pub mod comment_repo;
pub mod identity_repo;
