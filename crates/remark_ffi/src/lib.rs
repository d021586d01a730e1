//! Flutter-facing bridge over the comment & moderation core.

pub mod api;
