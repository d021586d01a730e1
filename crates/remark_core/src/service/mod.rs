//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate comment panel and moderation table use-cases.
//! - Keep rendering surfaces decoupled from storage details.

pub mod moderation_service;
pub mod thread_service;
