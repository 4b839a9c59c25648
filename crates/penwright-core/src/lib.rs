//! # penwright-core
//!
//! Deterministic building blocks for Penwright.
//!
//! This crate holds everything that does not need an async runtime:
//! - The shared data model handed to content assembly
//!   ([`GenerationResult`], [`ArticlePayload`], [`SubtaskResults`])
//! - The [`ResponseHealer`], which recovers a structured payload from a
//!   model's free-text answer
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same raw text always heals the same way
//! 2. **No guessing**: an unrecoverable response yields `ok: false`,
//!    never a partial payload
//! 3. **Complete subtask maps**: every requested subtask has an entry,
//!    `None` meaning "ran but produced nothing"
//!
//! ## Example
//!
//! ```rust
//! use penwright_core::{HealStrategy, ResponseHealer};
//!
//! let healer = ResponseHealer::default();
//! let result = healer.heal("Here you go:\n{\"title\": \"T\", \"content\": \"C\"}");
//!
//! assert!(result.ok);
//! assert_eq!(result.strategy_used, Some(HealStrategy::BraceSpan));
//! ```

pub mod healer;
pub mod types;

// Re-export main types at crate root
pub use healer::{HealResult, HealStrategy, ResponseHealer, DEFAULT_REQUIRED_FIELD};
pub use types::{
    ArticlePayload, Discovered, GenerationMethod, GenerationResult, Reference, SubtaskResults,
    VideoRef, REFERENCES_SUBTASK, VIDEO_SUBTASK,
};
