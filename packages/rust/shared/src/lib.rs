//! Shared types, error model, and configuration for StudyCards.
//!
//! This crate is the foundation depended on by all other StudyCards crates.
//! It provides:
//! - [`StudyCardsError`] — the unified error type
//! - Domain types ([`Card`], [`Deck`], [`User`]) and their request DTOs
//! - Configuration ([`AppConfig`], config loading)
//! - Input validators and small text helpers

pub mod config;
pub mod error;
pub mod helpers;
pub mod types;
pub mod validators;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CorsConfig, OpenAiConfig, RateLimitConfig, ServerConfig, StorageConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{Result, StudyCardsError};
pub use types::{
    Card, CardCreate, CardUpdate, Deck, DeckCreate, DeckStats, DeckUpdate, Difficulty, Language,
    LoginRequest, NotificationSettings, PreferencesUpdate, Theme, User, UserCreate,
    UserPreferences, UserProgress, UserUpdate, new_id, new_token,
};
