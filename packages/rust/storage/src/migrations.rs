//! SQL migration definitions for the StudyCards database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: cards, decks, deck_cards, users",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS cards (
    id            TEXT PRIMARY KEY,
    front         TEXT NOT NULL,
    back          TEXT NOT NULL,
    tags_json     TEXT NOT NULL DEFAULT '[]',
    difficulty    TEXT NOT NULL DEFAULT 'MEDIUM',
    review_count  INTEGER NOT NULL DEFAULT 0,
    last_reviewed TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS decks (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    tags_json   TEXT NOT NULL DEFAULT '[]',
    is_public   INTEGER NOT NULL DEFAULT 0,
    author_id   TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_decks_author ON decks(author_id);

-- Ordered deck membership
CREATE TABLE IF NOT EXISTS deck_cards (
    deck_id  TEXT NOT NULL,
    card_id  TEXT NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (deck_id, card_id)
);

CREATE INDEX IF NOT EXISTS idx_deck_cards_card ON deck_cards(card_id);

CREATE TABLE IF NOT EXISTS users (
    id               TEXT PRIMARY KEY,
    email            TEXT NOT NULL UNIQUE,
    username         TEXT NOT NULL,
    password_hash    TEXT NOT NULL,
    password_salt    TEXT NOT NULL,
    preferences_json TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Login sessions",
            sql: r#"
CREATE TABLE IF NOT EXISTS sessions (
    token      TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
