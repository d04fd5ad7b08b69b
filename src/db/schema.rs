//! SQL DDL for initializing the database schema.
//! SQLite-first design; can be adapted for other RDBMS.

/// SQLite schema with:
/// - `shops`: one row per connected marketplace account (`ml_user_id` UNIQUE)
/// - `ml_tokens`: OAuth credentials, at most one row per account, removed with its shop
/// - `answers`: one row per answered question (`question_id` UNIQUE)
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS shops (
    id INTEGER PRIMARY KEY NOT NULL,
    ml_user_id INTEGER NOT NULL UNIQUE,
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL -- RFC3339
);

CREATE TABLE IF NOT EXISTS ml_tokens (
    id INTEGER PRIMARY KEY NOT NULL,
    shop_id INTEGER NOT NULL REFERENCES shops(id) ON DELETE CASCADE,
    ml_user_id INTEGER NOT NULL UNIQUE,
    access_token TEXT NOT NULL,
    refresh_token TEXT NULL,
    expires_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL -- RFC3339
);

CREATE TABLE IF NOT EXISTS answers (
    id INTEGER PRIMARY KEY NOT NULL,
    question_id INTEGER NOT NULL UNIQUE,
    ml_user_id INTEGER NOT NULL,
    final_text TEXT NOT NULL,
    mode TEXT NOT NULL CHECK (mode IN ('auto', 'manual')),
    answered_at TEXT NOT NULL -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_answers_ml_user_id ON answers(ml_user_id);
"#;
