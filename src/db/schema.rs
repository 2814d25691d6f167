pub const SCHEMA: &str = r#"
-- sessions table (one row per conversation)
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY NOT NULL,
    original_url TEXT NOT NULL,
    original_title TEXT,
    created_at INTEGER NOT NULL,
    last_updated_at INTEGER NOT NULL,
    turns TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_last_updated_at ON sessions(last_updated_at DESC);
"#;
