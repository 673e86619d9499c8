//! SQL migration definitions for the Seoforge database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: runs, scored_queries, signal_cache, analysis_cache",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Pipeline run metadata
CREATE TABLE IF NOT EXISTS runs (
    id            TEXT PRIMARY KEY,
    topic         TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    completed_at  TEXT,
    manifest_json TEXT
);

-- Scored queries per run, in rank order
CREATE TABLE IF NOT EXISTS scored_queries (
    id          TEXT PRIMARY KEY,
    run_id      TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    rank        INTEGER NOT NULL,
    query_text  TEXT NOT NULL,
    lang        TEXT NOT NULL,
    coverage    REAL NOT NULL,
    relevance   REAL NOT NULL,
    density     REAL NOT NULL,
    final_score REAL NOT NULL,
    UNIQUE(run_id, rank)
);

CREATE INDEX IF NOT EXISTS idx_scored_queries_run ON scored_queries(run_id);

-- Raw search-provider responses keyed by query hash
CREATE TABLE IF NOT EXISTS signal_cache (
    id          TEXT PRIMARY KEY,
    query_hash  TEXT NOT NULL,
    signal_kind TEXT NOT NULL,
    provider    TEXT NOT NULL,
    result_json TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE(query_hash, signal_kind, provider)
);

-- LLM bridge responses keyed by task and prompt hash
CREATE TABLE IF NOT EXISTS analysis_cache (
    id          TEXT PRIMARY KEY,
    task_type   TEXT NOT NULL,
    prompt_hash TEXT NOT NULL,
    model_id    TEXT NOT NULL,
    result_json TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE(task_type, prompt_hash, model_id)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
