//! libSQL storage layer for Seoforge.
//!
//! The [`Storage`] struct wraps a libSQL database holding run metadata, the
//! scored-query table, and two caches that make re-runs cheap: raw search
//! responses (`signal_cache`) and LLM bridge results (`analysis_cache`).
//!
//! **Access rules:**
//! - the pipeline holds the sole read-write handle via [`Storage::open`]
//! - external inspection uses [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use seoforge_shared::{Result, ScoredQuery, SeoforgeError, SignalSet};
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SeoforgeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    SeoforgeError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(SeoforgeError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Run operations
    // -----------------------------------------------------------------------

    /// Insert a new run record.
    pub async fn insert_run(&self, run_id: &str, topic: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, topic, created_at) VALUES (?1, ?2, ?3)",
                params![run_id, topic, now.as_str()],
            )
            .await
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Mark a run complete and store its manifest JSON.
    pub async fn complete_run(&self, run_id: &str, manifest_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET completed_at = ?1, manifest_json = ?2 WHERE id = ?3",
                params![now.as_str(), manifest_json, run_id],
            )
            .await
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a run by ID. Returns `(id, topic, created_at, completed_at)`.
    pub async fn get_run(
        &self,
        run_id: &str,
    ) -> Result<Option<(String, String, String, Option<String>)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, topic, created_at, completed_at FROM runs WHERE id = ?1",
                params![run_id],
            )
            .await
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some((
                row.get::<String>(0)
                    .map_err(|e| SeoforgeError::Storage(e.to_string()))?,
                row.get::<String>(1)
                    .map_err(|e| SeoforgeError::Storage(e.to_string()))?,
                row.get::<String>(2)
                    .map_err(|e| SeoforgeError::Storage(e.to_string()))?,
                row.get::<String>(3).ok(),
            ))),
            Ok(None) => Ok(None),
            Err(e) => Err(SeoforgeError::Storage(e.to_string())),
        }
    }

    /// List all runs, newest first. Returns `Vec<(id, topic, created_at)>`.
    pub async fn list_runs(&self) -> Result<Vec<(String, String, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, topic, created_at FROM runs ORDER BY created_at DESC",
                params![],
            )
            .await
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push((
                row.get::<String>(0)
                    .map_err(|e| SeoforgeError::Storage(e.to_string()))?,
                row.get::<String>(1)
                    .map_err(|e| SeoforgeError::Storage(e.to_string()))?,
                row.get::<String>(2)
                    .map_err(|e| SeoforgeError::Storage(e.to_string()))?,
            ));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Scored query operations
    // -----------------------------------------------------------------------

    /// Replace the scored-query table for a run with a fresh ranking.
    pub async fn replace_scored_queries(
        &self,
        run_id: &str,
        scored: &[ScoredQuery],
    ) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "DELETE FROM scored_queries WHERE run_id = ?1",
                params![run_id],
            )
            .await
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;

        for (i, sq) in scored.iter().enumerate() {
            let id = Uuid::now_v7().to_string();
            let lang = match sq.query.lang {
                seoforge_shared::Lang::ZhTw => "zh_tw",
                seoforge_shared::Lang::En => "en",
            };
            self.conn
                .execute(
                    "INSERT INTO scored_queries
                     (id, run_id, rank, query_text, lang, coverage, relevance, density, final_score)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        id.as_str(),
                        run_id,
                        (i + 1) as i64,
                        sq.query.text.as_str(),
                        lang,
                        sq.signals.coverage,
                        sq.signals.relevance,
                        sq.signals.density,
                        sq.final_score,
                    ],
                )
                .await
                .map_err(|e| SeoforgeError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    /// List scored queries for a run in rank order.
    /// Returns `Vec<(rank, query_text, final_score)>`.
    pub async fn list_scored_queries(&self, run_id: &str) -> Result<Vec<(u32, String, f64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT rank, query_text, final_score FROM scored_queries
                 WHERE run_id = ?1 ORDER BY rank",
                params![run_id],
            )
            .await
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push((
                row.get::<u32>(0)
                    .map_err(|e| SeoforgeError::Storage(e.to_string()))?,
                row.get::<String>(1)
                    .map_err(|e| SeoforgeError::Storage(e.to_string()))?,
                row.get::<f64>(2)
                    .map_err(|e| SeoforgeError::Storage(e.to_string()))?,
            ));
        }
        Ok(results)
    }

    /// List scored queries with their raw signals, in rank order.
    /// Returns `Vec<(query_text, signals)>`; used for re-scoring after
    /// weight changes.
    pub async fn list_scored_signals(&self, run_id: &str) -> Result<Vec<(String, SignalSet)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT query_text, coverage, relevance, density FROM scored_queries
                 WHERE run_id = ?1 ORDER BY rank",
                params![run_id],
            )
            .await
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push((
                row.get::<String>(0)
                    .map_err(|e| SeoforgeError::Storage(e.to_string()))?,
                SignalSet {
                    coverage: row
                        .get::<f64>(1)
                        .map_err(|e| SeoforgeError::Storage(e.to_string()))?,
                    relevance: row
                        .get::<f64>(2)
                        .map_err(|e| SeoforgeError::Storage(e.to_string()))?,
                    density: row
                        .get::<f64>(3)
                        .map_err(|e| SeoforgeError::Storage(e.to_string()))?,
                },
            ));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Signal cache operations
    // -----------------------------------------------------------------------

    /// Get a cached raw search response.
    pub async fn get_signal_cache(
        &self,
        query_hash: &str,
        signal_kind: &str,
        provider: &str,
    ) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT result_json FROM signal_cache
                 WHERE query_hash = ?1 AND signal_kind = ?2 AND provider = ?3",
                params![query_hash, signal_kind, provider],
            )
            .await
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let result: String = row
                    .get(0)
                    .map_err(|e| SeoforgeError::Storage(e.to_string()))?;
                Ok(Some(result))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(SeoforgeError::Storage(e.to_string())),
        }
    }

    /// Store a raw search response in the cache (upserts).
    pub async fn set_signal_cache(
        &self,
        query_hash: &str,
        signal_kind: &str,
        provider: &str,
        result_json: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO signal_cache (id, query_hash, signal_kind, provider, result_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(query_hash, signal_kind, provider) DO UPDATE SET
                   result_json = excluded.result_json,
                   created_at = excluded.created_at",
                params![id.as_str(), query_hash, signal_kind, provider, result_json, now.as_str()],
            )
            .await
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Analysis cache operations
    // -----------------------------------------------------------------------

    /// Get a cached LLM bridge result.
    pub async fn get_analysis_cache(
        &self,
        task_type: &str,
        prompt_hash: &str,
        model_id: &str,
    ) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT result_json FROM analysis_cache
                 WHERE task_type = ?1 AND prompt_hash = ?2 AND model_id = ?3",
                params![task_type, prompt_hash, model_id],
            )
            .await
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let result: String = row
                    .get(0)
                    .map_err(|e| SeoforgeError::Storage(e.to_string()))?;
                Ok(Some(result))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(SeoforgeError::Storage(e.to_string())),
        }
    }

    /// Store an LLM bridge result in the cache (upserts).
    pub async fn set_analysis_cache(
        &self,
        task_type: &str,
        prompt_hash: &str,
        model_id: &str,
        result_json: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO analysis_cache (id, task_type, prompt_hash, model_id, result_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(task_type, prompt_hash, model_id) DO UPDATE SET
                   result_json = excluded.result_json,
                   created_at = excluded.created_at",
                params![id.as_str(), task_type, prompt_hash, model_id, result_json, now.as_str()],
            )
            .await
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Invalidate all cached analysis results for a model.
    pub async fn invalidate_analysis_cache(&self, model_id: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "DELETE FROM analysis_cache WHERE model_id = ?1",
                params![model_id],
            )
            .await
            .map_err(|e| SeoforgeError::Storage(e.to_string()))?;
        Ok(())
    }
}
