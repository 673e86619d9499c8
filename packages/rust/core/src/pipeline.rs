//! End-to-end `run` pipeline: topic → pool → signals → scoring → analysis →
//! aggregation → outline → strategy directory.
//!
//! Stages run strictly in sequence; concurrency only happens per query
//! inside signal collection. Per-query failures accumulate in the manifest's
//! degradation list and the run always produces a best-effort output.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use seoforge_analysis::{AnalysisEngine, BridgeRelevance};
use seoforge_querypool::{QueryPool, build_pool, merge_pool};
use seoforge_shared::config::{self, AppConfig};
use seoforge_shared::embedding::centroid;
use seoforge_shared::{
    Degradation, PaaQuestion, Query, QueryAnalysis, Result, RunId, RunManifest, ScoredQuery,
    SeoforgeError, SignalSet,
};
use seoforge_signals::{
    CoverageOutcome, CoverageProvider, SerpClient, SerpPayload, SignalCollector, coverage_score,
    query_hash,
};
use seoforge_storage::Storage;

use crate::aggregator;
use crate::outline;
use crate::report;
use crate::scoring;

/// How many expansion queries to request from the bridge.
const EXPANSION_COUNT: usize = 20;

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// The topic seed.
    pub topic: String,
    /// Optional human-readable run label (defaults to the topic).
    pub name: Option<String>,
    /// Root directory for run output.
    pub output_root: PathBuf,
    /// Override for `selection.top_queries_limit`.
    pub limit: Option<usize>,
    /// Tool version string recorded in the manifest.
    pub tool_version: String,
}

/// Result of a completed pipeline run.
#[derive(Debug)]
pub struct RunResult {
    /// Path to the strategy directory.
    pub run_path: PathBuf,
    /// Run identifier.
    pub run_id: RunId,
    /// Number of queries scored.
    pub scored_count: usize,
    /// Number of queries analyzed.
    pub analyzed_count: usize,
    /// Degradations recorded during the run.
    pub degradations: usize,
    /// Total elapsed time.
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Per-query progress within the analysis phase.
    fn query_analyzed(&self, query: &str, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &RunResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn query_analyzed(&self, _query: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &RunResult) {}
}

/// Run the full pipeline.
///
/// 1. Expand the topic into a query pool
/// 2. Embed and semantically merge the pool
/// 3. Collect coverage/relevance/density signals
/// 4. Score and select top queries
/// 5. Analyze each selected query's SERP
/// 6. Aggregate into one insight, assemble the outline
/// 7. Write the strategy directory
#[instrument(skip_all, fields(topic = %run.topic))]
pub async fn run_pipeline(
    config: &AppConfig,
    run: &RunConfig,
    progress: &dyn ProgressReporter,
) -> Result<RunResult> {
    let start = Instant::now();
    config::validate(config)?;

    let mut manifest = RunManifest::new(&run.topic);
    manifest.name = run.name.clone();
    manifest.tool_version = run.tool_version.clone();
    let run_id = manifest.run_id;

    info!(%run_id, topic = %run.topic, "starting run");

    // --- Storage ---
    progress.phase("Initializing storage");
    let db_path = run
        .output_root
        .join(run_id.to_string())
        .join("indexes")
        .join("seoforge.db");
    let storage = Arc::new(Storage::open(&db_path).await?);
    storage.insert_run(&run_id.to_string(), &run.topic).await?;

    // --- Bridge ---
    progress.phase("Starting analysis bridge");
    let engine = Arc::new(AnalysisEngine::spawn(
        &config.bridge,
        Some(storage.clone()),
    )?);

    // --- Phase 1: Query pool ---
    progress.phase("Expanding topic into queries");
    let expansions = engine.expand(&run.topic, EXPANSION_COUNT).await?;

    let mut seeds = vec![run.topic.clone()];
    seeds.extend(config.topic.base_seeds.iter().cloned());
    let pool = build_pool(&seeds, &expansions);
    manifest.pool_size = pool.len();

    if pool.is_empty() {
        return Err(SeoforgeError::validation(
            "query pool is empty after expansion",
        ));
    }

    // --- Phase 2: Embeddings + semantic merge ---
    progress.phase("Embedding and merging queries");
    let (pool, topic_centroid) = embed_pool(&engine, pool, &run.topic).await?;
    let merged = merge_pool(&pool, config.selection.merge_threshold);
    manifest.merged_pool_size = merged.len();

    // --- Phase 3: Signal collection ---
    progress.phase("Collecting signals");
    let coverage = CachedCoverage {
        client: SerpClient::from_config(&config.search)?,
        storage: storage.clone(),
        provider: config.search.endpoint.clone(),
        max_results: config.search.max_results,
    };
    let relevance = BridgeRelevance::new(
        engine.clone(),
        run.topic.clone(),
        topic_centroid,
        config.weights.embedding_weight,
        config.weights.llm_weight,
    );
    let collector = SignalCollector::new(
        coverage,
        relevance,
        config.search.concurrency,
        std::time::Duration::from_secs(config.search.timeout_secs),
    );
    let (collected, signal_degradations) = collector.collect(&merged.queries).await;
    manifest.degradations.extend(signal_degradations);

    // --- Phase 4: Scoring + selection ---
    progress.phase("Scoring queries");
    let queries: Vec<Query> = collected.iter().map(|c| c.query.clone()).collect();
    let signals: HashMap<String, SignalSet> = collected
        .iter()
        .map(|c| (c.query.text.clone(), c.signals))
        .collect();
    let serps: HashMap<String, SerpPayload> = collected
        .iter()
        .map(|c| (c.query.text.clone(), c.serp.clone()))
        .collect();

    let scored = scoring::score(&queries, &signals, &config.weights)?;
    manifest.scored_count = scored.len();
    storage
        .replace_scored_queries(&run_id.to_string(), &scored)
        .await?;

    let limit = run.limit.unwrap_or(config.selection.top_queries_limit);
    let selected = scoring::select_top(scored.clone(), limit);

    // --- Phase 5: SERP analysis ---
    progress.phase("Analyzing SERPs");
    let (analyses, analysis_degradations) =
        analyze_selected(&engine, &selected, &serps, progress).await;
    manifest.analyzed_count = analyses.len();
    manifest.degradations.extend(analysis_degradations);

    // --- Phase 6: Aggregation + outline ---
    progress.phase("Aggregating insight");
    let insight = aggregator::aggregate(&analyses, &config.selection);

    progress.phase("Assembling outline");
    let (outline, block_degradations) =
        outline::assemble(&run.topic, &insight, &config.article.blocks);
    manifest.degradations.extend(block_degradations);

    // --- Phase 7: Report ---
    progress.phase("Writing strategy directory");
    manifest.completed_at = Some(chrono::Utc::now());
    let report = report::write_report(&run.output_root, &manifest, &scored, &insight, &outline)?;

    let manifest_json = serde_json::to_string(&manifest)
        .map_err(|e| SeoforgeError::validation(format!("manifest serialization: {e}")))?;
    storage
        .complete_run(&run_id.to_string(), &manifest_json)
        .await?;

    if let Err(e) = engine.shutdown() {
        warn!(error = %e, "bridge shutdown failed");
    }

    let result = RunResult {
        run_path: report.run_path,
        run_id,
        scored_count: manifest.scored_count,
        analyzed_count: manifest.analyzed_count,
        degradations: manifest.degradations.len(),
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        %run_id,
        scored = result.scored_count,
        analyzed = result.analyzed_count,
        degradations = result.degradations,
        elapsed_ms = result.elapsed.as_millis(),
        "run complete"
    );

    Ok(result)
}

/// Re-score an existing run from its stored signals after weight changes.
///
/// Rewrites the scored-query table in storage and the CSV on disk; analysis
/// artifacts are left untouched.
#[instrument(skip_all, fields(run_path = %run_path.display()))]
pub async fn rescore_run(run_path: &std::path::Path, config: &AppConfig) -> Result<Vec<ScoredQuery>> {
    config::validate(config)?;

    let manifest_path = run_path.join("manifest.json");
    let content = std::fs::read_to_string(&manifest_path)
        .map_err(|e| SeoforgeError::io(&manifest_path, e))?;
    let manifest: RunManifest = serde_json::from_str(&content)
        .map_err(|e| SeoforgeError::validation(format!("invalid manifest.json: {e}")))?;

    let db_path = run_path.join("indexes").join("seoforge.db");
    let storage = Storage::open(&db_path).await?;

    let rows = storage
        .list_scored_signals(&manifest.run_id.to_string())
        .await?;
    if rows.is_empty() {
        return Err(SeoforgeError::validation(
            "run has no stored signals to re-score",
        ));
    }

    let queries: Vec<Query> = rows.iter().map(|(text, _)| Query::new(text)).collect();
    let signals: HashMap<String, SignalSet> = rows.into_iter().collect();

    let scored = scoring::score(&queries, &signals, &config.weights)?;
    storage
        .replace_scored_queries(&manifest.run_id.to_string(), &scored)
        .await?;
    report::update_scored_csv(run_path, &scored)?;

    info!(scored = scored.len(), "re-score complete");
    Ok(scored)
}

// ---------------------------------------------------------------------------
// Cached coverage provider
// ---------------------------------------------------------------------------

/// Coverage provider that caches raw SERPs in storage, keyed by query hash.
/// A re-run of the same topic skips the search API entirely.
struct CachedCoverage {
    client: SerpClient,
    storage: Arc<Storage>,
    provider: String,
    max_results: usize,
}

impl CoverageProvider for CachedCoverage {
    async fn coverage(&self, query: &Query) -> Result<CoverageOutcome> {
        let hash = query_hash(&query.text);

        if let Some(json) = self
            .storage
            .get_signal_cache(&hash, "serp", &self.provider)
            .await?
        {
            match serde_json::from_str::<SerpPayload>(&json) {
                Ok(serp) => {
                    debug!(query = %query.text, "SERP cache hit");
                    let score = coverage_score(&serp, self.max_results);
                    return Ok(CoverageOutcome { score, serp });
                }
                Err(e) => {
                    warn!(query = %query.text, error = %e, "corrupt SERP cache entry, refetching");
                }
            }
        }

        let outcome = self.client.coverage(query).await?;
        let json = serde_json::to_string(&outcome.serp)
            .map_err(|e| SeoforgeError::Storage(format!("SERP serialization: {e}")))?;
        self.storage
            .set_signal_cache(&hash, "serp", &self.provider, &json)
            .await?;
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Embed every pool query plus the topic itself; returns the embedded pool
/// and the topic centroid.
async fn embed_pool(
    engine: &AnalysisEngine,
    mut pool: QueryPool,
    topic: &str,
) -> Result<(QueryPool, Vec<f32>)> {
    let mut texts: Vec<String> = vec![topic.to_string()];
    texts.extend(pool.queries.iter().map(|q| q.text.clone()));

    let mut embeddings = engine.embed(&texts).await?;
    let topic_vector = embeddings.remove(0);

    for (query, embedding) in pool.queries.iter_mut().zip(embeddings) {
        query.embedding = embedding;
    }

    // The topic vector anchors relevance; seed embeddings refine it
    let mut anchor_vectors = vec![topic_vector];
    anchor_vectors.extend(pool.queries.iter().take(1).map(|q| q.embedding.clone()));
    let topic_centroid = centroid(&anchor_vectors);

    Ok((pool, topic_centroid))
}

/// Analyze each selected query's SERP; failures degrade, never abort.
async fn analyze_selected(
    engine: &AnalysisEngine,
    selected: &[ScoredQuery],
    serps: &HashMap<String, SerpPayload>,
    progress: &dyn ProgressReporter,
) -> (Vec<QueryAnalysis>, Vec<Degradation>) {
    let mut analyses = Vec::with_capacity(selected.len());
    let mut degradations = Vec::new();
    let total = selected.len();

    for (i, sq) in selected.iter().enumerate() {
        let rank = (i + 1) as u32;
        progress.query_analyzed(&sq.query.text, i + 1, total);

        let Some(serp) = serps.get(&sq.query.text) else {
            // Signal collection keeps SERPs for every survivor; a miss here
            // means the query never made it through collection.
            degradations.push(Degradation {
                subject: sq.query.text.clone(),
                reason: "no SERP available for analysis".into(),
            });
            continue;
        };

        match engine.analyze(&sq.query.text, serp).await {
            Ok(result) => {
                let paa_questions =
                    embed_paa(engine, &serp.paa_questions, rank).await;
                analyses.push(QueryAnalysis {
                    query_text: sq.query.text.clone(),
                    rank,
                    competitors: result.competitors,
                    gaps: result.gaps,
                    paa_questions,
                    has_ai_overview: serp.has_ai_overview,
                });
            }
            Err(e) => {
                warn!(query = %sq.query.text, error = %e, "analysis failed, excluding query");
                degradations.push(Degradation {
                    subject: sq.query.text.clone(),
                    reason: format!("analysis failed: {e}"),
                });
            }
        }
    }

    (analyses, degradations)
}

/// Embed PAA questions for semantic dedup. An embed failure degrades to
/// text-only dedup rather than dropping the questions.
async fn embed_paa(engine: &AnalysisEngine, texts: &[String], rank: u32) -> Vec<PaaQuestion> {
    let embeddings = match engine.embed(texts).await {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "PAA embedding failed, falling back to exact-text dedup");
            vec![Vec::new(); texts.len()]
        }
    };

    texts
        .iter()
        .zip(embeddings)
        .map(|(text, embedding)| PaaQuestion {
            text: text.clone(),
            embedding,
            source_rank: rank,
            recurrence: 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use seoforge_shared::AggregatedInsight;
    use seoforge_shared::types::Outline;

    fn scored_with(text: &str, signals: SignalSet, final_score: f64) -> ScoredQuery {
        ScoredQuery {
            query: Query::new(text),
            signals,
            final_score,
        }
    }

    #[tokio::test]
    async fn cached_coverage_serves_hits_without_network() {
        let db = std::env::temp_dir().join(format!("sf-cache-{}.db", uuid::Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&db).await.unwrap());

        let serp = SerpPayload {
            results: vec![],
            paa_questions: vec!["how often to calibrate?".into()],
            has_ai_overview: true,
        };
        let query = Query::new("pipette calibration");
        storage
            .set_signal_cache(
                &query_hash(&query.text),
                "serp",
                "test-endpoint",
                &serde_json::to_string(&serp).unwrap(),
            )
            .await
            .unwrap();

        // Unroutable endpoint: any actual fetch attempt would fail
        let coverage = CachedCoverage {
            client: SerpClient::new("http://127.0.0.1:1/search", "key".into(), 10, 1).unwrap(),
            storage,
            provider: "test-endpoint".into(),
            max_results: 10,
        };

        let outcome = coverage.coverage(&query).await.unwrap();
        assert_eq!(outcome.serp.paa_questions, vec!["how often to calibrate?"]);
        assert_eq!(outcome.score, 0.0);

        let _ = std::fs::remove_file(&db);
    }

    #[tokio::test]
    async fn rescore_reorders_after_weight_change() {
        let root = std::env::temp_dir().join(format!("sf-rescore-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&root).unwrap();

        let manifest = RunManifest::new("pipettes");
        let high_coverage = scored_with(
            "coverage heavy",
            SignalSet {
                coverage: 1.0,
                relevance: 0.0,
                density: 0.0,
            },
            0.8,
        );
        let high_relevance = scored_with(
            "relevance heavy",
            SignalSet {
                coverage: 0.0,
                relevance: 1.0,
                density: 0.0,
            },
            0.1,
        );
        let scored = vec![high_coverage, high_relevance];

        let outline = Outline {
            topic: "pipettes".into(),
            blocks: vec![],
        };
        let report = report::write_report(
            &root,
            &manifest,
            &scored,
            &AggregatedInsight::default(),
            &outline,
        )
        .unwrap();

        let db_path = report.run_path.join("indexes").join("seoforge.db");
        let storage = Storage::open(&db_path).await.unwrap();
        storage
            .insert_run(&manifest.run_id.to_string(), "pipettes")
            .await
            .unwrap();
        storage
            .replace_scored_queries(&manifest.run_id.to_string(), &scored)
            .await
            .unwrap();
        drop(storage);

        // Flip the weights toward relevance
        let mut config = AppConfig::default();
        config.weights.coverage_w = 0.1;
        config.weights.relevance_w = 0.8;
        config.weights.density_w = 0.1;

        let rescored = rescore_run(&report.run_path, &config).await.unwrap();
        assert_eq!(rescored[0].query.text, "relevance heavy");
        assert!((rescored[0].final_score - 0.8).abs() < 1e-9);
        assert!((rescored[1].final_score - 0.1).abs() < 1e-9);

        let csv =
            std::fs::read_to_string(report.run_path.join("scored_queries.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert!(lines[1].starts_with("relevance heavy,"));

        let _ = std::fs::remove_dir_all(&root);
    }
}
