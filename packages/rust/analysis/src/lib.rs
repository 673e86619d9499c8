//! LLM analysis for Seoforge.
//!
//! All LLM work goes through a bridge subprocess speaking a JSON-lines
//! protocol; this crate wraps it with typed task methods and a
//! storage-backed result cache so re-runs skip the model entirely.

mod bridge;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use seoforge_shared::config::BridgeConfig;
use seoforge_shared::{CompetitorSummary, ContentGap, Query, Result, SeoforgeError};
use seoforge_signals::{RelevanceProvider, SerpPayload, blend_relevance, embedding_relevance};
use seoforge_storage::Storage;

use bridge::{BridgeHandle, RequestMessage};

/// Competitor summaries and gaps extracted from one query's SERP.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SerpAnalysis {
    #[serde(default)]
    pub competitors: Vec<CompetitorSummary>,
    #[serde(default)]
    pub gaps: Vec<ContentGap>,
}

#[derive(Debug, Deserialize)]
struct ExpandPayload {
    queries: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedPayload {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct RelevancePayload {
    score: f64,
}

// ---------------------------------------------------------------------------
// AnalysisEngine
// ---------------------------------------------------------------------------

/// Typed interface to the bridge subprocess with result caching.
///
/// The bridge handles one request at a time; concurrent callers serialize on
/// an internal mutex. Each exchange runs on a blocking thread under a
/// per-call timeout, so a stalled bridge degrades the calling query instead
/// of wedging the pipeline.
pub struct AnalysisEngine {
    bridge: Arc<Mutex<BridgeHandle>>,
    model: String,
    timeout: Duration,
    storage: Option<Arc<Storage>>,
}

impl AnalysisEngine {
    /// Spawn the bridge subprocess. Pass a storage handle to enable the
    /// analysis cache.
    pub fn spawn(config: &BridgeConfig, storage: Option<Arc<Storage>>) -> Result<Self> {
        let handle = BridgeHandle::spawn(config)?;
        Ok(Self {
            bridge: Arc::new(Mutex::new(handle)),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            storage,
        })
    }

    /// Expand a topic seed into candidate queries.
    #[instrument(skip_all, fields(topic = %topic, count))]
    pub async fn expand(&self, topic: &str, count: usize) -> Result<Vec<String>> {
        let cache_input = format!("{topic}\n{count}");
        let value = self
            .request_cached("expand", &cache_input, |id| RequestMessage::Expand {
                id,
                topic: topic.to_string(),
                count,
            })
            .await?;

        let payload: ExpandPayload = serde_json::from_value(value)
            .map_err(|e| SeoforgeError::Analysis(format!("invalid expand result: {e}")))?;
        Ok(payload.queries)
    }

    /// Embed a batch of texts. Output order matches input order.
    #[instrument(skip_all, fields(texts = texts.len()))]
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let cache_input = texts.join("\n");
        let value = self
            .request_cached("embed", &cache_input, |id| RequestMessage::Embed {
                id,
                texts: texts.to_vec(),
            })
            .await?;

        let payload: EmbedPayload = serde_json::from_value(value)
            .map_err(|e| SeoforgeError::Analysis(format!("invalid embed result: {e}")))?;

        if payload.embeddings.len() != texts.len() {
            return Err(SeoforgeError::Analysis(format!(
                "embed returned {} vectors for {} texts",
                payload.embeddings.len(),
                texts.len()
            )));
        }
        Ok(payload.embeddings)
    }

    /// LLM judgment of how relevant a query is to the topic, in `[0, 1]`.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn classify_relevance(&self, topic: &str, query: &str) -> Result<f64> {
        let cache_input = format!("{topic}\n{query}");
        let value = self
            .request_cached("classify_relevance", &cache_input, |id| {
                RequestMessage::ClassifyRelevance {
                    id,
                    topic: topic.to_string(),
                    query: query.to_string(),
                }
            })
            .await?;

        let payload: RelevancePayload = serde_json::from_value(value)
            .map_err(|e| SeoforgeError::Analysis(format!("invalid relevance result: {e}")))?;
        Ok(payload.score.clamp(0.0, 1.0))
    }

    /// Analyze one query's SERP for competitor summaries and content gaps.
    #[instrument(skip_all, fields(query = %query_text))]
    pub async fn analyze(&self, query_text: &str, serp: &SerpPayload) -> Result<SerpAnalysis> {
        let snippets: Vec<String> = serp
            .results
            .iter()
            .map(|r| format!("[{}] {}: {}", r.url, r.title, r.snippet))
            .collect();

        let cache_input = format!(
            "{query_text}\n{}\n{}\n{}",
            snippets.join("\n"),
            serp.paa_questions.join("\n"),
            serp.has_ai_overview
        );

        let value = self
            .request_cached("analyze", &cache_input, |id| RequestMessage::Analyze {
                id,
                query: query_text.to_string(),
                snippets: snippets.clone(),
                paa: serp.paa_questions.clone(),
                has_ai_overview: serp.has_ai_overview,
            })
            .await?;

        serde_json::from_value(value)
            .map_err(|e| SeoforgeError::Analysis(format!("invalid analyze result: {e}")))
    }

    /// Shut the bridge subprocess down.
    pub fn shutdown(&self) -> Result<()> {
        self.lock_bridge()?.shutdown()
    }

    fn lock_bridge(&self) -> Result<MutexGuard<'_, BridgeHandle>> {
        self.bridge
            .lock()
            .map_err(|_| SeoforgeError::Analysis("bridge lock poisoned".into()))
    }

    /// Send a request through the cache: hit returns the stored JSON, miss
    /// calls the bridge and stores the result.
    ///
    /// The blocking line exchange happens off the async runtime; a call that
    /// exceeds the configured timeout errors out (the caller records a
    /// degradation) while the bridge thread drains on its own.
    async fn request_cached(
        &self,
        task_type: &str,
        cache_input: &str,
        make: impl FnOnce(String) -> RequestMessage,
    ) -> Result<serde_json::Value> {
        let hash = prompt_hash(cache_input, task_type);

        if let Some(storage) = &self.storage {
            if let Some(cached) = storage
                .get_analysis_cache(task_type, &hash, &self.model)
                .await?
            {
                debug!(task = task_type, "analysis cache hit");
                return serde_json::from_str(&cached)
                    .map_err(|e| SeoforgeError::Analysis(format!("corrupt cache entry: {e}")));
            }
        }

        let request = {
            let mut bridge = self.lock_bridge()?;
            make(bridge.next_id())
        };
        debug_assert_eq!(request.task_type(), task_type);

        let bridge = Arc::clone(&self.bridge);
        let exchange = tokio::task::spawn_blocking(move || {
            let mut bridge = bridge
                .lock()
                .map_err(|_| SeoforgeError::Analysis("bridge lock poisoned".into()))?;
            bridge.send(&request)
        });

        let value = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                SeoforgeError::Analysis(format!(
                    "bridge {task_type} call timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| SeoforgeError::Analysis(format!("bridge task failed: {e}")))??;

        if let Some(storage) = &self.storage {
            let json = serde_json::to_string(&value)
                .map_err(|e| SeoforgeError::Analysis(e.to_string()))?;
            storage
                .set_analysis_cache(task_type, &hash, &self.model, &json)
                .await?;
        }

        Ok(value)
    }
}

/// Compute a prompt hash for cache keying.
fn prompt_hash(content: &str, task_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update(task_type.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Relevance provider backed by the bridge
// ---------------------------------------------------------------------------

/// Blended relevance: embedding similarity against the topic centroid plus
/// the bridge's LLM judgment, weighted per config.
pub struct BridgeRelevance {
    engine: Arc<AnalysisEngine>,
    topic: String,
    topic_centroid: Vec<f32>,
    embedding_weight: f64,
    llm_weight: f64,
}

impl BridgeRelevance {
    pub fn new(
        engine: Arc<AnalysisEngine>,
        topic: impl Into<String>,
        topic_centroid: Vec<f32>,
        embedding_weight: f64,
        llm_weight: f64,
    ) -> Self {
        Self {
            engine,
            topic: topic.into(),
            topic_centroid,
            embedding_weight,
            llm_weight,
        }
    }
}

impl RelevanceProvider for BridgeRelevance {
    async fn relevance(&self, query: &Query) -> Result<f64> {
        let embedding_score = embedding_relevance(query, &self.topic_centroid);
        let llm_score = self
            .engine
            .classify_relevance(&self.topic, &query.text)
            .await?;
        Ok(blend_relevance(
            embedding_score,
            llm_score,
            self.embedding_weight,
            self.llm_weight,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_hash_deterministic() {
        assert_eq!(
            prompt_hash("pipette", "analyze"),
            prompt_hash("pipette", "analyze")
        );
    }

    #[test]
    fn prompt_hash_differs_by_task() {
        assert_ne!(
            prompt_hash("pipette", "analyze"),
            prompt_hash("pipette", "expand")
        );
    }

    #[test]
    fn serp_analysis_deserializes_with_missing_fields() {
        let analysis: SerpAnalysis = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(analysis.competitors.is_empty());
        assert!(analysis.gaps.is_empty());
    }

    #[test]
    fn serp_analysis_deserializes_full_payload() {
        let json = serde_json::json!({
            "competitors": [{
                "position": 1,
                "domain": "labsupply.example",
                "key_points": ["calibration steps"],
                "content_depth": "deep",
                "unique_value": "includes video walkthrough"
            }],
            "gaps": [{
                "gap_type": "paa",
                "description": "nobody answers storage temperature",
                "opportunity_score": 0.8,
                "recommended_action": "add a storage section"
            }]
        });
        let analysis: SerpAnalysis = serde_json::from_value(json).unwrap();
        assert_eq!(analysis.competitors.len(), 1);
        assert_eq!(analysis.gaps.len(), 1);
        assert_eq!(analysis.competitors[0].position, 1);
    }

    #[test]
    fn relevance_payload_parses() {
        let payload: RelevancePayload =
            serde_json::from_value(serde_json::json!({"score": 0.73})).unwrap();
        assert_eq!(payload.score, 0.73);
    }

    #[tokio::test]
    async fn stalled_bridge_call_times_out() {
        // A bridge that answers the ready handshake and then goes silent
        let script = std::env::temp_dir().join(format!(
            "sf-bridge-stall-{}.sh",
            std::process::id()
        ));
        std::fs::write(
            &script,
            "#!/bin/sh\necho '{\"type\":\"ready\"}'\nsleep 3\n",
        )
        .unwrap();

        let config = BridgeConfig {
            cmd: "sh".into(),
            script: script.to_string_lossy().into_owned(),
            working_dir: None,
            model: "test-model".into(),
            timeout_secs: 1,
        };

        let engine = AnalysisEngine::spawn(&config, None).unwrap();
        let err = engine
            .classify_relevance("micropipette", "pipette calibration")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));

        let _ = std::fs::remove_file(&script);
    }
}
