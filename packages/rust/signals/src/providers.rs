//! Signal providers: coverage, relevance, and density scoring.
//!
//! Coverage and relevance reach out to external services and are expressed
//! as traits so the collector (and tests) can swap implementations. Density
//! is a pure pool-wide computation.

use seoforge_shared::embedding::cosine_similarity;
use seoforge_shared::{Query, Result};

use crate::serp::{SerpClient, SerpPayload};

/// Share of the coverage score driven by result quantity.
const QUANTITY_WEIGHT: f64 = 0.3;

/// Share of the coverage score driven by mean provider score.
const QUALITY_WEIGHT: f64 = 0.7;

// ---------------------------------------------------------------------------
// Coverage
// ---------------------------------------------------------------------------

/// Coverage outcome for one query: the score plus the raw SERP, which the
/// analysis stage reuses for competitor and gap extraction.
#[derive(Debug, Clone)]
pub struct CoverageOutcome {
    pub score: f64,
    pub serp: SerpPayload,
}

/// Fetches a SERP and scores how well the web covers a query.
pub trait CoverageProvider: Send + Sync + 'static {
    fn coverage(&self, query: &Query) -> impl Future<Output = Result<CoverageOutcome>> + Send;
}

impl CoverageProvider for SerpClient {
    async fn coverage(&self, query: &Query) -> Result<CoverageOutcome> {
        let serp = self.search(&query.text).await?;
        let score = coverage_score(&serp, self.max_results());
        Ok(CoverageOutcome { score, serp })
    }
}

/// Coverage = 30% quantity + 70% quality.
///
/// Quantity saturates at `max_results`; quality is the mean provider score
/// of the returned results. An empty SERP scores 0.
pub fn coverage_score(serp: &SerpPayload, max_results: usize) -> f64 {
    if serp.results.is_empty() || max_results == 0 {
        return 0.0;
    }

    let quantity = (serp.results.len() as f64 / max_results as f64).min(1.0);
    let quality =
        serp.results.iter().map(|r| r.score).sum::<f64>() / serp.results.len() as f64;

    (QUANTITY_WEIGHT * quantity + QUALITY_WEIGHT * quality).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Relevance
// ---------------------------------------------------------------------------

/// Scores how relevant a query is to the topic, in `[0, 1]`.
pub trait RelevanceProvider: Send + Sync + 'static {
    fn relevance(&self, query: &Query) -> impl Future<Output = Result<f64>> + Send;
}

/// Blend an embedding-similarity score with an LLM judgment.
///
/// The two weights sum to 1.0, enforced at config load; this function never
/// renormalizes.
pub fn blend_relevance(
    embedding_score: f64,
    llm_score: f64,
    embedding_weight: f64,
    llm_weight: f64,
) -> f64 {
    (embedding_weight * embedding_score + llm_weight * llm_score).clamp(0.0, 1.0)
}

/// Cosine similarity of a query against the topic centroid, clamped to `[0, 1]`.
pub fn embedding_relevance(query: &Query, topic_centroid: &[f32]) -> f64 {
    cosine_similarity(&query.embedding, topic_centroid).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Density
// ---------------------------------------------------------------------------

/// Semantic density of each query within the pool.
///
/// For each query, the mean cosine similarity against every other pool
/// member, normalized by the pool maximum so the densest query scores 1.0.
/// Pools of fewer than two embedded queries score all zeros.
pub fn density_scores(queries: &[Query]) -> Vec<f64> {
    let n = queries.len();
    if n < 2 {
        return vec![0.0; n];
    }

    let mut means = Vec::with_capacity(n);
    for (i, a) in queries.iter().enumerate() {
        let sum: f64 = queries
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, b)| cosine_similarity(&a.embedding, &b.embedding))
            .sum();
        means.push(sum / (n - 1) as f64);
    }

    let max = means.iter().cloned().fold(0.0f64, f64::max);
    if max <= 0.0 {
        return vec![0.0; n];
    }
    means.into_iter().map(|m| (m / max).clamp(0.0, 1.0)).collect()
}
