//! Bounded-concurrency signal collection across the query pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use seoforge_shared::{Degradation, Query, SignalSet};

use crate::providers::{CoverageProvider, RelevanceProvider, density_scores};
use crate::serp::SerpPayload;

/// Signals collected for one query, with the raw SERP kept for the analysis
/// stage.
#[derive(Debug, Clone)]
pub struct CollectedSignals {
    pub query: Query,
    pub signals: SignalSet,
    pub serp: SerpPayload,
}

/// Collects coverage, relevance, and density signals for a query pool.
///
/// External calls run concurrently under a semaphore and a per-call timeout.
/// A query whose providers fail or time out is excluded from the output and
/// recorded as a degradation; it is never given default signals.
pub struct SignalCollector<C, R> {
    coverage: Arc<C>,
    relevance: Arc<R>,
    concurrency: usize,
    timeout: Duration,
}

impl<C: CoverageProvider, R: RelevanceProvider> SignalCollector<C, R> {
    pub fn new(coverage: C, relevance: R, concurrency: usize, timeout: Duration) -> Self {
        Self {
            coverage: Arc::new(coverage),
            relevance: Arc::new(relevance),
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    /// Collect signals for every query in the pool.
    ///
    /// Output preserves pool order regardless of task completion order.
    #[instrument(skip_all, fields(pool_size = queries.len()))]
    pub async fn collect(
        &self,
        queries: &[Query],
    ) -> (Vec<CollectedSignals>, Vec<Degradation>) {
        // Density is pool-wide and pure, computed up front
        let densities = density_scores(queries);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(queries.len());

        for (i, query) in queries.iter().enumerate() {
            let query = query.clone();
            let density = densities[i];
            let coverage = self.coverage.clone();
            let relevance = self.relevance.clone();
            let sem = semaphore.clone();
            let timeout = self.timeout;

            handles.push(tokio::spawn(async move {
                let collected = match sem.acquire().await {
                    Ok(_permit) => {
                        fetch_signals(&*coverage, &*relevance, &query, density, timeout).await
                    }
                    Err(_) => Err("signal collector shut down".to_string()),
                };
                (i, query, collected)
            }));
        }

        let mut slots: Vec<Option<CollectedSignals>> = vec![None; queries.len()];
        let mut degradations = Vec::new();

        for (task_index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok((i, _, Ok(collected))) => {
                    debug_assert_eq!(i, task_index);
                    slots[i] = Some(collected);
                }
                Ok((_, query, Err(reason))) => {
                    warn!(query = %query.text, %reason, "excluding query from scoring");
                    degradations.push(Degradation {
                        subject: query.text,
                        reason,
                    });
                }
                // A panicking provider degrades its query like any other failure
                Err(e) => {
                    let query = &queries[task_index];
                    warn!(query = %query.text, error = %e, "signal task failed");
                    degradations.push(Degradation {
                        subject: query.text.clone(),
                        reason: format!("signal task failed: {e}"),
                    });
                }
            }
        }

        // Pool order, failed queries dropped
        let collected: Vec<CollectedSignals> = slots.into_iter().flatten().collect();

        info!(
            collected = collected.len(),
            excluded = degradations.len(),
            "signal collection complete"
        );
        (collected, degradations)
    }
}

/// Fetch coverage and relevance for one query under a shared timeout.
async fn fetch_signals<C: CoverageProvider, R: RelevanceProvider>(
    coverage: &C,
    relevance: &R,
    query: &Query,
    density: f64,
    timeout: Duration,
) -> std::result::Result<CollectedSignals, String> {
    let outcome = tokio::time::timeout(timeout, coverage.coverage(query))
        .await
        .map_err(|_| format!("coverage timed out after {}s", timeout.as_secs()))?
        .map_err(|e| format!("coverage failed: {e}"))?;

    let relevance_score = tokio::time::timeout(timeout, relevance.relevance(query))
        .await
        .map_err(|_| format!("relevance timed out after {}s", timeout.as_secs()))?
        .map_err(|e| format!("relevance failed: {e}"))?;

    Ok(CollectedSignals {
        query: query.clone(),
        signals: SignalSet {
            coverage: outcome.score,
            relevance: relevance_score,
            density,
        },
        serp: outcome.serp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::CoverageOutcome;
    use seoforge_shared::{Result, SeoforgeError};

    /// Coverage stub that fails for any query containing "bad".
    struct StubCoverage;

    impl CoverageProvider for StubCoverage {
        async fn coverage(&self, query: &Query) -> Result<CoverageOutcome> {
            if query.text.contains("bad") {
                return Err(SeoforgeError::signal(&query.text, "HTTP 500"));
            }
            Ok(CoverageOutcome {
                score: 0.8,
                serp: SerpPayload::default(),
            })
        }
    }

    /// Relevance stub with a fixed score.
    struct StubRelevance;

    impl RelevanceProvider for StubRelevance {
        async fn relevance(&self, _query: &Query) -> Result<f64> {
            Ok(0.6)
        }
    }

    /// Coverage stub that panics for any query containing "boom".
    struct PanickyCoverage;

    impl CoverageProvider for PanickyCoverage {
        async fn coverage(&self, query: &Query) -> Result<CoverageOutcome> {
            if query.text.contains("boom") {
                panic!("provider bug");
            }
            Ok(CoverageOutcome {
                score: 0.8,
                serp: SerpPayload::default(),
            })
        }
    }

    /// Coverage stub that never completes.
    struct HangingCoverage;

    impl CoverageProvider for HangingCoverage {
        async fn coverage(&self, _query: &Query) -> Result<CoverageOutcome> {
            std::future::pending().await
        }
    }

    fn queries(texts: &[&str]) -> Vec<Query> {
        texts.iter().map(|t| Query::new(*t)).collect()
    }

    #[tokio::test]
    async fn collects_in_pool_order() {
        let collector =
            SignalCollector::new(StubCoverage, StubRelevance, 4, Duration::from_secs(5));
        let pool = queries(&["q1", "q2", "q3"]);

        let (collected, degradations) = collector.collect(&pool).await;
        assert!(degradations.is_empty());
        let order: Vec<&str> = collected.iter().map(|c| c.query.text.as_str()).collect();
        assert_eq!(order, ["q1", "q2", "q3"]);
        assert_eq!(collected[0].signals.coverage, 0.8);
        assert_eq!(collected[0].signals.relevance, 0.6);
    }

    #[tokio::test]
    async fn failed_queries_are_excluded_not_defaulted() {
        let collector =
            SignalCollector::new(StubCoverage, StubRelevance, 2, Duration::from_secs(5));
        let pool = queries(&["good one", "bad one", "another good"]);

        let (collected, degradations) = collector.collect(&pool).await;
        assert_eq!(collected.len(), 2);
        assert_eq!(degradations.len(), 1);
        assert_eq!(degradations[0].subject, "bad one");
        assert!(degradations[0].reason.contains("HTTP 500"));
    }

    #[tokio::test]
    async fn timeouts_become_degradations() {
        let collector =
            SignalCollector::new(HangingCoverage, StubRelevance, 2, Duration::from_millis(50));
        let pool = queries(&["slow query"]);

        let (collected, degradations) = collector.collect(&pool).await;
        assert!(collected.is_empty());
        assert_eq!(degradations.len(), 1);
        assert!(degradations[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn panicking_provider_degrades_only_its_query() {
        let collector =
            SignalCollector::new(PanickyCoverage, StubRelevance, 2, Duration::from_secs(5));
        let pool = queries(&["fine", "boom", "also fine"]);

        let (collected, degradations) = collector.collect(&pool).await;
        assert_eq!(collected.len(), 2);
        let order: Vec<&str> = collected.iter().map(|c| c.query.text.as_str()).collect();
        assert_eq!(order, ["fine", "also fine"]);
        assert_eq!(degradations.len(), 1);
        assert_eq!(degradations[0].subject, "boom");
        assert!(degradations[0].reason.contains("signal task failed"));
    }

    #[tokio::test]
    async fn many_failures_still_leave_survivors() {
        let collector =
            SignalCollector::new(StubCoverage, StubRelevance, 4, Duration::from_secs(5));
        let texts: Vec<String> = (0..24)
            .map(|i| {
                if i % 8 == 0 {
                    format!("bad query {i}")
                } else {
                    format!("query {i}")
                }
            })
            .collect();
        let pool: Vec<Query> = texts.iter().map(Query::new).collect();

        let (collected, degradations) = collector.collect(&pool).await;
        assert_eq!(collected.len(), 21);
        assert_eq!(degradations.len(), 3);
    }
}
