//! Weighted query scoring and top-K selection.
//!
//! Pure functions: same inputs always produce the same ranking, no I/O.

use std::collections::HashMap;

use seoforge_shared::config::WeightsConfig;
use seoforge_shared::{Query, Result, ScoredQuery, SeoforgeError, SignalSet};

/// Score every query with its collected signals.
///
/// `signals` is keyed by query text; every query must have an entry, a
/// missing one is an error naming the query (callers must exclude failed
/// queries before scoring, never feed defaults).
///
/// The result is sorted by final score descending; ties keep the order of
/// `queries`, which is canonical pool order.
pub fn score(
    queries: &[Query],
    signals: &HashMap<String, SignalSet>,
    weights: &WeightsConfig,
) -> Result<Vec<ScoredQuery>> {
    let mut scored = Vec::with_capacity(queries.len());

    for query in queries {
        let set = signals
            .get(&query.text)
            .ok_or_else(|| SeoforgeError::MissingSignal {
                query: query.text.clone(),
            })?;

        let final_score = set.coverage * weights.coverage_w
            + set.relevance * weights.relevance_w
            + set.density * weights.density_w;

        scored.push(ScoredQuery {
            query: query.clone(),
            signals: *set,
            final_score,
        });
    }

    // Stable sort: equal scores keep pool order
    scored.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(scored)
}

/// Take the top `k` scored queries.
///
/// A `k` larger than the list returns everything; it is not an error.
pub fn select_top(mut scored: Vec<ScoredQuery>, k: usize) -> Vec<ScoredQuery> {
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(coverage_w: f64, relevance_w: f64, density_w: f64) -> WeightsConfig {
        WeightsConfig {
            coverage_w,
            relevance_w,
            density_w,
            ..Default::default()
        }
    }

    fn signal(coverage: f64, relevance: f64, density: f64) -> SignalSet {
        SignalSet {
            coverage,
            relevance,
            density,
        }
    }

    fn pool_with_signals(entries: &[(&str, SignalSet)]) -> (Vec<Query>, HashMap<String, SignalSet>) {
        let queries: Vec<Query> = entries.iter().map(|(t, _)| Query::new(*t)).collect();
        let signals = entries
            .iter()
            .map(|(t, s)| (t.to_string(), *s))
            .collect();
        (queries, signals)
    }

    #[test]
    fn worked_scoring_example() {
        let (queries, signals) = pool_with_signals(&[
            ("q1", signal(0.9, 0.8, 0.7)),
            ("q2", signal(0.6, 0.5, 0.4)),
            ("q3", signal(0.95, 0.9, 0.85)),
        ]);
        let w = weights(0.4, 0.4, 0.2);

        let scored = score(&queries, &signals, &w).unwrap();

        let order: Vec<&str> = scored.iter().map(|s| s.query.text.as_str()).collect();
        assert_eq!(order, ["q3", "q1", "q2"]);
        assert!((scored[0].final_score - 0.91).abs() < 1e-9);
        assert!((scored[1].final_score - 0.82).abs() < 1e-9);
        assert!((scored[2].final_score - 0.52).abs() < 1e-9);
    }

    #[test]
    fn scoring_is_deterministic() {
        let (queries, signals) = pool_with_signals(&[
            ("a", signal(0.5, 0.5, 0.5)),
            ("b", signal(0.7, 0.2, 0.9)),
        ]);
        let w = WeightsConfig::default();

        let first = score(&queries, &signals, &w).unwrap();
        let second = score(&queries, &signals, &w).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn ties_keep_pool_order() {
        let (queries, signals) = pool_with_signals(&[
            ("first", signal(0.5, 0.5, 0.5)),
            ("second", signal(0.5, 0.5, 0.5)),
            ("third", signal(0.5, 0.5, 0.5)),
        ]);
        let scored = score(&queries, &signals, &WeightsConfig::default()).unwrap();
        let order: Vec<&str> = scored.iter().map(|s| s.query.text.as_str()).collect();
        assert_eq!(order, ["first", "second", "third"]);
    }

    #[test]
    fn missing_signal_names_the_query() {
        let queries = vec![Query::new("has signals"), Query::new("missing one")];
        let mut signals = HashMap::new();
        signals.insert("has signals".to_string(), signal(0.5, 0.5, 0.5));

        let err = score(&queries, &signals, &WeightsConfig::default()).unwrap_err();
        assert!(matches!(err, SeoforgeError::MissingSignal { ref query } if query == "missing one"));
    }

    #[test]
    fn select_top_with_oversized_k_returns_all() {
        let (queries, signals) = pool_with_signals(&[
            ("a", signal(0.9, 0.9, 0.9)),
            ("b", signal(0.8, 0.8, 0.8)),
            ("c", signal(0.7, 0.7, 0.7)),
            ("d", signal(0.6, 0.6, 0.6)),
            ("e", signal(0.5, 0.5, 0.5)),
        ]);
        let scored = score(&queries, &signals, &WeightsConfig::default()).unwrap();

        assert_eq!(select_top(scored.clone(), 100).len(), 5);
        assert_eq!(select_top(scored.clone(), 2).len(), 2);
        assert_eq!(select_top(scored, 0).len(), 0);
    }
}
