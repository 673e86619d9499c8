//! Query pool construction and semantic merge.
//!
//! A pool starts from hand-written seed queries, grows with LLM expansions,
//! and is deduplicated twice: textually at build time (normalized exact
//! match) and semantically at merge time (greedy cosine clustering).

use seoforge_shared::embedding::{centroid, cosine_similarity};
use seoforge_shared::types::{Query, normalize_text};
use tracing::{debug, info, instrument};

/// An ordered, deduplicated pool of candidate queries.
///
/// Insertion order is canonical: seeds come before expansions, and all
/// downstream ranking ties break by position in this pool.
#[derive(Debug, Clone, Default)]
pub struct QueryPool {
    pub queries: Vec<Query>,
}

impl QueryPool {
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Pool construction
// ---------------------------------------------------------------------------

/// Build a query pool from seeds and LLM expansions.
///
/// Seeds are inserted first, then expansions; duplicates by normalized text
/// keep the first occurrence, so a seed always wins over an expansion that
/// spells the same query differently.
#[instrument(skip_all, fields(seeds = seeds.len(), expansions = expansions.len()))]
pub fn build_pool(seeds: &[String], expansions: &[String]) -> QueryPool {
    let mut pool = QueryPool::default();
    let mut seen = std::collections::HashSet::new();

    for text in seeds.iter().chain(expansions.iter()) {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            continue;
        }
        if !seen.insert(normalized) {
            debug!(query = %text, "dropping duplicate query");
            continue;
        }
        pool.queries.push(Query::new(text.trim()));
    }

    info!(pool_size = pool.len(), "query pool built");
    pool
}

// ---------------------------------------------------------------------------
// Semantic merge
// ---------------------------------------------------------------------------

/// Merge semantically near-duplicate queries.
///
/// Greedy single pass over the pool in insertion order: each query joins the
/// first existing group whose representative vector is at least `threshold`
/// cosine-similar, otherwise it starts a new group. Within a group the
/// shortest text becomes the main query, the rest become its synonyms, and
/// the group embedding is the element-wise mean of all member vectors.
///
/// Queries without embeddings never merge (cosine against them is 0).
#[instrument(skip_all, fields(pool_size = pool.len(), threshold))]
pub fn merge_pool(pool: &QueryPool, threshold: f64) -> QueryPool {
    let mut groups: Vec<Vec<&Query>> = Vec::new();
    let mut group_vectors: Vec<Vec<f32>> = Vec::new();

    for query in &pool.queries {
        let mut merged = false;
        for (i, vector) in group_vectors.iter().enumerate() {
            if cosine_similarity(&query.embedding, vector) >= threshold {
                debug!(
                    query = %query.text,
                    into = %groups[i][0].text,
                    "merging near-duplicate query"
                );
                groups[i].push(query);
                group_vectors[i] = centroid(
                    &groups[i]
                        .iter()
                        .map(|q| q.embedding.clone())
                        .collect::<Vec<_>>(),
                );
                merged = true;
                break;
            }
        }
        if !merged {
            groups.push(vec![query]);
            group_vectors.push(query.embedding.clone());
        }
    }

    let queries = groups
        .into_iter()
        .zip(group_vectors)
        .map(|(members, vector)| {
            // Shortest member text is the main query
            let main = members
                .iter()
                .min_by_key(|q| q.text.chars().count())
                .expect("groups are never empty");

            let mut query = (*main).clone();
            query.embedding = vector;
            query.synonyms = members
                .iter()
                .filter(|q| q.id != main.id)
                .map(|q| q.text.clone())
                .collect();
            query
        })
        .collect();

    let merged = QueryPool { queries };
    info!(merged_size = merged.len(), "semantic merge complete");
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_embedding(text: &str, embedding: Vec<f32>) -> Query {
        let mut q = Query::new(text);
        q.embedding = embedding;
        q
    }

    #[test]
    fn seeds_come_before_expansions() {
        let pool = build_pool(
            &["pipette calibration".into()],
            &["pipette maintenance".into()],
        );
        assert_eq!(pool.queries[0].text, "pipette calibration");
        assert_eq!(pool.queries[1].text, "pipette maintenance");
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let pool = build_pool(
            &["Pipette Tips".into()],
            &["pipette tips  ".into(), "pipette tips".into()],
        );
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.queries[0].text, "Pipette Tips");
    }

    #[test]
    fn dedup_is_idempotent() {
        let texts: Vec<String> = vec!["a".into(), "b".into(), "a".into()];
        let once = build_pool(&texts, &[]);
        let twice = build_pool(
            &once.queries.iter().map(|q| q.text.clone()).collect::<Vec<_>>(),
            &[],
        );
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn empty_and_blank_inputs_are_skipped() {
        let pool = build_pool(&["  ".into(), String::new()], &[]);
        assert!(pool.is_empty());
    }

    #[test]
    fn merge_groups_similar_queries() {
        let pool = QueryPool {
            queries: vec![
                with_embedding("micropipette calibration guide", vec![1.0, 0.0]),
                with_embedding("pipette calibration", vec![0.99, 0.05]),
                with_embedding("lab safety rules", vec![0.0, 1.0]),
            ],
        };

        let merged = merge_pool(&pool, 0.9);
        assert_eq!(merged.len(), 2);

        // Shortest member becomes the main query
        let main = &merged.queries[0];
        assert_eq!(main.text, "pipette calibration");
        assert_eq!(main.synonyms, vec!["micropipette calibration guide"]);

        assert_eq!(merged.queries[1].text, "lab safety rules");
        assert!(merged.queries[1].synonyms.is_empty());
    }

    #[test]
    fn merge_averages_group_vectors() {
        let pool = QueryPool {
            queries: vec![
                with_embedding("aa", vec![1.0, 0.0]),
                with_embedding("b", vec![1.0, 0.2]),
            ],
        };
        let merged = merge_pool(&pool, 0.5);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.queries[0].embedding, vec![1.0, 0.1]);
    }

    #[test]
    fn merge_without_embeddings_is_a_noop() {
        let pool = build_pool(&["a".into(), "b".into()], &[]);
        let merged = merge_pool(&pool, 0.9);
        assert_eq!(merged.len(), 2);
    }
}
