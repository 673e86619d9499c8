//! Aggregation of per-query analyses into a single content strategy.

use seoforge_shared::config::{SelectionConfig, Strategy};
use seoforge_shared::embedding::cosine_similarity;
use seoforge_shared::{AggregatedInsight, PaaQuestion, QueryAnalysis};
use tracing::{debug, info, instrument};

/// Aggregate per-query analyses into one insight.
///
/// Input must be in rank order (rank 1 first); PAA dedup gives earlier
/// entries precedence. An empty input yields an empty insight.
///
/// With `Strategy::SingleQuery` only the top-ranked analysis contributes.
#[instrument(skip_all, fields(analyses = analyses.len(), strategy = ?config.strategy))]
pub fn aggregate(analyses: &[QueryAnalysis], config: &SelectionConfig) -> AggregatedInsight {
    let effective: &[QueryAnalysis] = match config.strategy {
        Strategy::Aggregate => analyses,
        Strategy::SingleQuery => &analyses[..analyses.len().min(1)],
    };

    if effective.is_empty() {
        return AggregatedInsight::default();
    }

    let paa_questions = dedup_paa(effective, config.similarity_threshold, config.max_paa);

    // Gaps concatenate across queries without semantic dedup; a gap repeated
    // by several queries simply ranks by its best occurrence.
    let mut gaps: Vec<_> = effective.iter().flat_map(|a| a.gaps.clone()).collect();
    gaps.sort_by(|a, b| {
        b.opportunity_score
            .partial_cmp(&a.opportunity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    gaps.truncate(config.max_gaps);

    info!(
        paa = paa_questions.len(),
        gaps = gaps.len(),
        "aggregation complete"
    );

    AggregatedInsight {
        paa_questions,
        gaps,
    }
}

/// Greedy semantic dedup of PAA questions across queries.
///
/// Questions are visited in rank order; each one is compared against the
/// already-kept list and counts as a duplicate above `threshold`, which
/// increments the kept question's recurrence. The survivors rank by
/// recurrence descending, then source rank ascending.
fn dedup_paa(analyses: &[QueryAnalysis], threshold: f64, max_paa: usize) -> Vec<PaaQuestion> {
    let mut kept: Vec<PaaQuestion> = Vec::new();

    for analysis in analyses {
        for question in &analysis.paa_questions {
            let duplicate_of = kept.iter_mut().find(|k| {
                cosine_similarity(&k.embedding, &question.embedding) > threshold
                    || k.text == question.text
            });

            match duplicate_of {
                Some(existing) => {
                    debug!(
                        duplicate = %question.text,
                        kept = %existing.text,
                        "merging recurring question"
                    );
                    existing.recurrence += 1;
                }
                None => kept.push(question.clone()),
            }
        }
    }

    kept.sort_by(|a, b| {
        b.recurrence
            .cmp(&a.recurrence)
            .then(a.source_rank.cmp(&b.source_rank))
    });
    kept.truncate(max_paa);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use seoforge_shared::{ContentGap, GapType};

    fn question(text: &str, embedding: Vec<f32>, source_rank: u32) -> PaaQuestion {
        PaaQuestion {
            text: text.into(),
            embedding,
            source_rank,
            recurrence: 1,
        }
    }

    fn gap(description: &str, opportunity_score: f64) -> ContentGap {
        ContentGap {
            gap_type: GapType::Coverage,
            description: description.into(),
            opportunity_score,
            recommended_action: "cover it".into(),
        }
    }

    fn analysis(rank: u32, paa: Vec<PaaQuestion>, gaps: Vec<ContentGap>) -> QueryAnalysis {
        QueryAnalysis {
            query_text: format!("query {rank}"),
            rank,
            competitors: vec![],
            gaps,
            paa_questions: paa,
            has_ai_overview: false,
        }
    }

    #[test]
    fn empty_input_yields_empty_insight() {
        let insight = aggregate(&[], &SelectionConfig::default());
        assert!(insight.paa_questions.is_empty());
        assert!(insight.gaps.is_empty());
    }

    #[test]
    fn higher_ranked_duplicate_wins() {
        let analyses = vec![
            analysis(
                1,
                vec![question("how to calibrate a pipette?", vec![1.0, 0.0], 1)],
                vec![],
            ),
            analysis(2, vec![], vec![]),
            analysis(
                3,
                vec![question("pipette calibration how-to?", vec![0.99, 0.05], 3)],
                vec![],
            ),
        ];

        let insight = aggregate(&analyses, &SelectionConfig::default());
        assert_eq!(insight.paa_questions.len(), 1);
        // The rank-1 phrasing survives with bumped recurrence
        assert_eq!(insight.paa_questions[0].text, "how to calibrate a pipette?");
        assert_eq!(insight.paa_questions[0].source_rank, 1);
        assert_eq!(insight.paa_questions[0].recurrence, 2);
    }

    #[test]
    fn recurring_questions_rank_above_singletons() {
        let analyses = vec![
            analysis(
                1,
                vec![
                    question("unique question?", vec![0.0, 1.0], 1),
                    question("common question?", vec![1.0, 0.0], 1),
                ],
                vec![],
            ),
            analysis(
                2,
                vec![question("common question again?", vec![0.98, 0.1], 2)],
                vec![],
            ),
        ];

        let insight = aggregate(&analyses, &SelectionConfig::default());
        assert_eq!(insight.paa_questions.len(), 2);
        assert_eq!(insight.paa_questions[0].text, "common question?");
        assert_eq!(insight.paa_questions[0].recurrence, 2);
        assert_eq!(insight.paa_questions[1].text, "unique question?");
    }

    #[test]
    fn dedup_is_idempotent() {
        let analyses = vec![
            analysis(
                1,
                vec![
                    question("common question?", vec![1.0, 0.0], 1),
                    question("unique question?", vec![0.0, 1.0], 1),
                ],
                vec![],
            ),
            analysis(
                2,
                vec![question("common question again?", vec![0.98, 0.1], 2)],
                vec![],
            ),
        ];

        let config = SelectionConfig::default();
        let first = aggregate(&analyses, &config);

        // Feeding the deduplicated list back through changes nothing: same
        // survivors, same recurrence counts, same order
        let again = vec![analysis(1, first.paa_questions.clone(), vec![])];
        let second = aggregate(&again, &config);
        assert_eq!(second.paa_questions, first.paa_questions);
    }

    #[test]
    fn paa_truncates_to_max() {
        let paa: Vec<PaaQuestion> = (0..30)
            .map(|i| {
                // Orthogonal-ish vectors so nothing merges
                let mut v = vec![0.0f32; 30];
                v[i] = 1.0;
                question(&format!("q{i}?"), v, 1)
            })
            .collect();
        let analyses = vec![analysis(1, paa, vec![])];

        let config = SelectionConfig {
            max_paa: 15,
            ..Default::default()
        };
        let insight = aggregate(&analyses, &config);
        assert_eq!(insight.paa_questions.len(), 15);
    }

    #[test]
    fn gaps_sort_by_opportunity_and_truncate() {
        let analyses = vec![
            analysis(1, vec![], vec![gap("low", 0.3), gap("high", 0.9)]),
            analysis(2, vec![], vec![gap("mid", 0.6)]),
        ];

        let config = SelectionConfig {
            max_gaps: 2,
            ..Default::default()
        };
        let insight = aggregate(&analyses, &config);
        assert_eq!(insight.gaps.len(), 2);
        assert_eq!(insight.gaps[0].description, "high");
        assert_eq!(insight.gaps[1].description, "mid");
    }

    #[test]
    fn single_query_strategy_uses_only_top_analysis() {
        let analyses = vec![
            analysis(1, vec![question("from top?", vec![1.0, 0.0], 1)], vec![gap("g1", 0.5)]),
            analysis(2, vec![question("from second?", vec![0.0, 1.0], 2)], vec![gap("g2", 0.9)]),
        ];

        let config = SelectionConfig {
            strategy: Strategy::SingleQuery,
            ..Default::default()
        };
        let insight = aggregate(&analyses, &config);
        assert_eq!(insight.paa_questions.len(), 1);
        assert_eq!(insight.paa_questions[0].text, "from top?");
        assert_eq!(insight.gaps.len(), 1);
        assert_eq!(insight.gaps[0].description, "g1");
    }
}
