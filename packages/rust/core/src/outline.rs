//! Outline assembly against the article block template.

use seoforge_shared::config::BlockSpec;
use seoforge_shared::{
    AggregatedInsight, BlockContent, BlockStatus, Degradation, Outline, OutlineBlock,
};
use tracing::{info, instrument, warn};

/// Assemble the article outline from the aggregated insight.
///
/// The output has one block per template entry, in template order. Enumerable
/// blocks receive PAA questions in rank order up to their `item_count_max`;
/// when fewer than `item_count_min` are available the block keeps exactly
/// what exists and is flagged `Underfilled` (recorded as a degradation),
/// never padded and never an error. Prose blocks carry the top gap actions
/// as talking points.
#[instrument(skip_all, fields(blocks = template.len(), paa = insight.paa_questions.len()))]
pub fn assemble(
    topic: &str,
    insight: &AggregatedInsight,
    template: &[BlockSpec],
) -> (Outline, Vec<Degradation>) {
    let mut blocks = Vec::with_capacity(template.len());
    let mut degradations = Vec::new();

    // Enumerable blocks consume the ranked PAA list in template order
    let mut next_paa = 0usize;

    for spec in template {
        let (content, status) = match spec.item_budget() {
            Some(budget) => {
                let available = &insight.paa_questions[next_paa..];
                let take = available.len().min(budget.item_count_max as usize);
                let items: Vec<String> =
                    available[..take].iter().map(|q| q.text.clone()).collect();
                next_paa += take;

                let status = if (items.len() as u32) < budget.item_count_min {
                    warn!(
                        block = %spec.name,
                        available = items.len(),
                        min = budget.item_count_min,
                        "not enough items to fill block"
                    );
                    degradations.push(Degradation {
                        subject: spec.name.clone(),
                        reason: format!(
                            "only {} of {} minimum items available",
                            items.len(),
                            budget.item_count_min
                        ),
                    });
                    BlockStatus::Underfilled
                } else {
                    BlockStatus::Filled
                };

                (BlockContent::Enumerable { budget, items }, status)
            }
            None => {
                let must_include: Vec<String> = insight
                    .gaps
                    .iter()
                    .map(|g| g.recommended_action.clone())
                    .collect();
                (BlockContent::Prose { must_include }, BlockStatus::Filled)
            }
        };

        blocks.push(OutlineBlock {
            name: spec.name.clone(),
            title: spec.title.clone(),
            word_count_min: spec.word_count_min,
            word_count_max: spec.word_count_max,
            content,
            status,
        });
    }

    info!(
        blocks = blocks.len(),
        underfilled = degradations.len(),
        "outline assembled"
    );

    (
        Outline {
            topic: topic.to_string(),
            blocks,
        },
        degradations,
    )
}
