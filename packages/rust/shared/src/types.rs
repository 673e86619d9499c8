//! Core domain types shared across all Seoforge crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema version written into every run manifest.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// Unique identifier for a pipeline run (UUID v7, time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Language of a query, detected from its codepoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lang {
    /// Traditional Chinese (contains CJK unified ideographs).
    ZhTw,
    /// English / Latin-script.
    En,
}

/// A candidate search query in the pool.
///
/// Unique by normalized text. Immutable once scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: Uuid,
    pub text: String,
    pub lang: Lang,
    /// Embedding vector, empty until the bridge computes it.
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Texts of merged near-duplicate queries.
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let lang = detect_lang(&text);
        Self {
            id: Uuid::now_v7(),
            text,
            lang,
            embedding: Vec::new(),
            synonyms: Vec::new(),
        }
    }
}

/// Detect the language of a query from its codepoints.
///
/// Any CJK unified ideograph marks the query as Traditional Chinese.
pub fn detect_lang(text: &str) -> Lang {
    if text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c)) {
        Lang::ZhTw
    } else {
        Lang::En
    }
}

/// Normalize query text for dedup: trim whitespace, lowercase ASCII.
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Signals and scoring
// ---------------------------------------------------------------------------

/// The three collected signals for one query, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSet {
    pub coverage: f64,
    pub relevance: f64,
    pub density: f64,
}

/// A query together with its signals and weighted final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredQuery {
    pub query: Query,
    pub signals: SignalSet,
    pub final_score: f64,
}

// ---------------------------------------------------------------------------
// SERP analysis
// ---------------------------------------------------------------------------

/// How thoroughly a competitor page covers the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentDepth {
    Shallow,
    Medium,
    Deep,
}

/// Summary of one competitor result on the SERP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorSummary {
    /// 1-based SERP position.
    pub position: u32,
    pub domain: String,
    pub key_points: Vec<String>,
    pub content_depth: ContentDepth,
    pub unique_value: String,
}

/// Category of a detected content gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapType {
    /// AI overview present but incomplete.
    Aiseo,
    /// People-Also-Ask question nobody answers well.
    Paa,
    /// All competitors cover the topic shallowly.
    Depth,
    /// Subtopic missing from every competitor.
    Coverage,
}

/// One content opportunity detected for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentGap {
    pub gap_type: GapType,
    pub description: String,
    /// In `[0, 1]`, higher is more valuable.
    pub opportunity_score: f64,
    pub recommended_action: String,
}

/// A People-Also-Ask question harvested from a SERP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaaQuestion {
    pub text: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Rank of the query this question came from (1 = top scored query).
    pub source_rank: u32,
    /// How many queries surfaced a near-duplicate of this question.
    pub recurrence: u32,
}

/// Full analysis of one scored query's SERP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub query_text: String,
    /// Rank of the query in the scored list (1-based).
    pub rank: u32,
    pub competitors: Vec<CompetitorSummary>,
    pub gaps: Vec<ContentGap>,
    pub paa_questions: Vec<PaaQuestion>,
    pub has_ai_overview: bool,
}

/// Aggregated, deduplicated insight across all analyzed queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedInsight {
    pub paa_questions: Vec<PaaQuestion>,
    pub gaps: Vec<ContentGap>,
}

// ---------------------------------------------------------------------------
// Outline
// ---------------------------------------------------------------------------

/// Per-item budget for an enumerable block.
///
/// All three fields are mandatory so that item counts can never be silently
/// defaulted downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemBudget {
    pub item_count_min: u32,
    pub item_count_max: u32,
    pub per_item_word_max: u32,
}

/// Content shape of an article block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockContent {
    /// Continuous prose with optional talking points to include.
    Prose {
        #[serde(default)]
        must_include: Vec<String>,
    },
    /// Enumerable content (e.g. an FAQ) with a hard item budget.
    Enumerable {
        budget: ItemBudget,
        #[serde(default)]
        items: Vec<String>,
    },
}

/// Fill status of an assembled block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Filled,
    /// Fewer items were available than the block's minimum.
    Underfilled,
}

/// One assembled block of the article outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineBlock {
    pub name: String,
    pub title: String,
    pub word_count_min: u32,
    pub word_count_max: u32,
    pub content: BlockContent,
    pub status: BlockStatus,
}

/// The final article outline: one block per template entry, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    pub topic: String,
    pub blocks: Vec<OutlineBlock>,
}

// ---------------------------------------------------------------------------
// Run manifest
// ---------------------------------------------------------------------------

/// A recorded partial failure that did not abort the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Degradation {
    /// What degraded: a query text or a block name.
    pub subject: String,
    pub reason: String,
}

/// Top-level manifest describing a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: RunId,
    pub topic: String,
    /// Optional human-readable label for the run.
    #[serde(default)]
    pub name: Option<String>,
    pub tool_version: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pool_size: usize,
    pub merged_pool_size: usize,
    pub scored_count: usize,
    pub analyzed_count: usize,
    #[serde(default)]
    pub degradations: Vec<Degradation>,
}

impl RunManifest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            run_id: RunId::new(),
            topic: topic.into(),
            name: None,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            completed_at: None,
            pool_size: 0,
            merged_pool_size: 0,
            scored_count: 0,
            analyzed_count: 0,
            degradations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn run_ids_are_time_sortable() {
        let a = RunId::new();
        let b = RunId::new();
        assert!(a.0 <= b.0);
    }

    #[test]
    fn lang_detection() {
        assert_eq!(detect_lang("微量吸管 校正"), Lang::ZhTw);
        assert_eq!(detect_lang("micropipette calibration"), Lang::En);
        assert_eq!(detect_lang("pipette 吸管"), Lang::ZhTw);
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_text("  Micropipette Tips "), "micropipette tips");
        assert_eq!(normalize_text("微量吸管"), "微量吸管");
    }

    #[test]
    fn block_content_serde_shape() {
        let block = BlockContent::Enumerable {
            budget: ItemBudget {
                item_count_min: 10,
                item_count_max: 15,
                per_item_word_max: 80,
            },
            items: vec!["q1".into()],
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["kind"], "enumerable");
        assert_eq!(json["budget"]["item_count_min"], 10);

        let back: BlockContent = serde_json::from_value(json).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn manifest_serde_roundtrip() {
        let mut manifest = RunManifest::new("lab pipettes");
        manifest.degradations.push(Degradation {
            subject: "pipette storage".into(),
            reason: "signal timeout".into(),
        });
        let json = serde_json::to_string(&manifest).unwrap();
        let back: RunManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, manifest);
        assert_eq!(back.schema_version, CURRENT_SCHEMA_VERSION);
    }
}
