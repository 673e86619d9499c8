//! Shared types, errors, and configuration for Seoforge.
//!
//! Every other crate in the workspace depends on this one.

pub mod config;
pub mod embedding;
pub mod error;
pub mod types;

pub use config::{
    AppConfig, BlockSpec, Strategy, init_config, load_config, load_config_from, validate,
    validate_api_key,
};
pub use embedding::{centroid, cosine_similarity};
pub use error::{Result, SeoforgeError};
pub use types::{
    AggregatedInsight, BlockContent, BlockStatus, CompetitorSummary, ContentDepth, ContentGap,
    Degradation, GapType, ItemBudget, Lang, Outline, OutlineBlock, PaaQuestion, Query,
    QueryAnalysis, RunId, RunManifest, ScoredQuery, SignalSet, CURRENT_SCHEMA_VERSION,
};
