//! Signal collection for Seoforge.
//!
//! Fetches SERPs from the search provider, scores coverage / relevance /
//! density per query, and runs the whole pool under bounded concurrency
//! with per-call timeouts.

mod collector;
mod providers;
mod serp;

pub use collector::{CollectedSignals, SignalCollector};
pub use providers::{
    CoverageOutcome, CoverageProvider, RelevanceProvider, blend_relevance, coverage_score,
    density_scores, embedding_relevance,
};
pub use serp::{OrganicResult, SerpClient, SerpPayload, query_hash};
