//! Application configuration for Seoforge.
//!
//! User config lives at `~/.seoforge/seoforge.toml`.
//! CLI flags override config file values, which override defaults.
//!
//! Loaded config is validated once via [`validate`] before any pipeline stage
//! runs; invalid weights or incomplete block budgets abort the run up front.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeoforgeError};
use crate::types::ItemBudget;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "seoforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".seoforge";

/// Tolerance used when checking that weight groups sum to 1.0.
const WEIGHT_EPSILON: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Config structs (matching seoforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Topic seed settings.
    #[serde(default)]
    pub topic: TopicConfig,

    /// Scoring weights.
    #[serde(default)]
    pub weights: WeightsConfig,

    /// Query selection and aggregation settings.
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Search provider settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// LLM bridge subprocess settings.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Article template.
    #[serde(default)]
    pub article: ArticleConfig,
}

/// `[topic]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicConfig {
    /// The topic seed text.
    #[serde(default)]
    pub seed: String,

    /// Hand-written seed queries placed ahead of LLM expansions.
    #[serde(default)]
    pub base_seeds: Vec<String>,
}

/// `[weights]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightsConfig {
    /// Weight of the coverage signal in the final score.
    #[serde(default = "default_coverage_w")]
    pub coverage_w: f64,

    /// Weight of the relevance signal in the final score.
    #[serde(default = "default_relevance_w")]
    pub relevance_w: f64,

    /// Weight of the density signal in the final score.
    #[serde(default = "default_density_w")]
    pub density_w: f64,

    /// Embedding share of the relevance signal.
    #[serde(default = "default_embedding_weight")]
    pub embedding_weight: f64,

    /// LLM-judgment share of the relevance signal.
    #[serde(default = "default_llm_weight")]
    pub llm_weight: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            coverage_w: default_coverage_w(),
            relevance_w: default_relevance_w(),
            density_w: default_density_w(),
            embedding_weight: default_embedding_weight(),
            llm_weight: default_llm_weight(),
        }
    }
}

fn default_coverage_w() -> f64 {
    0.4
}
fn default_relevance_w() -> f64 {
    0.4
}
fn default_density_w() -> f64 {
    0.2
}
fn default_embedding_weight() -> f64 {
    0.6
}
fn default_llm_weight() -> f64 {
    0.4
}

/// Aggregation strategy for gap analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Aggregate gaps and questions across all selected queries.
    #[default]
    Aggregate,
    /// Use only the top-ranked query's analysis.
    SingleQuery,
}

/// `[selection]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// How many scored queries to carry into analysis.
    #[serde(default = "default_top_queries_limit")]
    pub top_queries_limit: usize,

    /// Aggregation strategy.
    #[serde(default)]
    pub strategy: Strategy,

    /// Cosine threshold above which two queries merge into one.
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: f64,

    /// Cosine threshold above which two PAA questions are duplicates.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Maximum PAA questions kept in the aggregated insight.
    #[serde(default = "default_max_paa")]
    pub max_paa: usize,

    /// Maximum content gaps kept in the aggregated insight.
    #[serde(default = "default_max_gaps")]
    pub max_gaps: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            top_queries_limit: default_top_queries_limit(),
            strategy: Strategy::default(),
            merge_threshold: default_merge_threshold(),
            similarity_threshold: default_similarity_threshold(),
            max_paa: default_max_paa(),
            max_gaps: default_max_gaps(),
        }
    }
}

fn default_top_queries_limit() -> usize {
    5
}
fn default_merge_threshold() -> f64 {
    0.92
}
fn default_similarity_threshold() -> f64 {
    0.85
}
fn default_max_paa() -> usize {
    15
}
fn default_max_gaps() -> usize {
    10
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Search API endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Maximum organic results requested per query.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum concurrent search requests.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            endpoint: default_endpoint(),
            max_results: default_max_results(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_api_key_env() -> String {
    "TAVILY_API_KEY".into()
}
fn default_endpoint() -> String {
    "https://api.tavily.com/search".into()
}
fn default_max_results() -> usize {
    10
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_concurrency() -> usize {
    4
}

/// `[bridge]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Command used to launch the bridge subprocess.
    #[serde(default = "default_bridge_cmd")]
    pub cmd: String,

    /// Script passed to the command.
    #[serde(default = "default_bridge_script")]
    pub script: String,

    /// Working directory for the subprocess, if any.
    #[serde(default)]
    pub working_dir: Option<String>,

    /// Model identifier forwarded to the bridge and used as a cache key.
    #[serde(default = "default_bridge_model")]
    pub model: String,

    /// Per-request timeout in seconds for bridge calls.
    #[serde(default = "default_bridge_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            cmd: default_bridge_cmd(),
            script: default_bridge_script(),
            working_dir: None,
            model: default_bridge_model(),
            timeout_secs: default_bridge_timeout_secs(),
        }
    }
}

fn default_bridge_cmd() -> String {
    "python3".into()
}
fn default_bridge_script() -> String {
    "bridge/seoforge_bridge.py".into()
}
fn default_bridge_model() -> String {
    "gpt-4o-mini".into()
}
fn default_bridge_timeout_secs() -> u64 {
    60
}

/// `[article]` section with `[[article.blocks]]` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleConfig {
    #[serde(default = "default_blocks")]
    pub blocks: Vec<BlockSpec>,
}

impl Default for ArticleConfig {
    fn default() -> Self {
        Self {
            blocks: default_blocks(),
        }
    }
}

/// One `[[article.blocks]]` entry: a template block with its budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSpec {
    /// Stable identifier, e.g. "faq".
    pub name: String,

    /// Display heading for the block.
    pub title: String,

    pub word_count_min: u32,
    pub word_count_max: u32,

    /// Whether the block holds enumerable items (FAQ-style).
    #[serde(default)]
    pub enumerable: bool,

    /// Required when `enumerable` is true; validated at load.
    #[serde(default)]
    pub item_count_min: Option<u32>,
    #[serde(default)]
    pub item_count_max: Option<u32>,
    #[serde(default)]
    pub per_item_word_max: Option<u32>,
}

impl BlockSpec {
    /// The complete item budget of an enumerable block.
    ///
    /// Only callable after [`validate`] has passed, which guarantees all
    /// three fields are present on enumerable blocks.
    pub fn item_budget(&self) -> Option<ItemBudget> {
        if !self.enumerable {
            return None;
        }
        Some(ItemBudget {
            item_count_min: self.item_count_min?,
            item_count_max: self.item_count_max?,
            per_item_word_max: self.per_item_word_max?,
        })
    }
}

fn default_blocks() -> Vec<BlockSpec> {
    vec![
        BlockSpec {
            name: "quick_summary".into(),
            title: "Quick Summary".into(),
            word_count_min: 100,
            word_count_max: 150,
            enumerable: false,
            item_count_min: None,
            item_count_max: None,
            per_item_word_max: None,
        },
        BlockSpec {
            name: "definition".into(),
            title: "What Is It".into(),
            word_count_min: 300,
            word_count_max: 400,
            enumerable: false,
            item_count_min: None,
            item_count_max: None,
            per_item_word_max: None,
        },
        BlockSpec {
            name: "uses".into(),
            title: "Uses and Applications".into(),
            word_count_min: 500,
            word_count_max: 600,
            enumerable: false,
            item_count_min: None,
            item_count_max: None,
            per_item_word_max: None,
        },
        BlockSpec {
            name: "faq".into(),
            title: "Frequently Asked Questions".into(),
            word_count_min: 600,
            word_count_max: 1000,
            enumerable: true,
            item_count_min: Some(10),
            item_count_max: Some(15),
            per_item_word_max: Some(80),
        },
    ]
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.seoforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SeoforgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.seoforge/seoforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SeoforgeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SeoforgeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SeoforgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SeoforgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SeoforgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a loaded config. Single entry point, called once before any
/// pipeline stage runs.
pub fn validate(config: &AppConfig) -> Result<()> {
    let w = &config.weights;

    let signal_sum = w.coverage_w + w.relevance_w + w.density_w;
    if (signal_sum - 1.0).abs() > WEIGHT_EPSILON {
        return Err(SeoforgeError::config(format!(
            "signal weights must sum to 1.0, got {signal_sum} \
             (coverage_w={}, relevance_w={}, density_w={})",
            w.coverage_w, w.relevance_w, w.density_w
        )));
    }

    let relevance_sum = w.embedding_weight + w.llm_weight;
    if (relevance_sum - 1.0).abs() > WEIGHT_EPSILON {
        return Err(SeoforgeError::config(format!(
            "relevance weights must sum to 1.0, got {relevance_sum} \
             (embedding_weight={}, llm_weight={})",
            w.embedding_weight, w.llm_weight
        )));
    }

    if config.selection.top_queries_limit == 0 {
        return Err(SeoforgeError::config("top_queries_limit must be at least 1"));
    }

    for block in &config.article.blocks {
        if block.word_count_min > block.word_count_max {
            return Err(SeoforgeError::config(format!(
                "block '{}': word_count_min {} exceeds word_count_max {}",
                block.name, block.word_count_min, block.word_count_max
            )));
        }

        if block.enumerable {
            let Some(budget) = block.item_budget() else {
                return Err(SeoforgeError::config(format!(
                    "enumerable block '{}' must set item_count_min, \
                     item_count_max, and per_item_word_max",
                    block.name
                )));
            };
            if budget.item_count_min > budget.item_count_max {
                return Err(SeoforgeError::config(format!(
                    "block '{}': item_count_min {} exceeds item_count_max {}",
                    block.name, budget.item_count_min, budget.item_count_max
                )));
            }
        }
    }

    Ok(())
}

/// Check that the search API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.search.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(SeoforgeError::config(format!(
            "search API key not found. Set the {var_name} environment variable."
        ))),
    }
}
