//! Strategy directory writer.
//!
//! Writes the final run output to disk:
//! ```text
//! <output_root>/<run_id>/
//! ├── manifest.json
//! ├── scored_queries.csv
//! ├── insight.json
//! └── outline.json
//! ```
//! All files are written atomically (temp file + rename) so a crashed run
//! never leaves a half-written artifact behind.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use seoforge_shared::{
    AggregatedInsight, CURRENT_SCHEMA_VERSION, Lang, Outline, Result, RunManifest, ScoredQuery,
    SeoforgeError,
};

/// Output from a successful report write.
#[derive(Debug, Clone)]
pub struct ReportResult {
    /// Absolute path to the run directory.
    pub run_path: PathBuf,
}

/// Write the complete strategy directory for a run.
#[instrument(skip_all, fields(run_id = %manifest.run_id, scored = scored.len()))]
pub fn write_report(
    output_root: &Path,
    manifest: &RunManifest,
    scored: &[ScoredQuery],
    insight: &AggregatedInsight,
    outline: &Outline,
) -> Result<ReportResult> {
    let run_dir = output_root.join(manifest.run_id.to_string());
    std::fs::create_dir_all(&run_dir).map_err(|e| SeoforgeError::io(&run_dir, e))?;

    info!(path = %run_dir.display(), "writing strategy directory");

    write_json(&run_dir.join("manifest.json"), manifest)?;
    write_csv(&run_dir.join("scored_queries.csv"), scored)?;
    write_json(&run_dir.join("insight.json"), insight)?;
    write_json(&run_dir.join("outline.json"), outline)?;

    Ok(ReportResult { run_path: run_dir })
}

/// Verify that a run directory is well-formed.
pub fn validate_run(run_path: &Path) -> Result<()> {
    for required in ["manifest.json", "scored_queries.csv", "insight.json", "outline.json"] {
        if !run_path.join(required).exists() {
            return Err(SeoforgeError::validation(format!("missing {required}")));
        }
    }

    let manifest_path = run_path.join("manifest.json");
    let content = std::fs::read_to_string(&manifest_path)
        .map_err(|e| SeoforgeError::io(&manifest_path, e))?;
    let manifest: RunManifest = serde_json::from_str(&content)
        .map_err(|e| SeoforgeError::validation(format!("invalid manifest.json: {e}")))?;

    if manifest.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(SeoforgeError::validation(format!(
            "unsupported schema_version: {} (expected {})",
            manifest.schema_version, CURRENT_SCHEMA_VERSION
        )));
    }

    let outline_path = run_path.join("outline.json");
    let content = std::fs::read_to_string(&outline_path)
        .map_err(|e| SeoforgeError::io(&outline_path, e))?;
    let _: Outline = serde_json::from_str(&content)
        .map_err(|e| SeoforgeError::validation(format!("invalid outline.json: {e}")))?;

    Ok(())
}

/// Rewrite the scored-query table of an existing run (after re-scoring).
pub fn update_scored_csv(run_path: &Path, scored: &[ScoredQuery]) -> Result<()> {
    write_csv(&run_path.join("scored_queries.csv"), scored)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Write a JSON file (pretty-printed) atomically.
fn write_json<T: serde::Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| SeoforgeError::validation(format!("JSON serialization failed: {e}")))?;
    write_atomic(path, json.as_bytes())
}

/// Write the flat scored-query table atomically.
fn write_csv(path: &Path, scored: &[ScoredQuery]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(["query", "lang", "coverage", "relevance", "density", "score"])
        .map_err(|e| SeoforgeError::validation(format!("CSV write failed: {e}")))?;

    for sq in scored {
        let lang = match sq.query.lang {
            Lang::ZhTw => "zh_tw",
            Lang::En => "en",
        };
        writer
            .write_record([
                sq.query.text.as_str(),
                lang,
                &format!("{:.4}", sq.signals.coverage),
                &format!("{:.4}", sq.signals.relevance),
                &format!("{:.4}", sq.signals.density),
                &format!("{:.4}", sq.final_score),
            ])
            .map_err(|e| SeoforgeError::validation(format!("CSV write failed: {e}")))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| SeoforgeError::validation(format!("CSV flush failed: {e}")))?;
    write_atomic(path, &bytes)
}

/// Write bytes to a temp file in the same directory, then rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SeoforgeError::validation(format!("bad artifact path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| SeoforgeError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| SeoforgeError::io(path, e))?;

    debug!(path = %path.display(), size = bytes.len(), "wrote artifact");
    Ok(())
}
