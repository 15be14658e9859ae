use super::render::{
    self, ANALYSIS_FILE, DOCUMENTATION_FILE, METADATA_FILE, STRUCTURE_FILE, SUMMARY_FILE,
    SummaryInput,
};
use super::sanitizer::{Sanitized, sanitize_file};
use super::tokens::TokenCounter;
use super::walker::{RepoFile, RepoWalker, WalkStats};
use crate::analyzer::{ProjectAnalysis, ProjectAnalyzer, repo_name};
use crate::config::Config;

use anyhow::{Context, Result};
use log::{debug, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for one conversion
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    pub max_file_size: u64,
    /// Split threshold for the codebase bundle, `None` for a single file
    pub max_bundle_size: Option<usize>,
    pub include_docs: bool,
    pub sanitize: bool,
    pub count_tokens: bool,
    /// Also write the full analysis as `analysis.json`
    pub write_analysis: bool,
}

impl ConvertOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_file_size: config.max_file_size_bytes(),
            max_bundle_size: config.max_bundle_size_bytes(),
            include_docs: config.include_docs,
            sanitize: config.sanitize,
            count_tokens: config.count_tokens,
            write_analysis: false,
        }
    }
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Counters for a conversion run
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertStats {
    pub files_seen: usize,
    pub files_excluded: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub skipped_size: usize,
    pub skipped_binary: usize,
    pub skipped_unreadable: usize,
    /// Documentation files left out because docs were disabled
    pub docs_dropped: usize,
    pub bytes_total: u64,
    pub bytes_skipped: u64,
    pub redactions: BTreeMap<String, usize>,
    pub redaction_total: usize,
    /// Estimated tokens per generated bundle file
    pub tokens: BTreeMap<String, usize>,
    pub started_at: String,
    pub finished_at: String,
}

impl ConvertStats {
    fn from_walk(walk: &WalkStats) -> Self {
        Self {
            files_seen: walk.files_seen,
            files_excluded: walk.files_excluded,
            files_skipped: walk.skipped(),
            skipped_size: walk.skipped_size,
            skipped_binary: walk.skipped_binary,
            skipped_unreadable: walk.skipped_unreadable,
            bytes_total: walk.bytes_total,
            bytes_skipped: walk.bytes_skipped,
            ..Self::default()
        }
    }
}

/// What a conversion produced
#[derive(Debug, Clone)]
pub struct ConvertOutcome {
    pub output_dir: PathBuf,
    /// Written files in generation order
    pub files: Vec<PathBuf>,
    pub analysis: ProjectAnalysis,
    pub stats: ConvertStats,
}

#[derive(Serialize)]
struct Metadata<'a> {
    repo_path: String,
    generated_at: &'a str,
    analysis: &'a ProjectAnalysis,
    stats: &'a ConvertStats,
    config: &'a ConvertOptions,
    files: &'a [RepoFile],
}

/// Turns a repository into LLM-ready text bundles
pub struct RepositoryConverter {
    repo_path: PathBuf,
    output_dir: PathBuf,
    options: ConvertOptions,
}

impl RepositoryConverter {
    pub fn new(repo_path: &Path, output_dir: &Path, options: ConvertOptions) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            options,
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Walk, sanitize, analyze and render; file IO runs off the async runtime
    pub async fn convert(&self) -> Result<ConvertOutcome> {
        let repo_path = self.repo_path.clone();
        let output_dir = self.output_dir.clone();
        let options = self.options.clone();

        tokio::task::spawn_blocking(move || convert_blocking(&repo_path, &output_dir, &options))
            .await
            .context("Conversion task failed")?
    }
}

fn convert_blocking(
    repo_path: &Path,
    output_dir: &Path,
    options: &ConvertOptions,
) -> Result<ConvertOutcome> {
    let started_at = chrono::Local::now().to_rfc3339();
    if !repo_path.is_dir() {
        anyhow::bail!("Repository path does not exist: {}", repo_path.display());
    }

    let walker = RepoWalker::new(repo_path, options.max_file_size)?.skip_dir(output_dir);
    let (mut files, walk_stats) = walker.walk()?;
    let mut stats = ConvertStats::from_walk(&walk_stats);
    stats.started_at = started_at;

    if options.sanitize {
        let results: Vec<Sanitized> = files
            .par_iter()
            .map(|file| sanitize_file(&file.path, &file.content))
            .collect();
        for (file, sanitized) in files.iter_mut().zip(results) {
            for (label, count) in &sanitized.redactions {
                *stats.redactions.entry((*label).to_string()).or_default() += count;
            }
            stats.redaction_total += sanitized.total();
            file.content = sanitized.content;
        }
        debug!("Sanitizer redacted {} values", stats.redaction_total);
    }

    let paths: Vec<String> = files.iter().map(|f| f.path.clone()).collect();
    let analysis = ProjectAnalyzer::new(repo_path).analyze(&paths);
    let name = repo_name(repo_path);

    let (docs, code): (Vec<&RepoFile>, Vec<&RepoFile>) =
        files.iter().partition(|f| f.is_documentation);
    if !options.include_docs {
        stats.docs_dropped = docs.len();
    }
    stats.files_processed = code.len() + if options.include_docs { docs.len() } else { 0 };

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let included: Vec<RepoFile> = files
        .iter()
        .filter(|f| options.include_docs || !f.is_documentation)
        .cloned()
        .collect();
    let mut outputs: Vec<(String, String)> = Vec::new();
    outputs.push((STRUCTURE_FILE.to_string(), render::render_structure(&name, &included)));
    for part in render::render_codebase(&name, &analysis, &code, options.max_bundle_size) {
        outputs.push((part.file_name, part.content));
    }
    if options.include_docs {
        outputs.push((DOCUMENTATION_FILE.to_string(), render::render_documentation(&docs)));
    }

    if options.count_tokens {
        match TokenCounter::new() {
            Ok(counter) => {
                stats.tokens = outputs
                    .par_iter()
                    .filter(|(file, _)| file != STRUCTURE_FILE)
                    .map(|(file, content)| (file.clone(), counter.count(content)))
                    .collect();
            }
            Err(e) => warn!("Token counting disabled: {e}"),
        }
    }

    for (file, content) in &outputs {
        write_output(output_dir, file, content)?;
    }

    let mut generated: Vec<String> = outputs.into_iter().map(|(file, _)| file).collect();
    let generated_at = chrono::Local::now().to_rfc3339();
    stats.finished_at.clone_from(&generated_at);

    let repo_display = repo_path
        .canonicalize()
        .unwrap_or_else(|_| repo_path.to_path_buf())
        .display()
        .to_string();

    let metadata = Metadata {
        repo_path: repo_display.clone(),
        generated_at: &generated_at,
        analysis: &analysis,
        stats: &stats,
        config: options,
        files: &included,
    };
    let metadata_json =
        serde_json::to_string_pretty(&metadata).context("Failed to serialize metadata")?;
    write_output(output_dir, METADATA_FILE, &metadata_json)?;
    generated.push(METADATA_FILE.to_string());

    if options.write_analysis {
        let analysis_json =
            serde_json::to_string_pretty(&analysis).context("Failed to serialize analysis")?;
        write_output(output_dir, ANALYSIS_FILE, &analysis_json)?;
        generated.push(ANALYSIS_FILE.to_string());
    }

    generated.push(SUMMARY_FILE.to_string());
    let summary = render::render_summary(&SummaryInput {
        repo_name: &name,
        repo_path: &repo_display,
        generated_at: &generated_at,
        analysis: &analysis,
        stats: &stats,
        generated_files: &generated,
    });
    write_output(output_dir, SUMMARY_FILE, &summary)?;

    debug!(
        "Converted {} into {} files under {}",
        repo_path.display(),
        generated.len(),
        output_dir.display()
    );

    Ok(ConvertOutcome {
        output_dir: output_dir.to_path_buf(),
        files: generated.iter().map(|f| output_dir.join(f)).collect(),
        analysis,
        stats,
    })
}

fn write_output(dir: &Path, file: &str, content: &str) -> Result<()> {
    let path = dir.join(file);
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
}
