//! Repository walking: which files go into a bundle and how they are read

use crate::analyzer::language;

use anyhow::{Context, Result, bail};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use log::debug;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// File name patterns that are never bundled
pub const EXCLUDED_FILES: &[&str] = &[
    "*.pyc", "*.pyo", "*.pyd", "*.so", "*.dll", "*.dylib", "*.class", "*.jar", "*.war", "*.ear",
    "*.bin", "*.exe", "*.o", "*.a", "*.jpg", "*.jpeg", "*.png", "*.gif", "*.bmp", "*.ico",
    "*.svg", "*.pdf", "*.doc", "*.docx", "*.xls", "*.xlsx", "*.ppt", "*.pptx", "*.zip",
    "*.tar", "*.gz", "*.rar", "*.7z", "*.bz2", "*.log", "*.tmp", "*.temp", "*.swp", "*.swo",
];

/// Directory name patterns whose contents are never bundled
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    "*.egg-info",
    "*.dist-info",
    "build",
    "dist",
    "target",
    "venv",
    ".venv",
    "env",
    ".env",
    ".idea",
    ".vscode",
];

/// File name patterns that are included without sniffing their content
const SOURCE_FILES: &[&str] = &[
    "*.py", "*.js", "*.ts", "*.jsx", "*.tsx", "*.java", "*.cpp", "*.c", "*.h", "*.go", "*.rs",
    "*.php", "*.rb", "*.swift", "*.kt", "*.scala", "*.sh", "*.bash", "*.sql", "*.html", "*.css",
    "*.scss", "*.sass", "*.json", "*.xml", "*.yaml", "*.yml", "*.toml", "*.ini", "*.cfg",
    "*.conf", "Dockerfile", "docker-compose*.yml", "*.dockerfile", "Makefile", "CMakeLists.txt",
    "*.mk", "*.md", "*.txt", "*.rst", "*.tex",
];

const WELL_KNOWN_DOCS: &[&str] = &[
    "readme",
    "readme.md",
    "readme.txt",
    "license",
    "license.txt",
    "license.md",
    "contributing.md",
    "changelog.md",
];

const SNIFF_LEN: usize = 1024;

/// A file selected for a bundle, with its content
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    /// Relative path with forward slashes
    pub path: String,
    #[serde(skip)]
    pub content: String,
    pub size: u64,
    pub file_type: String,
    pub is_documentation: bool,
}

/// Counts gathered while walking and reading
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Files looked at after directory exclusions
    pub files_seen: usize,
    pub files_excluded: usize,
    pub skipped_size: usize,
    pub skipped_binary: usize,
    pub skipped_unreadable: usize,
    /// Bytes of every file that passed the exclusion patterns
    pub bytes_total: u64,
    /// Bytes of files skipped for size
    pub bytes_skipped: u64,
}

impl WalkStats {
    pub fn skipped(&self) -> usize {
        self.skipped_size + self.skipped_binary + self.skipped_unreadable
    }
}

struct Candidate {
    path: PathBuf,
    relative: String,
    size: u64,
}

/// Walks a repository honoring `.gitignore` and the bundle exclusions
pub struct RepoWalker {
    root: PathBuf,
    max_file_size: u64,
    excluded_files: GlobSet,
    excluded_dirs: GlobSet,
    source_files: GlobSet,
    skipped_dirs: Vec<PathBuf>,
}

fn build_set(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob =
            Glob::new(pattern).with_context(|| format!("Invalid glob pattern '{pattern}'"))?;
        builder.add(glob);
    }
    builder.build().context("Failed to compile glob set")
}

impl RepoWalker {
    pub fn new(root: &Path, max_file_size: u64) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            max_file_size,
            excluded_files: build_set(EXCLUDED_FILES)?,
            excluded_dirs: build_set(EXCLUDED_DIRS)?,
            source_files: build_set(SOURCE_FILES)?,
            skipped_dirs: Vec::new(),
        })
    }

    /// Leave out `dir` when it lies inside the root, e.g. an earlier bundle.
    /// A directory that does not exist yet has nothing to leave out.
    #[must_use]
    pub fn skip_dir(mut self, dir: &Path) -> Self {
        if let (Ok(root), Ok(dir)) = (self.root.canonicalize(), dir.canonicalize())
            && let Ok(relative) = dir.strip_prefix(&root)
            && !relative.as_os_str().is_empty()
        {
            debug!("Leaving {} out of the walk", relative.display());
            self.skipped_dirs.push(self.root.join(relative));
        }
        self
    }

    /// Walk and read every eligible file, sorted by path
    pub fn walk(&self) -> Result<(Vec<RepoFile>, WalkStats)> {
        let (candidates, mut stats) = self.collect_candidates()?;

        let read: Vec<Option<RepoFile>> = candidates
            .par_iter()
            .map(|candidate| match read_text(&candidate.path) {
                Ok(content) => Some(RepoFile {
                    path: candidate.relative.clone(),
                    content,
                    size: candidate.size,
                    file_type: language::file_type_for(&candidate.path).to_string(),
                    is_documentation: language::is_documentation(&candidate.path),
                }),
                Err(e) => {
                    debug!("Error reading {}: {e}", candidate.path.display());
                    None
                }
            })
            .collect();

        let mut files = Vec::with_capacity(read.len());
        for file in read {
            match file {
                Some(file) => files.push(file),
                None => stats.skipped_unreadable += 1,
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(
            "Walk of {} selected {} files ({} skipped)",
            self.root.display(),
            files.len(),
            stats.skipped()
        );
        Ok((files, stats))
    }

    /// Relative paths of the files a walk would bundle, without reading them
    pub fn list(&self) -> Result<Vec<String>> {
        let (candidates, _) = self.collect_candidates()?;
        let mut paths: Vec<String> = candidates.into_iter().map(|c| c.relative).collect();
        paths.sort();
        Ok(paths)
    }

    fn collect_candidates(&self) -> Result<(Vec<Candidate>, WalkStats)> {
        if !self.root.is_dir() {
            bail!("Repository path is not a directory: {}", self.root.display());
        }

        let excluded_dirs = self.excluded_dirs.clone();
        let skipped_dirs = self.skipped_dirs.clone();
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(true)
            .hidden(false)
            .require_git(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                if !is_dir || entry.depth() == 0 {
                    return true;
                }
                !excluded_dirs.is_match(entry.file_name())
                    && !skipped_dirs.iter().any(|dir| entry.path() == dir)
            })
            .build();

        let mut stats = WalkStats::default();
        let mut candidates = Vec::new();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {e}");
                    stats.skipped_unreadable += 1;
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let path = entry.path();
            let relative = relative_path(&self.root, path);
            stats.files_seen += 1;

            let name = entry.file_name();
            if self.excluded_files.is_match(name) || self.excluded_files.is_match(&relative) {
                stats.files_excluded += 1;
                continue;
            }

            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    debug!("Cannot stat {}: {e}", path.display());
                    stats.skipped_unreadable += 1;
                    continue;
                }
            };
            stats.bytes_total += size;
            if size > self.max_file_size {
                debug!("Skipping large file: {relative} ({size} bytes)");
                stats.skipped_size += 1;
                stats.bytes_skipped += size;
                continue;
            }

            if !self.is_included(path) {
                debug!("Skipping binary file: {relative}");
                stats.skipped_binary += 1;
                continue;
            }

            candidates.push(Candidate {
                path: path.to_path_buf(),
                relative,
                size,
            });
        }

        Ok((candidates, stats))
    }

    fn is_included(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.source_files.is_match(name)
            || WELL_KNOWN_DOCS.contains(&name.to_lowercase().as_str())
            || is_text_file(path)
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether the first bytes of a file look like UTF-8 text
pub fn is_text_file(path: &Path) -> bool {
    let mut buf = [0u8; SNIFF_LEN];
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let Ok(read) = file.read(&mut buf) else {
        return false;
    };
    looks_like_text(&buf[..read])
}

/// No NUL bytes and valid UTF-8, allowing a code point cut off at the end
pub fn looks_like_text(chunk: &[u8]) -> bool {
    if chunk.contains(&0) {
        return false;
    }
    match std::str::from_utf8(chunk) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

/// Read a file as UTF-8, falling back to Latin-1
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(decode_text(bytes))
}

pub fn decode_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| e.into_bytes().iter().map(|&b| char::from(b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_text() {
        assert!(looks_like_text(b"plain text\n"));
        assert!(!looks_like_text(b"bin\0ary"));
        // "é" is 0xC3 0xA9; a chunk ending after the first byte is still text
        assert!(looks_like_text(&[b'a', 0xC3]));
        assert!(!looks_like_text(&[0xFF, b'a']));
    }

    #[test]
    fn test_decode_text_falls_back_to_latin1() {
        assert_eq!(decode_text(b"caf\xe9".to_vec()), "caf\u{e9}");
        assert_eq!(decode_text("café".as_bytes().to_vec()), "café");
    }
}
