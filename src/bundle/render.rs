//! Text layouts of the bundle files

use super::converter::ConvertStats;
use super::walker::RepoFile;
use crate::analyzer::ProjectAnalysis;

use std::collections::BTreeMap;
use std::fmt::Write;

pub const STRUCTURE_FILE: &str = "structure.txt";
pub const CODEBASE_FILE: &str = "codebase.txt";
pub const DOCUMENTATION_FILE: &str = "documentation.txt";
pub const SUMMARY_FILE: &str = "summary.md";
pub const METADATA_FILE: &str = "metadata.json";
pub const ANALYSIS_FILE: &str = "analysis.json";

/// Room left in each part for the `(part N of M)` marker
const PART_MARKER_RESERVE: usize = 32;

/// One output file of a split bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePart {
    pub file_name: String,
    pub content: String,
}

/// File name of part `n` (1-based): `codebase.txt`, `codebase.part2.txt`, ...
pub fn part_file_name(n: usize) -> String {
    if n <= 1 {
        CODEBASE_FILE.to_string()
    } else {
        format!("codebase.part{n}.txt")
    }
}

/// Directory tree grouped by parent directory, root files first
pub fn render_structure(repo_name: &str, files: &[RepoFile]) -> String {
    let mut dirs: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for file in files {
        let (dir, name) = file.path.rsplit_once('/').unwrap_or(("", file.path.as_str()));
        dirs.entry(dir).or_default().push(name);
    }

    let mut lines = vec![
        format!("Project Structure: {repo_name}"),
        "=".repeat(60),
        String::new(),
    ];
    for (dir, names) in &mut dirs {
        names.sort_unstable();
        if !dir.is_empty() {
            lines.push(format!("{dir}/"));
        }
        let indent = if dir.is_empty() { "" } else { "    " };
        for name in names.iter() {
            lines.push(format!("{indent}├── {name}"));
        }
        if !dir.is_empty() {
            lines.push(String::new());
        }
    }
    lines.join("\n")
}

fn codebase_header(
    repo_name: &str,
    analysis: &ProjectAnalysis,
    total_files: usize,
    part: Option<(usize, usize)>,
) -> String {
    let title = match part {
        Some((n, total)) if total > 1 => format!("PROJECT CODEBASE (part {n} of {total})"),
        _ => "PROJECT CODEBASE".to_string(),
    };
    [
        "=".repeat(80),
        title,
        "=".repeat(80),
        String::new(),
        "ANALYSIS SUMMARY".to_string(),
        format!("Repository: {repo_name}"),
        format!("Total files: {total_files}"),
        format!("Main language: {}", analysis.primary_language),
        format!("Framework: {}", analysis.primary_framework),
        String::new(),
        "=".repeat(80),
        "FILE CONTENTS".to_string(),
        "=".repeat(80),
        String::new(),
    ]
    .join("\n")
}

fn file_block(file: &RepoFile) -> String {
    [
        String::new(),
        "-".repeat(60),
        format!("FILE: {}", file.path),
        format!("TYPE: {}", file.file_type),
        format!("SIZE: {} bytes", file.size),
        "-".repeat(60),
        String::new(),
        file.content.clone(),
        String::new(),
    ]
    .join("\n")
}

/// The codebase bundle. With `max_bytes`, blocks are grouped greedily into
/// parts no larger than the limit; a block that alone exceeds it gets a part
/// of its own. Files are never split.
pub fn render_codebase(
    repo_name: &str,
    analysis: &ProjectAnalysis,
    files: &[&RepoFile],
    max_bytes: Option<usize>,
) -> Vec<BundlePart> {
    let blocks: Vec<String> = files.iter().map(|f| file_block(f)).collect();
    let header_len =
        codebase_header(repo_name, analysis, files.len(), None).len() + PART_MARKER_RESERVE;

    let mut groups: Vec<Vec<&str>> = vec![Vec::new()];
    let mut current_len = header_len;
    for block in &blocks {
        let block_len = block.len() + 1;
        let Some(current) = groups.last_mut() else {
            continue;
        };
        let fits = max_bytes.is_none_or(|limit| current_len + block_len <= limit);
        if fits || current.is_empty() {
            current.push(block);
            current_len += block_len;
        } else {
            groups.push(vec![block.as_str()]);
            current_len = header_len + block_len;
        }
    }

    let total = groups.len();
    groups
        .into_iter()
        .enumerate()
        .map(|(i, group)| {
            let mut content =
                codebase_header(repo_name, analysis, files.len(), Some((i + 1, total)));
            for block in group {
                content.push('\n');
                content.push_str(block);
            }
            BundlePart {
                file_name: part_file_name(i + 1),
                content,
            }
        })
        .collect()
}

pub fn render_documentation(files: &[&RepoFile]) -> String {
    let mut lines = vec![
        "=".repeat(80),
        "PROJECT DOCUMENTATION".to_string(),
        "=".repeat(80),
        String::new(),
    ];
    for file in files {
        lines.extend([
            String::new(),
            "-".repeat(60),
            format!("DOCUMENTATION: {}", file.path),
            "-".repeat(60),
            String::new(),
            file.content.clone(),
            String::new(),
        ]);
    }
    lines.join("\n")
}

/// Bytes as megabytes with two decimals, rounded
pub fn format_mb(bytes: u64) -> String {
    const MB: u64 = 1024 * 1024;
    let hundredths = (bytes * 100 + MB / 2) / MB;
    format!("{}.{:02}", hundredths / 100, hundredths % 100)
}

pub struct SummaryInput<'a> {
    pub repo_name: &'a str,
    pub repo_path: &'a str,
    pub generated_at: &'a str,
    pub analysis: &'a ProjectAnalysis,
    pub stats: &'a ConvertStats,
    pub generated_files: &'a [String],
}

/// `summary.md`: repository facts, statistics, analysis and usage notes
pub fn render_summary(input: &SummaryInput<'_>) -> String {
    let stats = input.stats;
    let mut out = String::new();
    let w = "writing to string should never fail";

    writeln!(out, "# Project Analysis Summary\n").expect(w);
    writeln!(out, "## Repository Information").expect(w);
    writeln!(out, "- **Name**: {}", input.repo_name).expect(w);
    writeln!(out, "- **Path**: {}", input.repo_path).expect(w);
    if let Some(git) = &input.analysis.git {
        writeln!(out, "- **Branch**: {}", git.branch).expect(w);
        if let Some(head) = &git.head {
            writeln!(out, "- **HEAD**: {head}").expect(w);
        }
        if let Some(remote) = &git.remote_url {
            writeln!(out, "- **Remote**: {remote}").expect(w);
        }
    }
    writeln!(out, "- **Analysis Time**: {}\n", input.generated_at).expect(w);

    writeln!(out, "## Statistics").expect(w);
    writeln!(out, "- **Total Files Processed**: {}", stats.files_processed).expect(w);
    writeln!(out, "- **Total Size**: {} MB", format_mb(stats.bytes_total)).expect(w);
    writeln!(out, "- **Files Skipped**: {}", stats.files_skipped).expect(w);
    writeln!(out, "- **Size Skipped**: {} MB", format_mb(stats.bytes_skipped)).expect(w);
    writeln!(out, "- **Secrets Redacted**: {}", stats.redaction_total).expect(w);
    for (label, count) in &stats.redactions {
        writeln!(out, "  - {label}: {count}").expect(w);
    }
    if !stats.tokens.is_empty() {
        writeln!(out, "- **Estimated Tokens**:").expect(w);
        for (file, count) in &stats.tokens {
            writeln!(out, "  - `{file}`: {count}").expect(w);
        }
    }
    writeln!(out).expect(w);

    writeln!(out, "## Technical Analysis").expect(w);
    writeln!(out, "### Languages Used").expect(w);
    for (lang, count) in input.analysis.ranked_languages() {
        writeln!(out, "- {lang}: {count} files").expect(w);
    }
    writeln!(out, "\n### Frameworks Detected").expect(w);
    for framework in &input.analysis.frameworks {
        writeln!(out, "- {framework}").expect(w);
    }
    writeln!(out, "\n### File Types").expect(w);
    for (file_type, count) in &input.analysis.file_types {
        writeln!(out, "- {file_type}: {count}").expect(w);
    }
    writeln!(out).expect(w);

    writeln!(out, "## Generated Files").expect(w);
    for (i, file) in input.generated_files.iter().enumerate() {
        writeln!(out, "{}. `{file}` - {}", i + 1, describe_output(file)).expect(w);
    }
    writeln!(out).expect(w);

    writeln!(out, "## Usage Notes").expect(w);
    writeln!(out, "- Use `{CODEBASE_FILE}` with LLM prompts for code analysis").expect(w);
    if input.generated_files.len() > 1
        && input
            .generated_files
            .iter()
            .any(|f| f.starts_with("codebase.part"))
    {
        writeln!(out, "- The codebase is split into parts; send them in order").expect(w);
    }
    writeln!(out, "- Reference `{STRUCTURE_FILE}` for project architecture").expect(w);
    if input
        .generated_files
        .iter()
        .any(|f| f == DOCUMENTATION_FILE)
    {
        writeln!(out, "- Check `{DOCUMENTATION_FILE}` for project documentation").expect(w);
    }
    out
}

fn describe_output(file: &str) -> &'static str {
    match file {
        CODEBASE_FILE => "All source code files",
        DOCUMENTATION_FILE => "All documentation files",
        STRUCTURE_FILE => "File tree structure",
        METADATA_FILE => "Analysis metadata",
        ANALYSIS_FILE => "Full project analysis",
        SUMMARY_FILE => "This summary",
        _ if file.starts_with("codebase.part") => "Continuation of the source code",
        _ => "Generated output",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, content: &str) -> RepoFile {
        RepoFile {
            path: path.to_string(),
            content: content.to_string(),
            size: content.len() as u64,
            file_type: "rust".to_string(),
            is_documentation: false,
        }
    }

    #[test]
    fn test_structure_groups_by_directory() {
        let files = vec![
            file("src/main.rs", ""),
            file("Cargo.toml", ""),
            file("src/lib.rs", ""),
        ];
        assert_eq!(
            render_structure("demo", &files),
            format!(
                "Project Structure: demo\n{}\n\n├── Cargo.toml\nsrc/\n    ├── lib.rs\n    ├── main.rs\n",
                "=".repeat(60)
            )
        );
    }

    #[test]
    fn test_file_block_layout() {
        let block = file_block(&file("src/lib.rs", "fn a() {}"));
        let rule = "-".repeat(60);
        assert_eq!(
            block,
            format!("\n{rule}\nFILE: src/lib.rs\nTYPE: rust\nSIZE: 9 bytes\n{rule}\n\nfn a() {{}}\n")
        );
    }

    #[test]
    fn test_codebase_splits_at_file_boundaries() {
        let analysis = ProjectAnalysis::default();
        let big = file("big.rs", &"x".repeat(3000));
        let small_a = file("a.rs", "a");
        let small_b = file("b.rs", "b");
        let files = vec![&small_a, &big, &small_b];

        let single = render_codebase("demo", &analysis, &files, None);
        assert_eq!(single.len(), 1);
        assert!(single[0].content.starts_with(&format!("{}\nPROJECT CODEBASE\n", "=".repeat(80))));

        let parts = render_codebase("demo", &analysis, &files, Some(1500));
        let names: Vec<&str> = parts.iter().map(|p| p.file_name.as_str()).collect();
        assert_eq!(names, vec!["codebase.txt", "codebase.part2.txt", "codebase.part3.txt"]);
        assert!(parts[1].content.contains("PROJECT CODEBASE (part 2 of 3)"));
        assert!(parts[1].content.contains("FILE: big.rs"));
        assert!(parts[2].content.contains("FILE: b.rs"));
    }

    #[test]
    fn test_format_mb() {
        assert_eq!(format_mb(0), "0.00");
        assert_eq!(format_mb(1024 * 1024), "1.00");
        assert_eq!(format_mb(1024 * 1024 * 5 / 2), "2.50");
    }
}
