//! Fenced code block scanning for model responses

use crate::analyzer::language;
use crate::patch::normalize_path;

use std::path::Path;

/// A fenced code block and what surrounds it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    /// Language from the info string, lowercased
    pub lang: Option<String>,
    /// File path given in the info string (`path=...`, `lang:path` or a bare path)
    pub path_hint: Option<String>,
    pub content: String,
    /// Index of the opening fence line
    pub start_line: usize,
    /// Index of the closing fence line (or the last line when unclosed)
    pub end_line: usize,
    /// Nearest non-blank line above the opening fence, if outside any block
    pub preceding: Option<String>,
}

impl FencedBlock {
    pub fn is_lang(&self, names: &[&str]) -> bool {
        self.lang.as_deref().is_some_and(|lang| names.contains(&lang))
    }
}

/// Find every fenced block (```` ``` ```` or `~~~`) in `text`, in order.
/// An unclosed fence runs to the end of the text.
pub fn fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let lines: Vec<&str> = text.lines().collect();
    let mut blocks = Vec::new();
    let mut last_end: Option<usize> = None;
    let mut i = 0;

    while i < lines.len() {
        let Some((fence_char, fence_len, info)) = opening_fence(lines[i]) else {
            i += 1;
            continue;
        };

        let start = i;
        let mut end = lines.len();
        for (j, line) in lines.iter().enumerate().skip(start + 1) {
            if is_closing_fence(line, fence_char, fence_len) {
                end = j;
                break;
            }
        }

        let content_end = end.min(lines.len());
        let mut content = lines[start + 1..content_end].join("\n");
        if !content.is_empty() {
            content.push('\n');
        }

        let floor = last_end.map_or(0, |e| e + 1);
        let preceding = lines[floor..start]
            .iter()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(|l| l.trim().to_string());

        let (lang, path_hint) = parse_info(info);
        blocks.push(FencedBlock {
            lang,
            path_hint,
            content,
            start_line: start,
            end_line: end.min(lines.len().saturating_sub(1)),
            preceding,
        });

        last_end = Some(end);
        i = end + 1;
    }
    blocks
}

/// The lines of `text` that are not inside any fenced block, with their indices
pub fn outside_lines<'a>(text: &'a str, blocks: &[FencedBlock]) -> Vec<(usize, &'a str)> {
    text.lines()
        .enumerate()
        .filter(|(i, _)| {
            !blocks
                .iter()
                .any(|b| *i >= b.start_line && *i <= b.end_line)
        })
        .collect()
}

fn opening_fence(line: &str) -> Option<(char, usize, &str)> {
    let trimmed = line.trim_start();
    let fence_char = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let fence_len = trimmed.chars().take_while(|c| *c == fence_char).count();
    if fence_len < 3 {
        return None;
    }
    let info = trimmed[fence_len..].trim();
    // Inline code such as ```foo``` is not a fence
    if fence_char == '`' && info.contains('`') {
        return None;
    }
    Some((fence_char, fence_len, info))
}

fn is_closing_fence(line: &str, fence_char: char, fence_len: usize) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= fence_len && trimmed.chars().all(|c| c == fence_char)
}

fn parse_info(info: &str) -> (Option<String>, Option<String>) {
    let mut lang = None;
    let mut path = None;

    for (n, token) in info.split_whitespace().enumerate() {
        if let Some((key, value)) = token.split_once('=') {
            if matches!(key, "path" | "file" | "filename" | "title") {
                path = Some(normalize_path(value));
            }
            continue;
        }
        if n > 0 {
            continue;
        }
        if let Some((l, p)) = token.split_once(':')
            && looks_like_path(p)
        {
            lang = Some(l.to_lowercase());
            path = Some(normalize_path(p));
        } else if looks_like_path(token) {
            path = Some(normalize_path(token));
        } else {
            lang = Some(token.to_lowercase());
        }
    }

    if lang.is_none()
        && let Some(p) = &path
    {
        let file_type = language::file_type_for(Path::new(p));
        if file_type != "unknown" {
            lang = Some(file_type.to_string());
        }
    }
    (lang, path)
}

/// Heuristic for "this token names a file": has a directory separator or a
/// known extension, and is not a URL
pub fn looks_like_path(token: &str) -> bool {
    let token = token.trim_matches(|c| c == '`' || c == '"' || c == '\'');
    if token.is_empty() || token.contains("://") || token.contains(char::is_whitespace) {
        return false;
    }
    let path = Path::new(token);
    let known_ext = language::file_type_for(path) != "unknown"
        || path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e, "lock" | "cfg" | "ini" | "xml" | "rst" | "hbs" | "env"));
    let known_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| matches!(n, "Makefile" | "Dockerfile" | "Gemfile" | "LICENSE"));
    known_ext || known_name || (token.contains('/') && !token.ends_with('/'))
}
