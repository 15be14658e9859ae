use std::path::Path;

/// File type label for a path, derived from its extension
pub fn file_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "jsx" => "react-jsx",
        "tsx" => "react-tsx",
        "java" => "java",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "c" => "c",
        "h" => "header",
        "go" => "go",
        "rs" => "rust",
        "php" => "php",
        "rb" => "ruby",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        "sh" | "bash" => "shell",
        "sql" => "sql",
        "html" | "htm" => "html",
        "css" | "scss" | "sass" => "css",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "md" => "markdown",
        "txt" => "text",
        _ => "unknown",
    }
}

/// Human readable language for a file type label, `None` for unknown files
pub fn language_for_type(file_type: &str) -> Option<&'static str> {
    let language = match file_type {
        "python" => "Python",
        "javascript" | "react-jsx" => "JavaScript",
        "typescript" | "react-tsx" => "TypeScript",
        "java" => "Java",
        "cpp" => "C++",
        "c" | "header" => "C",
        "go" => "Go",
        "rust" => "Rust",
        "php" => "PHP",
        "ruby" => "Ruby",
        "swift" => "Swift",
        "kotlin" => "Kotlin",
        "scala" => "Scala",
        "shell" => "Shell",
        "sql" => "SQL",
        "html" => "HTML",
        "css" => "CSS",
        "json" => "JSON",
        "yaml" => "YAML",
        "toml" => "TOML",
        "markdown" => "Markdown",
        "text" => "Text",
        _ => return None,
    };
    Some(language)
}

/// Languages that describe data or prose rather than program code
pub fn is_markup_language(language: &str) -> bool {
    matches!(
        language,
        "Markdown" | "Text" | "JSON" | "YAML" | "TOML" | "HTML" | "CSS"
    )
}

/// Whether a file name looks like documentation
pub fn is_documentation(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.to_lowercase();

    let doc_extension = Path::new(&lower)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| matches!(ext, "md" | "txt" | "rst" | "tex" | "adoc"));

    doc_extension
        || ["readme", "license", "contributing", "changelog"]
            .iter()
            .any(|prefix| lower.starts_with(prefix))
}
