use anyhow::Result;
use gitllm::patch::{EditAction, PatchFormat};
use gitllm::response::{ChangeKind, ChangeOrigin, ResponseFormat, ResponseParser};

#[path = "test_utils.rs"]
mod test_utils;
use test_utils::write_response;

const MARKDOWN_RESPONSE: &str = r#"# Summary

Rename `add` to `sum` and add a greeting module.

## Implementation Plan

1. Rename the function
2. Add the module

## Changes

- Modify file `src/lib.rs` to rename the function
- Create file `src/greet.rs` with a greeting helper

File: src/lib.rs
```diff
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,3 @@
-pub fn add(a: i32, b: i32) -> i32 {
+pub fn sum(a: i32, b: i32) -> i32 {
     a + b
 }
```

### src/greet.rs
```rust
pub fn greet() -> &'static str {
    "hi"
}
```

## Risks

None worth mentioning.

Commit message: refactor: rename add to sum and add greeting
"#;

#[test]
fn test_markdown_response_with_diff_and_file_block() {
    let payload = ResponseParser::new().parse_str(MARKDOWN_RESPONSE);

    assert_eq!(payload.format, ResponseFormat::Mixed);
    assert!(payload.summary.contains("Rename `add` to `sum`"));
    assert!(
        payload
            .implementation_plan
            .as_deref()
            .is_some_and(|plan| plan.contains("Rename the function"))
    );
    assert!(payload.sections.contains_key("Risks"));

    assert_eq!(payload.patches.len(), 1);
    assert_eq!(payload.patches[0].file.as_deref(), Some("src/lib.rs"));
    assert_eq!(payload.patches[0].format, PatchFormat::UnifiedDiff);

    assert_eq!(payload.edits.len(), 1);
    assert_eq!(payload.edits[0].path, "src/greet.rs");
    assert!(matches!(
        &payload.edits[0].action,
        EditAction::Write { content } if content.contains("fn greet")
    ));

    assert_eq!(
        payload.commits.first().map(String::as_str),
        Some("refactor: rename add to sum and add greeting")
    );
    let files: Vec<&str> = payload.changes.iter().map(|c| c.file_path.as_str()).collect();
    assert!(files.contains(&"src/lib.rs"));
    assert!(files.contains(&"src/greet.rs"));
}

#[test]
fn test_json_response() {
    let response = r#"{
        "summary": "Add config loader",
        "changes": [
            {"file_path": "src/config.rs", "change_type": "create", "priority": "high",
             "description": "New config loader", "content": "pub struct Config;\n"},
            {"file_path": "src/old.rs", "change_type": "delete", "description": "Remove dead code"}
        ],
        "patches": [
            {"file": "src/lib.rs", "diff": "--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -1 +1 @@\n-a\n+b\n"}
        ],
        "commits": ["feat: add configuration loader"]
    }"#;

    let payload = ResponseParser::new().parse_str(response);
    assert_eq!(payload.format, ResponseFormat::Json);
    assert_eq!(payload.summary, "Add config loader");
    assert_eq!(payload.changes.len(), 2);
    assert_eq!(payload.changes[0].change_type, ChangeKind::Create);
    assert_eq!(payload.changes[0].origin, ChangeOrigin::Structured);
    assert_eq!(payload.patches.len(), 1);
    assert_eq!(payload.edits.len(), 2);
    assert_eq!(payload.edits[1].action, EditAction::Delete);
    assert_eq!(payload.commits, vec!["feat: add configuration loader".to_string()]);
}

#[test]
fn test_plain_text_response_mentions_files() {
    let response = "I would update file src/server.rs to handle timeouts.\n\
        Also modify the file config/app.yaml so the timeout is configurable.\n";
    let payload = ResponseParser::new().parse_str(response);

    assert_eq!(payload.format, ResponseFormat::Text);
    assert!(payload.patches.is_empty());
    let files: Vec<&str> = payload.changes.iter().map(|c| c.file_path.as_str()).collect();
    assert!(files.contains(&"src/server.rs"), "found {files:?}");
    assert!(payload.has_changes());
    assert!(!payload.has_applicable());
}

#[test]
fn test_bare_diff_and_simple_replace() {
    let response = "Apply this:\n\n\
        --- a/src/main.rs\n\
        +++ b/src/main.rs\n\
        @@ -1,3 +1,3 @@\n \
        fn main() {\n\
        -    println!(\"Hello\");\n\
        +    println!(\"Hello, world\");\n \
        }\n\n\
        Replace: \"a + b\" -> \"b + a\" in src/lib.rs\n";
    let payload = ResponseParser::new().parse_str(response);

    assert_eq!(payload.patches.len(), 2);
    assert_eq!(payload.patches[0].file.as_deref(), Some("src/main.rs"));
    assert_eq!(
        payload.patches[1].format,
        PatchFormat::SimpleReplace {
            old: "a + b".to_string(),
            new: "b + a".to_string()
        }
    );
    assert_eq!(payload.patches[1].file.as_deref(), Some("src/lib.rs"));
}

#[test]
fn test_multi_file_diff_is_split_per_file() {
    let response = "```diff\n\
        --- a/one.txt\n+++ b/one.txt\n@@ -1 +1 @@\n-1\n+one\n\
        --- a/two.txt\n+++ b/two.txt\n@@ -1 +1 @@\n-2\n+two\n\
        ```\n";
    let payload = ResponseParser::new().parse_str(response);
    let files: Vec<Option<&str>> = payload.patches.iter().map(|p| p.file.as_deref()).collect();
    assert_eq!(files, vec![Some("one.txt"), Some("two.txt")]);
}

#[test]
fn test_parse_file_records_source() -> Result<()> {
    let (_dir, path) = write_response(MARKDOWN_RESPONSE, "response.md");
    let payload = ResponseParser::new().parse_file(&path)?;
    assert_eq!(
        payload.metadata.source_file.as_deref(),
        Some(path.display().to_string().as_str())
    );
    assert_eq!(payload.metadata.content_length, MARKDOWN_RESPONSE.chars().count());
    Ok(())
}

#[test]
fn test_empty_response_has_no_changes() {
    let payload = ResponseParser::new().parse_str("Looks good to me.");
    assert!(!payload.has_changes());
    assert_eq!(payload.summary, "Looks good to me.");
}
