use super::extract::patches_from_diff;
use super::types::{ChangeKind, ChangeOrigin, ProposedChange, ResponsePayload};
use crate::patch::{FileEdit, normalize_path};

use log::debug;
use serde_json::{Map, Value};

/// Merge a JSON document from a response into `payload`.
///
/// Arrays are lists of changes. Objects may carry `changes`, `patches`,
/// `files`, `commits`, `summary` and `implementation_plan`; other keys are
/// ignored.
pub fn merge_json(value: &Value, payload: &mut ResponsePayload) {
    match value {
        Value::Array(items) => payload.changes.extend(parse_changes(items)),
        Value::Object(map) => merge_object(map, payload),
        _ => debug!("Ignoring JSON scalar in response"),
    }
}

fn merge_object(map: &Map<String, Value>, payload: &mut ResponsePayload) {
    if let Some(Value::Array(items)) = map.get("changes") {
        payload.changes.extend(parse_changes(items));
    }

    if payload.summary.is_empty()
        && let Some(summary) = map.get("summary").and_then(Value::as_str)
    {
        payload.summary = summary.trim().to_string();
    }

    if payload.implementation_plan.is_none() {
        payload.implementation_plan = ["implementation_plan", "plan"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(|plan| plan.trim().to_string());
    }

    if let Some(Value::Array(items)) = map.get("patches") {
        for item in items {
            match item {
                Value::String(diff) => payload.patches.extend(patches_from_diff(diff, None)),
                Value::Object(obj) => {
                    let file = string_field(obj, &["file", "file_path", "path"]);
                    if let Some(diff) = string_field(obj, &["diff", "content", "patch"]) {
                        payload.patches.extend(patches_from_diff(&diff, file.as_deref()));
                    }
                }
                _ => {}
            }
        }
    }

    if let Some(Value::Array(items)) = map.get("files") {
        payload
            .edits
            .extend(items.iter().filter_map(Value::as_object).filter_map(parse_file));
    }

    match map.get("commits").or_else(|| map.get("commit_messages")) {
        Some(Value::Array(items)) => payload
            .commits
            .extend(items.iter().filter_map(Value::as_str).map(|s| s.trim().to_string())),
        Some(Value::String(message)) => payload.commits.push(message.trim().to_string()),
        _ => {}
    }
    if let Some(message) = string_field(map, &["commit_message", "commit"]) {
        payload.commits.push(message.trim().to_string());
    }
}

fn parse_changes(items: &[Value]) -> Vec<ProposedChange> {
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<ProposedChange>(item.clone()) {
            Ok(mut change) => {
                change.file_path = normalize_path(&change.file_path);
                change.origin = ChangeOrigin::Structured;
                Some(change)
            }
            Err(e) => {
                debug!("Skipping change entry that does not deserialize: {e}");
                None
            }
        })
        .collect()
}

fn parse_file(obj: &Map<String, Value>) -> Option<FileEdit> {
    let path = string_field(obj, &["path", "file_path", "file"])?;
    let deleting = obj.get("delete").and_then(Value::as_bool) == Some(true)
        || string_field(obj, &["action", "change_type"])
            .is_some_and(|a| a.eq_ignore_ascii_case("delete") || a.eq_ignore_ascii_case("remove"));
    if deleting {
        return Some(FileEdit::delete(normalize_path(&path)));
    }
    let content = string_field(obj, &["content"])?;
    Some(FileEdit::write(normalize_path(&path), content))
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(ToString::to_string)
}

/// File edits implied by structured changes that carry content or delete a file
pub fn edits_from_changes(changes: &[ProposedChange]) -> Vec<FileEdit> {
    changes
        .iter()
        .filter(|change| change.origin == ChangeOrigin::Structured)
        .filter_map(|change| match (&change.content, change.change_type) {
            (Some(content), ChangeKind::Create | ChangeKind::Modify) => {
                Some(FileEdit::write(change.file_path.clone(), content.clone()))
            }
            (None, ChangeKind::Delete) => Some(FileEdit::delete(change.file_path.clone())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::EditAction;

    #[test]
    fn test_merge_object() {
        let value: Value = serde_json::from_str(
            r#"{
                "summary": "Add caching",
                "changes": [
                    {"file_path": "./src/cache.rs", "change_type": "create", "content": "pub struct Cache;\n"},
                    {"file_path": "old.rs", "change_type": "delete"},
                    {"no_path": true}
                ],
                "patches": [{"file": "src/lib.rs", "diff": "@@ -1 +1 @@\n-a\n+b\n"}],
                "commits": ["feat: add caching layer"],
                "unknown": 1
            }"#,
        )
        .expect("valid json");

        let mut payload = ResponsePayload::default();
        merge_json(&value, &mut payload);

        assert_eq!(payload.summary, "Add caching");
        assert_eq!(payload.changes.len(), 2);
        assert_eq!(payload.changes[0].file_path, "src/cache.rs");
        assert_eq!(payload.patches.len(), 1);
        assert_eq!(payload.patches[0].file.as_deref(), Some("src/lib.rs"));
        assert_eq!(payload.commits, vec!["feat: add caching layer".to_string()]);

        let edits = edits_from_changes(&payload.changes);
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[1].action, EditAction::Delete);
    }

    #[test]
    fn test_files_array() {
        let value: Value = serde_json::from_str(
            r#"{"files": [{"path": "a.txt", "content": "x"}, {"path": "b.txt", "delete": true}, {"path": "c.txt"}]}"#,
        )
        .expect("valid json");
        let mut payload = ResponsePayload::default();
        merge_json(&value, &mut payload);
        assert_eq!(
            payload.edits,
            vec![FileEdit::write("a.txt", "x"), FileEdit::delete("b.txt")]
        );
    }
}
