use crate::patch::{FileEdit, Patch};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString};

/// What a proposed change does to its file
#[derive(
    Serialize,
    Deserialize,
    JsonSchema,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ChangeKind {
    #[serde(alias = "add", alias = "new")]
    #[strum(to_string = "create", serialize = "add", serialize = "new")]
    Create,
    #[default]
    #[serde(alias = "update", alias = "edit", alias = "change")]
    #[strum(to_string = "modify", serialize = "update", serialize = "edit", serialize = "change")]
    Modify,
    #[serde(alias = "remove")]
    #[strum(to_string = "delete", serialize = "remove")]
    Delete,
    #[serde(alias = "move")]
    #[strum(to_string = "rename", serialize = "move")]
    Rename,
}

#[derive(
    Serialize,
    Deserialize,
    JsonSchema,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Where a change entry came from
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    /// Given explicitly in JSON
    #[default]
    Structured,
    /// Found in prose by pattern matching
    TextExtraction,
    /// Inferred from a patch or file block
    Derived,
}

/// One file-level change the model proposes
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq)]
pub struct ProposedChange {
    /// Path of the file, relative to the repository root
    #[serde(alias = "path", alias = "file")]
    pub file_path: String,
    /// One of: create, modify, delete, rename
    #[serde(default, alias = "type", alias = "action")]
    pub change_type: ChangeKind,
    /// One of: low, medium, high
    #[serde(default)]
    pub priority: Priority,
    /// What the change does and why
    #[serde(default)]
    pub description: String,
    /// Complete new content of the file, for create and full rewrites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    #[schemars(skip)]
    pub origin: ChangeOrigin,
}

impl ProposedChange {
    pub fn extracted(file_path: String, change_type: ChangeKind, description: String) -> Self {
        Self {
            file_path,
            change_type,
            priority: Priority::Medium,
            description,
            content: None,
            origin: ChangeOrigin::TextExtraction,
        }
    }
}

/// A unified diff for one file
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct ContractPatch {
    /// Path of the patched file
    pub file: String,
    /// Unified diff with `--- a/<path>` / `+++ b/<path>` headers and `@@` hunks
    #[serde(alias = "content", alias = "patch")]
    pub diff: String,
}

/// The JSON document models are asked to answer with
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct ResponseContract {
    /// Short overview of the proposed work
    pub summary: String,
    /// Every file the answer touches
    pub changes: Vec<ProposedChange>,
    /// Unified diffs for modifications of existing files
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<ContractPatch>,
    /// Conventional commit messages, best first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commits: Vec<String>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResponseFormat {
    Json,
    Mixed,
    Markdown,
    #[default]
    Text,
}

/// A fenced code block that is neither a diff nor JSON
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: String,
    pub content: String,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct ResponseMetadata {
    pub source_file: Option<String>,
    /// RFC 3339 timestamp
    pub parsed_at: String,
    /// Length of the response in characters
    pub content_length: usize,
}

/// Everything extracted from one model response
#[derive(Serialize, Debug, Clone, Default)]
pub struct ResponsePayload {
    pub format: ResponseFormat,
    pub summary: String,
    pub changes: Vec<ProposedChange>,
    pub patches: Vec<Patch>,
    pub edits: Vec<FileEdit>,
    pub commits: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implementation_plan: Option<String>,
    /// Markdown sections not recognized as summary, plan or changes
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sections: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub code_blocks: Vec<CodeBlock>,
    pub metadata: ResponseMetadata,
}

impl ResponsePayload {
    /// Whether the response proposes anything at all
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty() || !self.patches.is_empty() || !self.edits.is_empty()
    }

    /// Whether there is anything that could be written to disk
    pub fn has_applicable(&self) -> bool {
        !self.patches.is_empty() || !self.edits.is_empty()
    }
}
