//! Prompt templates rendered with repository context

mod builtin;

pub use builtin::{BUILTIN_TEMPLATES, BuiltinTemplate};

use crate::analyzer::{ProjectAnalysis, ProjectAnalyzer};
use crate::bundle::RepoWalker;
use crate::config::Config;
use crate::response::ResponseContract;

use anyhow::{Context, Result};
use handlebars::Handlebars;
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use strum_macros::Display;

const TEMPLATE_EXTENSION: &str = "hbs";

#[derive(Debug)]
pub enum TemplateError {
    Unknown { name: String, available: Vec<String> },
    Invalid { name: String, message: String },
    Render { name: String, message: String },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::Unknown { name, available } => write!(
                f,
                "Unknown prompt type '{name}'. Available: {}",
                available.join(", ")
            ),
            TemplateError::Invalid { name, message } => {
                write!(f, "Template '{name}' is invalid: {message}")
            }
            TemplateError::Render { name, message } => {
                write!(f, "Failed to render template '{name}': {message}")
            }
        }
    }
}

impl std::error::Error for TemplateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TemplateOrigin {
    #[strum(to_string = "built-in")]
    BuiltIn,
    #[strum(to_string = "user")]
    User,
}

#[derive(Debug, Clone)]
pub struct TemplateInfo {
    pub name: String,
    pub description: String,
    pub origin: TemplateOrigin,
    /// File the template was loaded from, for user templates
    pub path: Option<PathBuf>,
}

/// Values available to every template
#[derive(Serialize, Debug, Clone, Default)]
pub struct PromptContext {
    pub repo_name: String,
    pub repo_path: String,
    pub primary_language: String,
    pub primary_framework: String,
    /// `"<language> (<n> files)"`, most used first
    pub languages: Vec<String>,
    pub frameworks: Vec<String>,
    pub file_count: usize,
    pub branch: String,
    pub custom_request: String,
    pub response_format: String,
}

impl PromptContext {
    pub fn from_analysis(
        repo_path: &Path,
        analysis: &ProjectAnalysis,
        custom_request: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            repo_name: analysis.repo_name.clone(),
            repo_path: repo_path
                .canonicalize()
                .unwrap_or_else(|_| repo_path.to_path_buf())
                .display()
                .to_string(),
            primary_language: analysis.primary_language.clone(),
            primary_framework: analysis.primary_framework.clone(),
            languages: analysis
                .ranked_languages()
                .into_iter()
                .map(|(lang, count)| format!("{lang} ({count} files)"))
                .collect(),
            frameworks: analysis.frameworks.clone(),
            file_count: analysis.total_files,
            branch: analysis
                .git
                .as_ref()
                .map_or_else(|| "unknown".to_string(), |git| git.branch.clone()),
            custom_request: custom_request.unwrap_or_default().trim().to_string(),
            response_format: response_format()?,
        })
    }

    /// Analyze a repository and build its context
    pub fn for_repository(
        repo_path: &Path,
        config: &Config,
        custom_request: Option<&str>,
    ) -> Result<Self> {
        let paths = RepoWalker::new(repo_path, config.max_file_size_bytes())?
            .skip_dir(&repo_path.join(&config.output_dir))
            .list()?;
        let analysis = ProjectAnalyzer::new(repo_path).analyze(&paths);
        Self::from_analysis(repo_path, &analysis, custom_request)
    }
}

/// JSON schema of the answer models are asked to give
pub fn response_format() -> Result<String> {
    let schema = schemars::schema_for!(ResponseContract);
    serde_json::to_string_pretty(&schema).context("Failed to serialize response schema")
}

struct Entry {
    description: String,
    origin: TemplateOrigin,
    path: Option<PathBuf>,
    source: String,
}

/// Built-in templates plus `*.hbs` files from the user's templates directory
pub struct PromptManager {
    registry: Handlebars<'static>,
    entries: BTreeMap<String, Entry>,
}

impl PromptManager {
    pub fn new(templates_dir: Option<&Path>) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_partial("repository_context", builtin::REPOSITORY_CONTEXT)
            .context("Failed to register repository context partial")?;
        registry
            .register_partial("response_instructions", builtin::RESPONSE_INSTRUCTIONS)
            .context("Failed to register response format partial")?;

        let mut entries = BTreeMap::new();
        for template in BUILTIN_TEMPLATES {
            registry
                .register_template_string(template.name, template.source)
                .with_context(|| format!("Failed to register template '{}'", template.name))?;
            entries.insert(
                template.name.to_string(),
                Entry {
                    description: template.description.to_string(),
                    origin: TemplateOrigin::BuiltIn,
                    path: None,
                    source: template.source.to_string(),
                },
            );
        }

        let mut manager = Self { registry, entries };
        if let Some(dir) = templates_dir
            && dir.is_dir()
        {
            manager.load_user_templates(dir)?;
        }
        Ok(manager)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.templates_dir.as_deref())
    }

    fn load_user_templates(&mut self, dir: &Path) -> Result<()> {
        let read = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read templates directory {}", dir.display()))?;
        let mut paths: Vec<PathBuf> = read
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(TEMPLATE_EXTENSION)
            })
            .collect();
        paths.sort();

        for path in paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template {}", path.display()))?;
            if let Err(e) = self.registry.register_template_string(&name, &source) {
                warn!("Skipping template {}: {e}", path.display());
                continue;
            }
            debug!("Loaded user template '{name}' from {}", path.display());
            self.entries.insert(
                name,
                Entry {
                    description: leading_comment(&source)
                        .unwrap_or_else(|| "User template".to_string()),
                    origin: TemplateOrigin::User,
                    path: Some(path.clone()),
                    source,
                },
            );
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn templates(&self) -> Vec<TemplateInfo> {
        self.entries
            .iter()
            .map(|(name, entry)| TemplateInfo {
                name: name.clone(),
                description: entry.description.clone(),
                origin: entry.origin,
                path: entry.path.clone(),
            })
            .collect()
    }

    /// Raw template text
    pub fn source(&self, name: &str) -> Result<&str, TemplateError> {
        self.entries
            .get(name)
            .map(|entry| entry.source.as_str())
            .ok_or_else(|| self.unknown(name))
    }

    pub fn render(&self, name: &str, context: &PromptContext) -> Result<String, TemplateError> {
        if !self.entries.contains_key(name) {
            return Err(self.unknown(name));
        }
        self.registry
            .render(name, context)
            .map_err(|e| TemplateError::Render {
                name: name.to_string(),
                message: e.to_string(),
            })
    }

    fn unknown(&self, name: &str) -> TemplateError {
        TemplateError::Unknown {
            name: name.to_string(),
            available: self.names(),
        }
    }
}

/// Text of a `{{!-- ... --}}` or `{{! ... }}` comment opening a template
fn leading_comment(source: &str) -> Option<String> {
    let trimmed = source.trim_start();
    let body = if let Some(rest) = trimmed.strip_prefix("{{!--") {
        rest.split_once("--}}")?.0
    } else if let Some(rest) = trimmed.strip_prefix("{{!") {
        rest.split_once("}}")?.0
    } else {
        return None;
    };
    let text = body.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> PromptContext {
        PromptContext {
            repo_name: "demo".to_string(),
            repo_path: "/tmp/demo".to_string(),
            primary_language: "Rust".to_string(),
            primary_framework: "Cargo".to_string(),
            languages: vec!["Rust (3 files)".to_string()],
            frameworks: vec!["Cargo".to_string()],
            file_count: 3,
            branch: "main".to_string(),
            custom_request: String::new(),
            response_format: "{}".to_string(),
        }
    }

    #[test]
    fn test_every_builtin_renders() {
        let manager = PromptManager::new(None).expect("manager builds");
        for template in BUILTIN_TEMPLATES {
            let rendered = manager
                .render(template.name, &context())
                .expect("builtin renders");
            assert!(rendered.contains("demo"), "{} lacks repo name", template.name);
            assert!(rendered.contains("## Response format"));
        }
    }

    #[test]
    fn test_custom_request_is_included() {
        let manager = PromptManager::new(None).expect("manager builds");
        let mut ctx = context();
        ctx.custom_request = "Handle <empty> input & errors".to_string();
        let rendered = manager.render("bug-fix", &ctx).expect("renders");
        assert!(rendered.contains("Handle <empty> input & errors"));
        assert!(!rendered.contains("Find the most likely defects"));
    }

    #[test]
    fn test_unknown_template_lists_available() {
        let manager = PromptManager::new(None).expect("manager builds");
        let err = manager.render("nope", &context()).expect_err("unknown");
        let message = err.to_string();
        assert!(message.contains("'nope'"));
        assert!(message.contains("code-review"));
    }

    #[test]
    fn test_leading_comment() {
        assert_eq!(
            leading_comment("{{!-- Review\n migrations --}}\nbody").as_deref(),
            Some("Review migrations")
        );
        assert_eq!(leading_comment("{{! short }}x").as_deref(), Some("short"));
        assert_eq!(leading_comment("# Title"), None);
    }

    #[test]
    fn test_response_format_describes_contract() {
        let schema = response_format().expect("schema serializes");
        assert!(schema.contains("\"changes\""));
        assert!(schema.contains("\"file_path\""));
    }
}
