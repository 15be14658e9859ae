use anyhow::{Context, Result, anyhow};
use git2::Config as GitConfig;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the optional per-repository configuration file
pub const PROJECT_CONFIG_FILE: &str = ".git-llm.toml";

/// Git config section holding our keys (`gitllm.maxfilesize`, ...)
const GIT_SECTION: &str = "gitllm";

/// A configuration key, its environment override and a short description
#[derive(Debug, Clone, Copy)]
pub struct ConfigKey {
    pub name: &'static str,
    pub env: &'static str,
    pub description: &'static str,
}

pub const CONFIG_KEYS: &[ConfigKey] = &[
    ConfigKey {
        name: "maxfilesize",
        env: "GIT_LLM_MAX_FILE_SIZE",
        description: "Largest file (MB) included in a bundle",
    },
    ConfigKey {
        name: "maxbundlesize",
        env: "GIT_LLM_MAX_BUNDLE_SIZE",
        description: "Split bundles larger than this many MB (0 = never split)",
    },
    ConfigKey {
        name: "sanitize",
        env: "GIT_LLM_SANITIZE",
        description: "Redact secrets before writing bundles",
    },
    ConfigKey {
        name: "includedocs",
        env: "GIT_LLM_INCLUDE_DOCS",
        description: "Write documentation.txt alongside the codebase bundle",
    },
    ConfigKey {
        name: "outputdir",
        env: "GIT_LLM_OUTPUT_DIR",
        description: "Default output directory for convert",
    },
    ConfigKey {
        name: "branchprefix",
        env: "GIT_LLM_BRANCH_PREFIX",
        description: "Prefix for automatically named branches",
    },
    ConfigKey {
        name: "templatesdir",
        env: "GIT_LLM_TEMPLATES_DIR",
        description: "Directory holding user prompt templates (*.hbs)",
    },
    ConfigKey {
        name: "tokenizer",
        env: "GIT_LLM_TOKENIZER",
        description: "Estimate token counts for generated bundles",
    },
];

/// Effective configuration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Largest file included in a bundle, in megabytes
    pub max_file_size_mb: u64,
    /// Bundle split threshold in megabytes, 0 disables splitting
    pub max_bundle_size_mb: u64,
    pub sanitize: bool,
    pub include_docs: bool,
    pub output_dir: String,
    pub branch_prefix: String,
    pub templates_dir: Option<PathBuf>,
    pub count_tokens: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size_mb: 1,
            max_bundle_size_mb: 0,
            sanitize: true,
            include_docs: true,
            output_dir: "llm_analysis".to_string(),
            branch_prefix: "llm/".to_string(),
            templates_dir: dirs::config_dir().map(|dir| dir.join("git-llm").join("templates")),
            count_tokens: true,
        }
    }
}

/// Contents of `.git-llm.toml`; every field is optional
#[derive(Deserialize, Debug, Default, Clone)]
pub struct ProjectConfig {
    pub max_file_size: Option<u64>,
    pub max_bundle_size: Option<u64>,
    pub sanitize: Option<bool>,
    pub include_docs: Option<bool>,
    pub output_dir: Option<String>,
    pub branch_prefix: Option<String>,
    pub templates_dir: Option<String>,
    pub tokenizer: Option<bool>,
}

impl ProjectConfig {
    /// Read the project file from a repository root, if present
    pub fn load(repo_root: &Path) -> Result<Option<Self>> {
        let path = repo_root.join(PROJECT_CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let parsed: Self =
            toml::from_str(&text).with_context(|| format!("Invalid {}", path.display()))?;
        debug!("Loaded project configuration from {}", path.display());
        Ok(Some(parsed))
    }

    fn get(&self, key: &str) -> Option<String> {
        match key {
            "maxfilesize" => self.max_file_size.map(|v| v.to_string()),
            "maxbundlesize" => self.max_bundle_size.map(|v| v.to_string()),
            "sanitize" => self.sanitize.map(|v| v.to_string()),
            "includedocs" => self.include_docs.map(|v| v.to_string()),
            "outputdir" => self.output_dir.clone(),
            "branchprefix" => self.branch_prefix.clone(),
            "templatesdir" => self.templates_dir.clone(),
            "tokenizer" => self.tokenizer.map(|v| v.to_string()),
            _ => None,
        }
    }
}

/// Get a configuration value with layered priority:
/// env var > project file > local git config > global git config
fn get_layered_value(
    key: &ConfigKey,
    project: Option<&ProjectConfig>,
    local_config: Option<&GitConfig>,
    global_config: Option<&GitConfig>,
) -> Option<String> {
    if let Ok(val) = std::env::var(key.env) {
        return Some(val);
    }

    if let Some(val) = project.and_then(|p| p.get(key.name)) {
        return Some(val);
    }

    let git_key = format!("{GIT_SECTION}.{}", key.name);
    if let Some(local) = local_config
        && let Ok(val) = local.get_string(&git_key)
    {
        return Some(val);
    }

    if let Some(global) = global_config
        && let Ok(val) = global.get_string(&git_key)
    {
        return Some(val);
    }

    None
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(anyhow!("Invalid boolean for '{key}': {other}")),
    }
}

fn parse_size(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| anyhow!("Invalid size for '{key}': {value} ({e})"))
}

impl Config {
    /// Load the configuration for a repository (or the current directory)
    pub fn load(repo_root: Option<&Path>) -> Result<Self> {
        let global_config = GitConfig::open_default().ok();
        let start = repo_root.unwrap_or_else(|| Path::new("."));
        let repo = git2::Repository::discover(start).ok();
        let local_config = repo.as_ref().and_then(|repo| repo.config().ok());

        let project = match repo.as_ref().and_then(|repo| repo.workdir()) {
            Some(workdir) => ProjectConfig::load(workdir)?,
            None => None,
        };

        let config = Self::from_lookup(|key| {
            get_layered_value(
                key,
                project.as_ref(),
                local_config.as_ref(),
                global_config.as_ref(),
            )
        })?;

        debug!("Configuration loaded: {config:?}");
        Ok(config)
    }

    /// Build a configuration from a key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&ConfigKey) -> Option<String>,
    {
        let mut config = Self::default();
        for key in CONFIG_KEYS {
            if let Some(value) = lookup(key) {
                config.apply(key.name, &value)?;
            }
        }
        Ok(config)
    }

    /// Set a single key from its string form, validating the value
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "maxfilesize" => self.max_file_size_mb = parse_size(key, value)?,
            "maxbundlesize" => self.max_bundle_size_mb = parse_size(key, value)?,
            "sanitize" => self.sanitize = parse_bool(key, value)?,
            "includedocs" => self.include_docs = parse_bool(key, value)?,
            "outputdir" => {
                if value.trim().is_empty() {
                    return Err(anyhow!("'outputdir' cannot be empty"));
                }
                self.output_dir = value.trim().to_string();
            }
            "branchprefix" => self.branch_prefix = value.trim().to_string(),
            "templatesdir" => {
                self.templates_dir = if value.trim().is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value.trim()))
                };
            }
            "tokenizer" => self.count_tokens = parse_bool(key, value)?,
            _ => {
                let known: Vec<&str> = CONFIG_KEYS.iter().map(|k| k.name).collect();
                return Err(anyhow!(
                    "Unknown configuration key '{key}'. Known keys: {}",
                    known.join(", ")
                ));
            }
        }
        Ok(())
    }

    /// Current value of a key in its string form
    pub fn value_of(&self, key: &str) -> Option<String> {
        let value = match key {
            "maxfilesize" => self.max_file_size_mb.to_string(),
            "maxbundlesize" => self.max_bundle_size_mb.to_string(),
            "sanitize" => self.sanitize.to_string(),
            "includedocs" => self.include_docs.to_string(),
            "outputdir" => self.output_dir.clone(),
            "branchprefix" => self.branch_prefix.clone(),
            "templatesdir" => self
                .templates_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            "tokenizer" => self.count_tokens.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// All keys with their effective values, in display order
    pub fn entries(&self) -> Vec<(&'static ConfigKey, String)> {
        CONFIG_KEYS
            .iter()
            .map(|key| (key, self.value_of(key.name).unwrap_or_default()))
            .collect()
    }

    /// Maximum file size in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    /// Bundle split threshold in bytes, `None` when splitting is disabled
    pub fn max_bundle_size_bytes(&self) -> Option<usize> {
        if self.max_bundle_size_mb == 0 {
            None
        } else {
            usize::try_from(self.max_bundle_size_mb.saturating_mul(1024 * 1024)).ok()
        }
    }

    /// Validate and persist a key into the global git config
    pub fn set_global(key: &str, value: &str) -> Result<()> {
        let mut config = GitConfig::open_default().context("Failed to open global git config")?;
        Self::save_to_config(&mut config, key, value)
    }

    /// Validate and persist a key into the given git config
    pub fn save_to_config(config: &mut GitConfig, key: &str, value: &str) -> Result<()> {
        let key = key.trim().to_lowercase();
        let key = key.strip_prefix("gitllm.").unwrap_or(&key).to_string();

        // Reject bad values before touching the file
        let mut scratch = Self::default();
        scratch.apply(&key, value)?;

        config
            .set_str(&format!("{GIT_SECTION}.{key}"), value.trim())
            .with_context(|| format!("Failed to write {GIT_SECTION}.{key}"))?;
        debug!("Saved {GIT_SECTION}.{key} = {value}");
        Ok(())
    }
}
