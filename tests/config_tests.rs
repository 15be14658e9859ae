use anyhow::Result;
use gitllm::config::{CONFIG_KEYS, Config, PROJECT_CONFIG_FILE};
use tempfile::TempDir;

#[path = "test_utils.rs"]
mod test_utils;
use test_utils::{setup_git_repo, write_file};

#[test]
fn test_project_file_overrides_git_config() -> Result<()> {
    let (temp_dir, git_repo) = setup_git_repo();
    {
        let repo = git_repo.open_repo()?;
        let mut local = repo.config()?;
        local.set_str("gitllm.maxfilesize", "7")?;
        local.set_str("gitllm.branchprefix", "ai/")?;
    }
    write_file(
        temp_dir.path(),
        PROJECT_CONFIG_FILE,
        "max_file_size = 3\ninclude_docs = false\n",
    );

    let config = Config::load(Some(temp_dir.path()))?;
    // Project file wins over local git config
    assert_eq!(config.max_file_size_mb, 3);
    assert!(!config.include_docs);
    // Keys the project file leaves out fall through to git config
    assert_eq!(config.branch_prefix, "ai/");
    Ok(())
}

#[test]
fn test_load_from_subdirectory_finds_project_file() -> Result<()> {
    let (temp_dir, _git_repo) = setup_git_repo();
    write_file(temp_dir.path(), PROJECT_CONFIG_FILE, "output_dir = \"bundle\"\n");

    let config = Config::load(Some(&temp_dir.path().join("src")))?;
    assert_eq!(config.output_dir, "bundle");
    Ok(())
}

#[test]
fn test_invalid_project_file_is_an_error() {
    let (temp_dir, _git_repo) = setup_git_repo();
    write_file(temp_dir.path(), PROJECT_CONFIG_FILE, "max_file_size = \"big\"\n");
    assert!(Config::load(Some(temp_dir.path())).is_err());
}

#[test]
fn test_save_to_config_validates_before_writing() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("gitconfig");
    std::fs::write(&path, "")?;
    let mut git_config = git2::Config::open(&path)?;

    Config::save_to_config(&mut git_config, "gitllm.MaxFileSize", " 5 ")?;
    assert!(Config::save_to_config(&mut git_config, "sanitize", "sometimes").is_err());
    assert!(Config::save_to_config(&mut git_config, "colour", "blue").is_err());

    let reread = git2::Config::open(&path)?;
    assert_eq!(reread.get_string("gitllm.maxfilesize")?, "5");
    assert!(reread.get_string("gitllm.sanitize").is_err());
    Ok(())
}

#[test]
fn test_entries_cover_every_key() {
    let config = Config::default();
    let entries = config.entries();
    assert_eq!(entries.len(), CONFIG_KEYS.len());
    for (key, value) in entries {
        assert_eq!(config.value_of(key.name).as_deref(), Some(value.as_str()));
        assert!(key.env.starts_with("GIT_LLM_"));
    }
}
