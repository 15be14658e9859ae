//! Framework and tooling detection from manifest files

use log::debug;
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::path::Path;

/// Dependency name -> framework label, per ecosystem
const CARGO_FRAMEWORKS: &[(&str, &str)] = &[
    ("tokio", "Tokio"),
    ("axum", "Axum"),
    ("actix-web", "Actix Web"),
    ("rocket", "Rocket"),
    ("clap", "Clap"),
];

const NODE_FRAMEWORKS: &[(&str, &str)] = &[
    ("react", "React"),
    ("vue", "Vue"),
    ("@angular/core", "Angular"),
    ("express", "Express"),
    ("next", "Next.js"),
    ("svelte", "Svelte"),
];

const PYTHON_FRAMEWORKS: &[(&str, &str)] = &[
    ("django", "Django"),
    ("flask", "Flask"),
    ("fastapi", "FastAPI"),
    ("pytest", "pytest"),
];

/// Detect frameworks and build tooling by looking at the given relative paths
/// and reading the manifests among them.
///
/// The result preserves detection order so the first entry can serve as the
/// primary framework.
pub fn detect_frameworks(root: &Path, paths: &[String]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut seen = BTreeSet::new();
    let mut push = |name: &str| {
        if seen.insert(name.to_string()) {
            found.push(name.to_string());
        }
    };

    // Only manifests at the repository root decide the primary stack
    let has_root = |name: &str| paths.iter().any(|p| p == name);

    if has_root("Cargo.toml") {
        for dep in cargo_frameworks(&root.join("Cargo.toml")) {
            push(dep);
        }
        push("Cargo");
    }
    if has_root("package.json") {
        for dep in node_frameworks(&root.join("package.json")) {
            push(dep);
        }
        push("Node.js");
    }
    if has_root("requirements.txt") || has_root("pyproject.toml") || has_root("setup.py") {
        for dep in python_frameworks(root) {
            push(dep);
        }
        push("Python packaging");
    }
    if has_root("go.mod") {
        push("Go modules");
    }
    if has_root("pom.xml") {
        push("Maven");
    }
    if has_root("build.gradle") || has_root("build.gradle.kts") {
        push("Gradle");
    }
    if has_root("Gemfile") {
        if read(&root.join("Gemfile")).is_some_and(|text| text.contains("rails")) {
            push("Rails");
        }
        push("Bundler");
    }
    if has_root("composer.json") {
        push("Composer");
    }

    for path in paths {
        let name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if name == "Dockerfile" || name.starts_with("docker-compose") {
            push("Docker");
        } else if name == "CMakeLists.txt" {
            push("CMake");
        } else if name == "Makefile" {
            push("Make");
        }
    }

    debug!("Detected frameworks: {found:?}");
    found
}

fn read(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

fn cargo_frameworks(manifest: &Path) -> Vec<&'static str> {
    let Some(text) = read(manifest) else {
        return Vec::new();
    };
    let Ok(value) = toml::from_str::<toml::Value>(&text) else {
        debug!("Could not parse {}", manifest.display());
        return Vec::new();
    };

    let mut deps: BTreeSet<String> = BTreeSet::new();
    for table in ["dependencies", "dev-dependencies"] {
        if let Some(table) = value.get(table).and_then(toml::Value::as_table) {
            deps.extend(table.keys().cloned());
        }
    }
    if let Some(table) = value
        .get("workspace")
        .and_then(|w| w.get("dependencies"))
        .and_then(toml::Value::as_table)
    {
        deps.extend(table.keys().cloned());
    }

    CARGO_FRAMEWORKS
        .iter()
        .filter(|(dep, _)| deps.contains(*dep))
        .map(|(_, label)| *label)
        .collect()
}

fn node_frameworks(manifest: &Path) -> Vec<&'static str> {
    let Some(text) = read(manifest) else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<JsonValue>(&text) else {
        debug!("Could not parse {}", manifest.display());
        return Vec::new();
    };

    let has_dep = |dep: &str| {
        ["dependencies", "devDependencies", "peerDependencies"]
            .iter()
            .any(|section| value.get(section).and_then(|s| s.get(dep)).is_some())
    };

    NODE_FRAMEWORKS
        .iter()
        .filter(|(dep, _)| has_dep(dep))
        .map(|(_, label)| *label)
        .collect()
}

fn python_frameworks(root: &Path) -> Vec<&'static str> {
    let mut text = String::new();
    for manifest in ["requirements.txt", "pyproject.toml", "setup.py"] {
        if let Some(content) = read(&root.join(manifest)) {
            text.push_str(&content.to_lowercase());
            text.push('\n');
        }
    }

    PYTHON_FRAMEWORKS
        .iter()
        .filter(|(dep, _)| {
            text.lines().any(|line| {
                let line = line.trim().trim_start_matches(['"', '\'']);
                line.starts_with(dep)
                    && !line[dep.len()..]
                        .starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            })
        })
        .map(|(_, label)| *label)
        .collect()
}
