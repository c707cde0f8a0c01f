//! Dockerfile generation.

use askama::Template;
use hoist_core::{BuildConfig, Error, Result, Tag};
use std::path::{Component, Path, PathBuf};

use crate::context::CONTEXT_DIR;

/// Where the project lives inside the image.
pub const PROJECT_DIR: &str = "/opt/project";

const MANIFEST: &str = "requirements.txt";

#[derive(Template)]
#[template(path = "Dockerfile.txt")]
struct DockerfileTemplate<'a> {
    base_image: &'a str,
    labels: Vec<String>,
    context_dir: &'a str,
    project_dir: &'a str,
    has_requirements: bool,
    entrypoint: String,
}

/// The image the generated Dockerfile builds `FROM`.
pub fn base_image(config: &BuildConfig, namespace: &str) -> String {
    match config.base_image.as_deref().map(str::trim) {
        Some(image) if !image.is_empty() => image.to_string(),
        _ => format!(
            "{}/{}:{}-py{}-{}",
            namespace, config.framework, config.version, config.pyversion, config.resource
        ),
    }
}

/// Image labels in order: caller tags, then `hoist.namespace` and `hoist.name`.
pub fn labels(config: &BuildConfig, tags: &[Tag]) -> Vec<(String, String)> {
    tags.iter()
        .map(|t| (t.name.clone(), t.value.clone()))
        .chain([
            ("hoist.namespace".to_string(), config.namespace.clone()),
            ("hoist.name".to_string(), config.name.clone()),
        ])
        .collect()
}

fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Render the Dockerfile for a tree without one of its own.
pub fn render_dockerfile(
    config: &BuildConfig,
    tags: &[Tag],
    has_requirements: bool,
    namespace: &str,
) -> Result<String> {
    let entry = config.entry.trim().trim_start_matches('/');
    if entry.is_empty() {
        return Err(Error::Build(
            "Entry cannot be blank without a custom Dockerfile".to_string(),
        ));
    }

    let base_image = base_image(config, namespace);
    let entrypoint = serde_json::to_string(&["python", &format!("{}/{}", PROJECT_DIR, entry)])
        .map_err(|e| Error::Internal(e.to_string()))?;

    let template = DockerfileTemplate {
        base_image: &base_image,
        labels: labels(config, tags)
            .iter()
            .map(|(name, value)| format!("{}={}", quote(name), quote(value)))
            .collect(),
        context_dir: CONTEXT_DIR,
        project_dir: PROJECT_DIR,
        has_requirements,
        entrypoint,
    };

    template
        .render()
        .map_err(|e| Error::Build(format!("failed to render Dockerfile: {}", e)))
}

/// Whether the tree declares Python dependencies at its root.
pub async fn has_requirements(tree: &Path) -> bool {
    tokio::fs::metadata(tree.join(MANIFEST))
        .await
        .is_ok_and(|m| m.is_file())
}

/// Resolve a tree-relative Dockerfile path, refusing anything outside the tree.
pub fn resolve_in_tree(tree: &Path, relative: &str) -> Result<PathBuf> {
    let relative = Path::new(relative.trim());
    let escapes = relative.as_os_str().is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(Error::Build(format!(
            "Dockerfile path `{}` must be relative to the source tree",
            relative.display()
        )));
    }
    Ok(tree.join(relative))
}

/// Read a user-supplied Dockerfile verbatim.
pub async fn read_custom(tree: &Path, relative: &str) -> Result<String> {
    let path = resolve_in_tree(tree, relative)?;

    let canonical_tree = tokio::fs::canonicalize(tree)
        .await
        .map_err(|e| Error::Build(format!("source tree unavailable: {}", e)))?;
    let canonical = tokio::fs::canonicalize(&path).await.map_err(|_| {
        Error::Build(format!("Dockerfile `{}` does not exist", relative))
    })?;
    if !canonical.starts_with(&canonical_tree) {
        return Err(Error::Build(format!(
            "Dockerfile `{}` resolves outside the source tree",
            relative
        )));
    }

    tokio::fs::read_to_string(&canonical)
        .await
        .map_err(|e| Error::Build(format!("failed to read Dockerfile `{}`: {}", relative, e)))
}

/// The image of the first `FROM` instruction.
pub fn first_from(dockerfile: &str) -> Option<String> {
    dockerfile
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .find_map(|line| {
            let mut words = line.split_whitespace();
            let instruction = words.next()?;
            if !instruction.eq_ignore_ascii_case("FROM") {
                return None;
            }
            words.find(|w| !w.starts_with("--")).map(str::to_string)
        })
}
