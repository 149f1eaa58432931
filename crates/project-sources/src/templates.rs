//! Recipe templates stored as `<dir>/<id>.nix` with optional `<dir>/<id>.notes`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nixpack_core::{Template, TemplateId, TemplateProvider};
use tracing::{debug, info};

use crate::error::SourceError;
use crate::Result;

pub const GENERIC_TEMPLATE: &str = "generic";

/// Ecosystem markers, checked in order; the first hit wins.
const MARKERS: &[(&str, &[&str])] = &[
    ("rust", &["cargo.toml", "cargo build", "cargo install", "crates.io"]),
    ("go", &["go.mod", "go build", "go install"]),
    ("python", &["pyproject.toml", "setup.py", "pip install"]),
    ("javascript", &["package.json", "npm install", "yarn add", "pnpm"]),
    ("c", &["cmakelists.txt", "cmake", "meson.build", "./configure", "makefile"]),
];

/// Template id suggested by the project page text.
pub fn match_template(page_text: &str) -> TemplateId {
    let lower = page_text.to_lowercase();
    MARKERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| lower.contains(m)))
        .map(|(id, _)| TemplateId::new(*id))
        .unwrap_or_else(|| TemplateId::new(GENERIC_TEMPLATE))
}

#[derive(Debug, Clone)]
pub struct DirectoryTemplates {
    dir: PathBuf,
}

impl DirectoryTemplates {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn template_path(&self, id: &TemplateId) -> PathBuf {
        self.dir.join(format!("{id}.nix"))
    }

    /// Ids of every `.nix` file in the directory, sorted.
    pub async fn available(&self) -> Result<Vec<TemplateId>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "nix") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(TemplateId::new(stem));
                }
            }
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    async fn load_template(&self, id: &TemplateId) -> Result<Template> {
        let path = self.template_path(id);
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            SourceError::Template(format!("cannot read {}: {e}", path.display()))
        })?;
        let notes_path = self.dir.join(format!("{id}.notes"));
        let notes = match tokio::fs::read_to_string(&notes_path).await {
            Ok(notes) => Some(notes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        debug!(template = %id, has_notes = notes.is_some(), "loaded template");
        Ok(Template { id: id.clone(), text, notes })
    }
}

#[async_trait]
impl TemplateProvider for DirectoryTemplates {
    /// Falls back to the generic template when the matched one is not on disk.
    async fn select(&self, page_text: &str) -> nixpack_core::Result<TemplateId> {
        let matched = match_template(page_text);
        if tokio::fs::try_exists(self.template_path(&matched)).await.unwrap_or(false) {
            info!(template = %matched, "selected template");
            Ok(matched)
        } else {
            info!(wanted = %matched, "template not available, using generic");
            Ok(TemplateId::new(GENERIC_TEMPLATE))
        }
    }

    async fn load(&self, id: &TemplateId) -> nixpack_core::Result<Template> {
        Ok(self.load_template(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_template() {
        assert_eq!(match_template("Install with `cargo install rg`").as_str(), "rust");
        assert_eq!(match_template("Requires go.mod and Go 1.22").as_str(), "go");
        assert_eq!(match_template("pip install foo").as_str(), "python");
        assert_eq!(match_template("see package.json").as_str(), "javascript");
        assert_eq!(match_template("Build with CMake").as_str(), "c");
        assert_eq!(match_template("A nice tool").as_str(), GENERIC_TEMPLATE);
    }
}
