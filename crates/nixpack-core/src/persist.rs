//! Writes accepted recipes to durable storage.
//!
//! Layout: `<output_dir>/<pname>/package.nix` plus a `provenance.json`
//! describing where the recipe came from.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::digest::sha256_hex;
use crate::domain::{PackagingError, Result};

static PNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"pname\s*=\s*"([^"]+)""#).expect("PNAME_RE regex should compile")
});

/// Extract the package name from `pname = "<name>"`.
///
/// The name becomes a directory under the output directory, so it must be
/// a single plain path component.
pub fn package_name(candidate_text: &str) -> Result<String> {
    let pname = PNAME_RE
        .captures(candidate_text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| PackagingError::Naming("no pname attribute in recipe".to_string()))?;
    validate_pname(&pname)?;
    Ok(pname)
}

fn validate_pname(pname: &str) -> Result<()> {
    if pname.contains(['/', '\\', '\0']) || pname.contains("..") || pname.starts_with('.') {
        return Err(PackagingError::Naming(format!(
            "pname {pname:?} is not a plain directory name"
        )));
    }
    Ok(())
}

/// Facts about a run recorded next to the saved recipe.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecipeMetadata {
    pub project_url: String,
    pub template: Option<String>,
    pub run_id: Option<String>,
    pub outer_iterations: u32,
    pub evaluations: u32,
}

/// Contents of `provenance.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub pname: String,
    #[serde(flatten)]
    pub metadata: RecipeMetadata,
    pub recipe_sha256: String,
    pub saved_at: DateTime<Utc>,
}

pub struct ResultPersister {
    output_dir: PathBuf,
}

impl ResultPersister {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write the recipe verbatim and return the path of `package.nix`.
    pub fn save(&self, candidate_text: &str, metadata: &RecipeMetadata) -> Result<PathBuf> {
        let pname = package_name(candidate_text)?;
        let package_dir = self.output_dir.join(&pname);
        std::fs::create_dir_all(&package_dir)?;

        let recipe_path = package_dir.join("package.nix");
        std::fs::write(&recipe_path, candidate_text)?;

        let provenance = Provenance {
            pname: pname.clone(),
            metadata: metadata.clone(),
            recipe_sha256: sha256_hex(candidate_text.as_bytes()),
            saved_at: Utc::now(),
        };
        std::fs::write(
            package_dir.join("provenance.json"),
            serde_json::to_vec_pretty(&provenance)?,
        )?;

        info!(pname = %pname, path = %recipe_path.display(), "recipe saved");
        Ok(recipe_path)
    }

    /// Read back the provenance of a previously saved package.
    pub fn provenance(&self, pname: &str) -> Result<Provenance> {
        validate_pname(pname)?;
        let bytes = std::fs::read(self.output_dir.join(pname).join("provenance.json"))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
