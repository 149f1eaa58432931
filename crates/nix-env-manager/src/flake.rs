//! Flake working directory the candidates are built in.
//!
//! The workspace is a git-tracked flake whose `packages.<system>.default`
//! calls `./package.nix`. Every candidate overwrites `package.nix` and is
//! staged so Nix sees it.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::NixError;
use crate::runner::CommandRunner;
use crate::Result;

/// Flake used when no skeleton directory is supplied.
pub const DEFAULT_FLAKE: &str = r#"{
  inputs.nixpkgs.url = "github:NixOS/nixpkgs/nixos-unstable";

  outputs = { self, nixpkgs }:
    let
      systems = [ "x86_64-linux" "aarch64-linux" "x86_64-darwin" "aarch64-darwin" ];
      forAllSystems = f: nixpkgs.lib.genAttrs systems (system: f nixpkgs.legacyPackages.${system});
    in
    {
      packages = forAllSystems (pkgs: {
        default = pkgs.callPackage ./package.nix { };
      });
    };
}
"#;

const EMPTY_PACKAGE: &str = "{ stdenv }:\nstdenv.mkDerivation { }\n";

/// Which attribute a build pass targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTarget {
    /// `#default.src`: fetching the sources only.
    Source,
    /// `#default`: the whole package.
    Package,
}

#[derive(Debug, Clone)]
pub struct FlakeWorkspace {
    dir: PathBuf,
}

impl FlakeWorkspace {
    /// Create the workspace in `dir`, copying `skeleton` (a directory holding
    /// at least `flake.nix`) or writing [`DEFAULT_FLAKE`], then `git init`.
    pub async fn init(
        dir: &Path,
        skeleton: Option<&Path>,
        runner: &dyn CommandRunner,
    ) -> Result<Self> {
        info!(dir = %dir.display(), "creating flake workspace");
        std::fs::create_dir_all(dir)?;

        match skeleton {
            Some(src) => {
                if !src.join("flake.nix").is_file() {
                    return Err(NixError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("no flake.nix in skeleton {}", src.display()),
                    )));
                }
                copy_dir(src, dir)?;
            }
            None => std::fs::write(dir.join("flake.nix"), DEFAULT_FLAKE)?,
        }
        if !dir.join("package.nix").exists() {
            std::fs::write(dir.join("package.nix"), EMPTY_PACKAGE)?;
        }

        let workspace = Self {
            dir: dir.to_path_buf(),
        };
        workspace.git(runner, &["init", "-q"]).await?;
        workspace.git(runner, &["add", "-A"]).await?;
        Ok(workspace)
    }

    /// Use an already initialised workspace.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn package_path(&self) -> PathBuf {
        self.dir.join("package.nix")
    }

    /// Installable for `nix path-info`, e.g. `/tmp/nixpack#default.src`.
    pub fn installable(&self, target: BuildTarget) -> String {
        let suffix = match target {
            BuildTarget::Source => ".src",
            BuildTarget::Package => "",
        };
        format!("{}#default{}", self.dir.display(), suffix)
    }

    /// Overwrite `package.nix` with the candidate and stage it.
    pub async fn write_candidate(&self, text: &str, runner: &dyn CommandRunner) -> Result<()> {
        std::fs::write(self.package_path(), text)?;
        self.git(runner, &["add", "-A"]).await?;
        debug!(bytes = text.len(), "candidate written");
        Ok(())
    }

    async fn git(&self, runner: &dyn CommandRunner, args: &[&str]) -> Result<()> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let output = runner.run("git", &args, Some(&self.dir)).await?;
        if !output.success {
            return Err(NixError::Git(format!("git {}: {}", args.join(" "), output.stderr.trim())));
        }
        Ok(())
    }
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(".git") {
            continue;
        }
        let target = dst.join(&name);
        if path.is_dir() {
            copy_dir(&path, &target)?;
        } else {
            std::fs::copy(&path, &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::ScriptedRunner;
    use tempfile::tempdir;

    #[test]
    fn test_installable() {
        let ws = FlakeWorkspace::open("/tmp/nixpack-flake");
        assert_eq!(ws.installable(BuildTarget::Source), "/tmp/nixpack-flake#default.src");
        assert_eq!(ws.installable(BuildTarget::Package), "/tmp/nixpack-flake#default");
    }

    #[test]
    fn test_copy_dir_skips_git() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        std::fs::write(src.path().join("flake.nix"), "{ }").unwrap();
        std::fs::create_dir(src.path().join(".git")).unwrap();
        std::fs::create_dir(src.path().join("patches")).unwrap();
        std::fs::write(src.path().join("patches").join("fix.patch"), "--- a").unwrap();

        copy_dir(src.path(), dst.path()).unwrap();

        assert!(dst.path().join("flake.nix").is_file());
        assert!(dst.path().join("patches").join("fix.patch").is_file());
        assert!(!dst.path().join(".git").exists());
    }

    #[tokio::test]
    async fn test_init_without_skeleton_writes_default_flake() {
        let dir = tempdir().unwrap();
        let ws_dir = dir.path().join("flake");
        let runner = ScriptedRunner::default();
        let ws = FlakeWorkspace::init(&ws_dir, None, &runner).await.unwrap();

        let flake = std::fs::read_to_string(ws.dir().join("flake.nix")).unwrap();
        assert_eq!(flake, DEFAULT_FLAKE);
        assert!(ws.package_path().is_file());

        ws.write_candidate("{ stdenv }: stdenv.mkDerivation { pname = \"x\"; }", &runner)
            .await
            .unwrap();
        let written = std::fs::read_to_string(ws.package_path()).unwrap();
        assert!(written.contains("pname = \"x\""));
        assert_eq!(
            runner.calls(),
            vec!["git init -q", "git add -A", "git add -A"]
        );
    }

    #[tokio::test]
    async fn test_init_rejects_skeleton_without_flake() {
        let skeleton = tempdir().unwrap();
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::default();
        let err = FlakeWorkspace::init(dir.path(), Some(skeleton.path()), &runner)
            .await
            .unwrap_err();
        assert!(matches!(err, NixError::Io(_)));
    }
}
