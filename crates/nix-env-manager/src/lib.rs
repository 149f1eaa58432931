//! nix-env-manager: the Nix side of nixpack
//!
//! Keeps a git-tracked flake workspace whose `package.nix` is overwritten
//! with every candidate, evaluates candidates in two passes (`src`, then the
//! whole package) through the `nix` CLI, and repairs fixed-output hashes
//! from Nix's mismatch reports.

pub mod error;
pub mod executor;
pub mod flake;
pub mod hash_fix;
pub mod runner;

pub use error::NixError;
pub use executor::{
    interpret_build, interpret_instantiate, interpret_log, BuildStep, NixBuildExecutor,
};
pub use flake::{BuildTarget, FlakeWorkspace, DEFAULT_FLAKE};
pub use hash_fix::{parse_mismatch, replace_hash, HashMismatch, PlaceholderHashFixer};
pub use runner::{is_nix_available, nix_version, CommandOutput, CommandRunner, ProcessRunner};

/// Result type for nix-env-manager operations
pub type Result<T> = std::result::Result<T, NixError>;
