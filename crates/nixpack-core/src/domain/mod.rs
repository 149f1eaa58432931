//! Domain models for nixpack.
//!
//! - `BuildReport` / `RawFailure`: what the executor saw
//! - `BuildResult` / `BuildError`: the classified view the repair loop acts on
//! - `Solution`: an immutable candidate snapshot

pub mod build;
pub mod error;
pub mod solution;

pub use build::{BuildError, BuildReport, BuildResult, ErrorKind, FailureStage, RawFailure};
pub use error::{PackagingError, Result};
pub use solution::Solution;
