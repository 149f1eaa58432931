//! project-sources: what nixpack knows before the first draft
//!
//! Scrapes project pages to plain text, looks up the latest GitHub release
//! (falling back to tags) and serves recipe templates from a directory.

pub mod error;
pub mod github;
pub mod html;
pub mod templates;

pub use error::SourceError;
pub use github::{latest_tag_from_json, parse_github_repo, release_from_json, GithubProjectProvider};
pub use html::html_to_text;
pub use templates::{match_template, DirectoryTemplates, GENERIC_TEMPLATE};

/// Result type for project-sources operations
pub type Result<T> = std::result::Result<T, SourceError>;
