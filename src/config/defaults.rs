//! Default configuration values

/// Manifest file looked up in the working directory
pub const MANIFEST_FILE: &str = "stages.toml";

/// Branch used for revision lookup when none is configured
pub const DEFAULT_BRANCH: &str = "master";

/// Branches accepted when the configured branch does not exist upstream
pub const FALLBACK_BRANCHES: &[&str] = &["master", "main"];

/// Base image of every stage when the manifest does not name one
pub const DEFAULT_BASE_IMAGE: &str = "ubuntu:noble";

/// Install prefix copied between stages
pub const DEFAULT_PREFIX: &str = "/usr/local";

/// Host used to derive a package repository from its name
pub const DEFAULT_GIT_HOST: &str = "https://github.com";

/// Number of hex characters of the content hash kept in a tag
pub const TAG_HASH_LEN: usize = 16;

/// Maximum time spent retrying a branch listing (in seconds)
pub const LS_REMOTE_MAX_ELAPSED_SECS: u64 = 60;

/// Lines of builder stderr kept in error messages
pub const BUILD_ERROR_TAIL_LINES: usize = 20;

/// Stage name of the final combined image; no package may use it
pub const FINAL_STAGE: &str = "final";
