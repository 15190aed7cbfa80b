//! Manifest (stages.toml) parsing and validation
//!
//! The manifest holds the image settings and the ordered package table.
//! Package order in the file is the order stages are created and joined in.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::config::defaults;
use crate::error::ManifestError;

/// The main manifest (stages.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Image configuration
    #[serde(default)]
    pub image: ImageConfig,

    /// Packages, in declaration order
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageSpec>,
}

/// Image-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageConfig {
    /// Tag repository name (e.g. `openbmc/ubuntu-unit-test`)
    #[serde(default = "default_image_name")]
    pub name: String,

    /// Optional registry prefixed to the repository name
    #[serde(default)]
    pub registry: Option<String>,

    /// Base image every stage starts `FROM`
    #[serde(default = "default_base")]
    pub base: String,

    /// Branch used to resolve unpinned revisions
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Install prefix copied from dependency stages
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Host used to derive repositories for packages without `repo`
    #[serde(default = "default_git_host")]
    pub git_host: String,

    /// Extra steps run in the final image
    #[serde(default)]
    pub final_steps: Vec<String>,
}

fn default_image_name() -> String {
    "stagebuild".to_string()
}

fn default_base() -> String {
    defaults::DEFAULT_BASE_IMAGE.to_string()
}

fn default_branch() -> String {
    defaults::DEFAULT_BRANCH.to_string()
}

fn default_prefix() -> String {
    defaults::DEFAULT_PREFIX.to_string()
}

fn default_git_host() -> String {
    defaults::DEFAULT_GIT_HOST.to_string()
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            name: default_image_name(),
            registry: None,
            base: default_base(),
            branch: default_branch(),
            prefix: default_prefix(),
            git_host: default_git_host(),
            final_steps: Vec::new(),
        }
    }
}

impl ImageConfig {
    /// Repository part of every tag, including the registry if any
    ///
    /// Lowercased, as image references do not allow uppercase repositories.
    pub fn repository(&self) -> String {
        let repository = match self.registry.as_deref() {
            Some(registry) if !registry.is_empty() => {
                format!("{}/{}", registry.trim_end_matches('/'), self.name)
            }
            _ => self.name.clone(),
        };
        repository.to_lowercase()
    }
}

/// A buildable package
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PackageSpec {
    /// Unique package name, usually `owner/repo`
    pub name: String,

    /// Names of packages whose stages this one copies from
    #[serde(default)]
    pub depends: Vec<String>,

    /// Statically pinned revision
    #[serde(default)]
    pub rev: Option<String>,

    /// Repository used for revision lookup (defaults to `<git_host>/<name>`)
    #[serde(default)]
    pub repo: Option<String>,

    /// Source archive URL template
    #[serde(default)]
    pub url: Option<String>,

    /// Shell steps run inside the source directory
    #[serde(default)]
    pub steps: Vec<String>,
}

impl PackageSpec {
    /// Create a package with no dependencies and no recipe
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Set dependencies
    #[must_use]
    pub fn with_depends(mut self, depends: &[&str]) -> Self {
        self.depends = depends.iter().map(ToString::to_string).collect();
        self
    }

    /// Pin a revision
    #[must_use]
    pub fn with_rev(mut self, rev: &str) -> Self {
        self.rev = Some(rev.to_string());
        self
    }

    /// Set build steps
    #[must_use]
    pub fn with_steps(mut self, steps: &[&str]) -> Self {
        self.steps = steps.iter().map(ToString::to_string).collect();
        self
    }

    /// Stage name: `/` replaced by `-`, lowercased
    pub fn stage_name(&self) -> String {
        self.name.replace('/', "-").to_lowercase()
    }

    /// Last path segment of the name (`openbmc/sdbusplus` -> `sdbusplus`)
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Repository used for revision lookup
    pub fn repository(&self, git_host: &str) -> String {
        self.repo
            .clone()
            .unwrap_or_else(|| format!("{}/{}", git_host.trim_end_matches('/'), self.name))
    }
}

impl Manifest {
    /// Parse and validate a manifest from TOML
    pub fn from_toml(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self =
            toml::from_str(content).map_err(|e| ManifestError::ParseError(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load a manifest from disk
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::IoError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Check names are present and unique, and map to distinct stage names
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut seen = HashSet::new();
        let mut stages: HashMap<String, &str> = HashMap::new();
        for (index, pkg) in self.packages.iter().enumerate() {
            if pkg.name.trim().is_empty() {
                return Err(ManifestError::EmptyName { index });
            }
            if !seen.insert(pkg.name.as_str()) {
                return Err(ManifestError::DuplicatePackage {
                    name: pkg.name.clone(),
                });
            }
            let stage = pkg.stage_name();
            if stage == defaults::FINAL_STAGE {
                return Err(ManifestError::ReservedStageName {
                    name: pkg.name.clone(),
                });
            }
            if let Some(first) = stages.insert(stage.clone(), &pkg.name) {
                return Err(ManifestError::StageNameCollision {
                    first: first.to_string(),
                    second: pkg.name.clone(),
                    stage,
                });
            }
        }
        Ok(())
    }

    /// Look up a package by name
    pub fn package(&self, name: &str) -> Option<&PackageSpec> {
        self.packages.iter().find(|p| p.name == name)
    }
}
