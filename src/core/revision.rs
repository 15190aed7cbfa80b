//! Revision resolution
//!
//! Packages without a pinned `rev` are built from the head of a branch on
//! their upstream repository. The branch list comes from a [`BranchLister`].

use crate::config::defaults;
use crate::core::manifest::PackageSpec;
use crate::error::GitError;

/// A branch head on a remote repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBranch {
    /// Branch name without the `refs/heads/` prefix
    pub name: String,
    /// Commit the branch points at
    pub commit: String,
}

impl RemoteBranch {
    /// Create a branch entry
    pub fn new(name: &str, commit: &str) -> Self {
        Self {
            name: name.to_string(),
            commit: commit.to_string(),
        }
    }
}

/// Lists the branches of a remote repository
///
/// Implementations may block; callers run them off the async executor.
pub trait BranchLister: Send + Sync {
    /// Return every branch head of `repo`
    fn list_branches(&self, repo: &str) -> Result<Vec<RemoteBranch>, GitError>;
}

/// Where a resolved revision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionSource {
    /// `rev` in the manifest
    Pinned,
    /// `--pin-project`/`--pin-rev` override
    Override,
    /// Exact match of the configured branch
    Branch,
    /// `master` or `main` because the configured branch was missing
    Fallback,
}

/// How unpinned revisions are chosen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionPolicy {
    /// Branch looked up upstream
    pub branch: String,
    /// Package whose revision is supplied externally (e.g. a change under review)
    pub pin_project: Option<String>,
    /// Revision used for `pin_project`
    pub pin_rev: Option<String>,
}

impl RevisionPolicy {
    /// Policy that follows `branch`
    pub fn new(branch: &str) -> Self {
        Self {
            branch: branch.to_string(),
            ..Self::default()
        }
    }

    /// Revision from the manifest or the override, if any
    pub fn static_revision(&self, spec: &PackageSpec) -> Option<(String, RevisionSource)> {
        if let Some(rev) = &spec.rev {
            return Some((rev.clone(), RevisionSource::Pinned));
        }
        match (&self.pin_project, &self.pin_rev) {
            (Some(project), Some(rev)) if *project == spec.name && !rev.is_empty() => {
                Some((rev.clone(), RevisionSource::Override))
            }
            _ => None,
        }
    }
}

/// Pick a revision from a branch listing
///
/// An exact match of `branch` anywhere in the list wins. Otherwise the first
/// fallback branch (`master`/`main`) in list order is used.
pub fn select_revision(branches: &[RemoteBranch], branch: &str) -> Option<(String, RevisionSource)> {
    if let Some(exact) = branches.iter().find(|b| b.name == branch) {
        return Some((exact.commit.clone(), RevisionSource::Branch));
    }
    branches
        .iter()
        .find(|b| defaults::FALLBACK_BRANCHES.contains(&b.name.as_str()))
        .map(|b| (b.commit.clone(), RevisionSource::Fallback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn listing() -> Vec<RemoteBranch> {
        vec![
            RemoteBranch::new("feature", "f00"),
            RemoteBranch::new("main", "a11"),
            RemoteBranch::new("master", "b22"),
            RemoteBranch::new("release-1", "c33"),
        ]
    }

    #[test]
    fn test_exact_branch_wins_even_after_fallback() {
        assert_eq!(
            select_revision(&listing(), "release-1"),
            Some(("c33".to_string(), RevisionSource::Branch))
        );
    }

    #[test]
    fn test_first_fallback_in_list_order() {
        assert_eq!(
            select_revision(&listing(), "release-2"),
            Some(("a11".to_string(), RevisionSource::Fallback))
        );
    }

    #[test]
    fn test_exact_master_is_not_a_fallback() {
        assert_eq!(
            select_revision(&listing(), "master"),
            Some(("b22".to_string(), RevisionSource::Branch))
        );
    }

    #[test]
    fn test_no_match_and_no_fallback() {
        let branches = vec![RemoteBranch::new("dev", "d44")];
        assert_eq!(select_revision(&branches, "master"), None);
        assert_eq!(select_revision(&[], "master"), None);
    }

    #[test]
    fn test_manifest_rev_beats_override() {
        let policy = RevisionPolicy {
            branch: "master".to_string(),
            pin_project: Some("openbmc/sdbusplus".to_string()),
            pin_rev: Some("review".to_string()),
        };
        let pinned = PackageSpec::new("openbmc/sdbusplus").with_rev("v1");
        let unpinned = PackageSpec::new("openbmc/sdbusplus");
        let other = PackageSpec::new("openbmc/phosphor-logging");

        assert_eq!(
            policy.static_revision(&pinned),
            Some(("v1".to_string(), RevisionSource::Pinned))
        );
        assert_eq!(
            policy.static_revision(&unpinned),
            Some(("review".to_string(), RevisionSource::Override))
        );
        assert_eq!(policy.static_revision(&other), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The selected commit always belongs to a listed branch, and an
        /// exact match is chosen whenever one exists.
        #[test]
        fn prop_selection_comes_from_listing(
            names in proptest::collection::vec("[a-z]{1,6}", 0..8),
            wanted in "[a-z]{1,6}",
        ) {
            let branches: Vec<RemoteBranch> = names
                .iter()
                .enumerate()
                .map(|(i, n)| RemoteBranch::new(n, &format!("{i:040x}")))
                .collect();

            match select_revision(&branches, &wanted) {
                Some((commit, source)) => {
                    let owner = branches.iter().find(|b| b.commit == commit).unwrap();
                    if source == RevisionSource::Branch {
                        prop_assert_eq!(&owner.name, &wanted);
                    } else {
                        prop_assert!(!names.contains(&wanted));
                        prop_assert!(owner.name == "master" || owner.name == "main");
                    }
                }
                None => {
                    prop_assert!(!names.contains(&wanted));
                    prop_assert!(!names.iter().any(|n| n == "master" || n == "main"));
                }
            }
        }
    }
}
