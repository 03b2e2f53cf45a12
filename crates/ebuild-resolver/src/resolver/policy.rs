use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use ebuild_atom::Atom;

use crate::package::Package;

/// Ordering strategy for the candidates of a single atom.
///
/// `Less` means `a` is tried before `b`.
pub trait CandidateOrder {
    fn compare(&self, a: &Package, b: &Package) -> Ordering;
}

impl<F> CandidateOrder for F
where
    F: Fn(&Package, &Package) -> Ordering,
{
    fn compare(&self, a: &Package, b: &Package) -> Ordering {
        self(a, b)
    }
}

/// Where installed packages go relative to source candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepoPreference {
    /// Installed and source candidates are ordered together
    #[default]
    Mixed,
    LivefsFirst,
    LivefsLast,
}

/// Candidate selection policy handed to [`MergePlan`](super::MergePlan).
///
/// Policies change which valid plan is found first, never whether one is.
#[derive(Clone)]
pub struct Policy {
    name: &'static str,
    order: Arc<dyn CandidateOrder + Send + Sync>,
    repos: RepoPreference,
}

impl Policy {
    /// Order candidates with a custom strategy
    pub fn new<O>(name: &'static str, order: O) -> Self
    where
        O: CandidateOrder + Send + Sync + 'static,
    {
        Self {
            name,
            order: Arc::new(order),
            repos: RepoPreference::Mixed,
        }
    }

    /// Highest version first
    pub fn highest() -> Self {
        Self::new("highest", |a: &Package, b: &Package| b.version().cmp(a.version()))
    }

    /// Lowest version first
    pub fn lowest() -> Self {
        Self::new("lowest", |a: &Package, b: &Package| a.version().cmp(b.version()))
    }

    /// Keep what is installed where possible, otherwise the highest version
    pub fn reuse() -> Self {
        let mut policy = Self::highest().livefs_first();
        policy.name = "reuse";
        policy
    }

    /// Prefer anything outside `restrict`, highest first, so matching
    /// versions are only picked as a last resort.
    pub fn downgrade(restrict: Atom) -> Self {
        Self::new("downgrade", move |a: &Package, b: &Package| {
            restrict
                .matches(a)
                .cmp(&restrict.matches(b))
                .then_with(|| b.version().cmp(a.version()))
        })
    }

    pub fn livefs_first(mut self) -> Self {
        self.repos = RepoPreference::LivefsFirst;
        self
    }

    pub fn livefs_last(mut self) -> Self {
        self.repos = RepoPreference::LivefsLast;
        self
    }

    pub fn mixed(mut self) -> Self {
        self.repos = RepoPreference::Mixed;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn repo_preference(&self) -> RepoPreference {
        self.repos
    }

    /// Order the matches gathered from each repository, given as
    /// `(livefs, matches)` in repository order.
    ///
    /// The sort is stable, so equal candidates keep repository order.
    pub fn order(&self, per_repo: Vec<(bool, Vec<Arc<Package>>)>) -> Vec<Arc<Package>> {
        let compare = |a: &Arc<Package>, b: &Arc<Package>| self.order.compare(a, b);
        match self.repos {
            RepoPreference::Mixed => {
                let mut all: Vec<_> = per_repo.into_iter().flat_map(|(_, pkgs)| pkgs).collect();
                all.sort_by(compare);
                all
            }
            RepoPreference::LivefsFirst | RepoPreference::LivefsLast => {
                let (mut livefs, mut source): (Vec<_>, Vec<_>) = (Vec::new(), Vec::new());
                for (is_livefs, pkgs) in per_repo {
                    if is_livefs {
                        livefs.extend(pkgs);
                    } else {
                        source.extend(pkgs);
                    }
                }
                livefs.sort_by(compare);
                source.sort_by(compare);
                if self.repos == RepoPreference::LivefsFirst {
                    livefs.extend(source);
                    livefs
                } else {
                    source.extend(livefs);
                    source
                }
            }
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::highest()
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("name", &self.name)
            .field("repos", &self.repos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::RepoId;

    fn pkg(cpv: &str, repo: &str, livefs: bool) -> Arc<Package> {
        Arc::new(
            Package::builder(cpv)
                .repo(RepoId::new(repo, livefs))
                .build()
                .unwrap(),
        )
    }

    fn cpvs(pkgs: &[Arc<Package>]) -> Vec<String> {
        pkgs.iter().map(|p| p.to_string()).collect()
    }

    fn candidates() -> Vec<(bool, Vec<Arc<Package>>)> {
        vec![
            (true, vec![pkg("dev-libs/a-1", "vdb", true)]),
            (
                false,
                vec![
                    pkg("dev-libs/a-1", "gentoo", false),
                    pkg("dev-libs/a-2", "gentoo", false),
                    pkg("dev-libs/a-0.5", "gentoo", false),
                ],
            ),
        ]
    }

    #[test]
    fn test_highest_is_stable() {
        let ordered = Policy::highest().order(candidates());
        assert_eq!(
            cpvs(&ordered),
            vec![
                "dev-libs/a-2:0::gentoo",
                "dev-libs/a-1:0::vdb",
                "dev-libs/a-1:0::gentoo",
                "dev-libs/a-0.5:0::gentoo",
            ]
        );
    }

    #[test]
    fn test_lowest() {
        let ordered = Policy::lowest().order(candidates());
        assert_eq!(ordered[0].cpv(), "dev-libs/a-0.5");
        assert_eq!(ordered[3].cpv(), "dev-libs/a-2");
    }

    #[test]
    fn test_reuse_prefers_installed() {
        let policy = Policy::reuse();
        assert_eq!(policy.name(), "reuse");
        assert_eq!(policy.repo_preference(), RepoPreference::LivefsFirst);
        let ordered = policy.order(candidates());
        assert_eq!(
            cpvs(&ordered),
            vec![
                "dev-libs/a-1:0::vdb",
                "dev-libs/a-2:0::gentoo",
                "dev-libs/a-1:0::gentoo",
                "dev-libs/a-0.5:0::gentoo",
            ]
        );
    }

    #[test]
    fn test_livefs_last() {
        let ordered = Policy::highest().livefs_last().order(candidates());
        assert_eq!(ordered.last().unwrap().repo().name(), "vdb");
    }

    #[test]
    fn test_downgrade_puts_restricted_last() {
        let policy = Policy::downgrade(Atom::parse(">=dev-libs/a-1").unwrap());
        let ordered = policy.order(candidates());
        assert_eq!(
            cpvs(&ordered),
            vec![
                "dev-libs/a-0.5:0::gentoo",
                "dev-libs/a-2:0::gentoo",
                "dev-libs/a-1:0::vdb",
                "dev-libs/a-1:0::gentoo",
            ]
        );
    }

    #[test]
    fn test_custom_order() {
        let policy = Policy::new("by-repo", |a: &Package, b: &Package| {
            a.repo().name().cmp(b.repo().name())
        });
        let ordered = policy.order(candidates());
        assert_eq!(ordered[0].repo().name(), "gentoo");
        assert_eq!(format!("{:?}", policy), "Policy { name: \"by-repo\", repos: Mixed }");
    }
}
