// src/index/rdeps.rs

//! Reverse dependency queries over the binary index
//!
//! Reverse dependencies are derived, not stored: the index is read mostly
//! forward (install/remove) and only occasionally backwards (impact
//! analysis), so a query is a single scan over every record instead of a
//! persistent reverse edge table. Callers needing repeated answers should
//! hold on to the result for the duration of one command.

use super::{BinaryIndex, Package, PackageId};
use std::collections::{HashSet, VecDeque};

/// Single-level reverse dependent scan
///
/// Yields every package whose dependency list names the target and whose
/// constraint is satisfied by the target's version. With a repository
/// filter, both the target and every yielded dependent must carry that
/// repository in their provenance.
pub struct RdepsIter<'a> {
    target: &'a Package,
    repository: Option<&'a str>,
    inner: std::slice::Iter<'a, Package>,
    /// Cleared when the target fails the repository filter
    live: bool,
}

impl<'a> Iterator for RdepsIter<'a> {
    type Item = &'a Package;

    fn next(&mut self) -> Option<&'a Package> {
        if !self.live {
            return None;
        }
        for candidate in self.inner.by_ref() {
            if std::ptr::eq(candidate, self.target) {
                continue;
            }
            if let Some(repo) = self.repository {
                if !candidate.in_repository(repo) {
                    continue;
                }
            }
            if depends_on(candidate, self.target) {
                return Some(candidate);
            }
        }
        None
    }
}

/// Whether some dependency entry of `candidate` names the target and is
/// satisfied by the target's version
fn depends_on(candidate: &Package, target: &Package) -> bool {
    candidate
        .depends
        .iter()
        .any(|dep| dep.name == target.name && dep.constraint.satisfies(&target.version))
}

impl BinaryIndex {
    /// Iterate over the direct reverse dependents of a package
    pub fn reverse_dependents<'a>(
        &'a self,
        target: &'a Package,
        repository: Option<&'a str>,
    ) -> RdepsIter<'a> {
        let live = match repository {
            Some(repo) => target.in_repository(repo),
            None => true,
        };
        RdepsIter {
            target,
            repository,
            inner: self.packages.iter(),
            live,
        }
    }

    /// Collect the transitive reverse dependents of a package
    ///
    /// Worklist traversal over the single-level query. Every node is added
    /// to the visited set, keyed by package identity, before its own
    /// dependents are expanded, so diamond-shaped graphs are visited once
    /// and repeated calls on an unchanged index yield the same set.
    pub fn transitive_reverse_dependents<'a>(
        &'a self,
        target: &'a Package,
        repository: Option<&'a str>,
    ) -> Vec<&'a Package> {
        let mut visited: HashSet<PackageId> = HashSet::new();
        let mut found: Vec<&'a Package> = Vec::new();
        let mut queue: VecDeque<&'a Package> = VecDeque::new();

        visited.insert(target.id());
        queue.push_back(target);

        while let Some(pkg) = queue.pop_front() {
            for rdep in self.reverse_dependents(pkg, repository) {
                if visited.insert(rdep.id()) {
                    found.push(rdep);
                    queue.push_back(rdep);
                }
            }
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use crate::index::test_support::descriptor;
    use crate::index::{BinaryIndex, PackageId};
    use std::collections::BTreeSet;

    fn chain_index() -> BinaryIndex {
        // a <- b <- c (b depends on a, c depends on b)
        let lists = vec![(
            "main".to_string(),
            vec![
                descriptor("a", "1.0.0", 0x0a, &[]),
                descriptor("b", "1.0.0", 0x0b, &[("a", ">= 1.0.0")]),
                descriptor("c", "1.0.0", 0x0c, &[("b", "")]),
            ],
        )];
        BinaryIndex::build(&lists).0
    }

    #[test]
    fn test_direct_reverse_dependents_match_constraint() {
        let lists = vec![(
            "main".to_string(),
            vec![
                descriptor("lib", "1.0.0", 0x01, &[]),
                descriptor("wants-any", "1.0.0", 0x02, &[("lib", "")]),
                descriptor("wants-new", "1.0.0", 0x03, &[("lib", ">= 2.0.0")]),
                descriptor("unrelated", "1.0.0", 0x04, &[]),
            ],
        )];
        let index = BinaryIndex::build(&lists).0;
        let lib = index.find_by_name("lib")[0];

        let names: Vec<&str> = index
            .reverse_dependents(lib, None)
            .map(|p| p.name.as_str())
            .collect();

        // wants-new requires >= 2.0.0, which lib 1.0.0 does not satisfy
        assert_eq!(names, vec!["wants-any"]);
    }

    #[test]
    fn test_transitive_closure_of_chain() {
        let index = chain_index();
        let a = index.find_by_name("a")[0];

        let names: BTreeSet<&str> = index
            .transitive_reverse_dependents(a, None)
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, BTreeSet::from(["b", "c"]));
    }

    #[test]
    fn test_diamond_graph_visits_once() {
        // a required by b and c, both required by d
        let lists = vec![(
            "main".to_string(),
            vec![
                descriptor("a", "1.0.0", 0x0a, &[]),
                descriptor("b", "1.0.0", 0x0b, &[("a", "")]),
                descriptor("c", "1.0.0", 0x0c, &[("a", "")]),
                descriptor("d", "1.0.0", 0x0d, &[("b", ""), ("c", "")]),
            ],
        )];
        let index = BinaryIndex::build(&lists).0;
        let a = index.find_by_name("a")[0];

        let rdeps = index.transitive_reverse_dependents(a, None);
        let ids: BTreeSet<PackageId> = rdeps.iter().map(|p| p.id()).collect();

        // d is reachable through both b and c but appears exactly once
        assert_eq!(rdeps.len(), 3);
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_transitive_closure_is_idempotent() {
        let index = chain_index();
        let a = index.find_by_name("a")[0];

        let first: BTreeSet<PackageId> = index
            .transitive_reverse_dependents(a, None)
            .iter()
            .map(|p| p.id())
            .collect();
        let second: BTreeSet<PackageId> = index
            .transitive_reverse_dependents(a, None)
            .iter()
            .map(|p| p.id())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_repository_filter_restricts_dependents() {
        let lists = vec![
            (
                "alpha".to_string(),
                vec![
                    descriptor("lib", "1.0.0", 0x01, &[]),
                    descriptor("in-alpha", "1.0.0", 0x02, &[("lib", "")]),
                ],
            ),
            (
                "beta".to_string(),
                vec![descriptor("in-beta", "1.0.0", 0x03, &[("lib", "")])],
            ),
        ];
        let index = BinaryIndex::build(&lists).0;
        let lib = index.find_by_name("lib")[0];

        let names: Vec<&str> = index
            .reverse_dependents(lib, Some("alpha"))
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["in-alpha"]);
    }

    #[test]
    fn test_repository_filter_requires_target_in_repo() {
        let lists = vec![
            (
                "alpha".to_string(),
                vec![descriptor("lib", "1.0.0", 0x01, &[])],
            ),
            (
                "beta".to_string(),
                vec![descriptor("app", "1.0.0", 0x02, &[("lib", "")])],
            ),
        ];
        let index = BinaryIndex::build(&lists).0;
        let lib = index.find_by_name("lib")[0];

        // lib is not provided by beta: the query yields nothing at all
        assert_eq!(index.reverse_dependents(lib, Some("beta")).count(), 0);
        assert!(
            index
                .transitive_reverse_dependents(lib, Some("beta"))
                .is_empty()
        );
    }

    #[test]
    fn test_self_dependency_is_not_yielded() {
        let lists = vec![(
            "main".to_string(),
            vec![descriptor("selfish", "1.0.0", 0x01, &[("selfish", "")])],
        )];
        let index = BinaryIndex::build(&lists).0;
        let pkg = index.find_by_name("selfish")[0];

        assert_eq!(index.reverse_dependents(pkg, None).count(), 0);
    }
}
