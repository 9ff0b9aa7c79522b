//! Result aggregation.
//!
//! Turns a finished build into one order-stable [`Report`]: the tree, the
//! failures recorded beneath it, and the number of distinct successful
//! resolutions.

use super::error::PkgError;
use super::registry::Dist;
use super::spec::PackageReference;
use super::tree::ResolvedNode;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

/// A dependency edge that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub name: String,
    pub requested: String,
    pub reason: PkgError,
}

impl FailureRecord {
    #[must_use]
    pub fn new(reference: PackageReference, reason: PkgError) -> Self {
        Self {
            name: reference.name,
            requested: reference.requested,
            reason,
        }
    }
}

/// One concrete package in the resolved set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ResolvedPackageInfo {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tarball: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

/// Final outcome of a resolution run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub tree: ResolvedNode,
    pub failures: Vec<FailureRecord>,
    pub resolved_count: usize,
}

impl Report {
    /// Aggregate a finished build.
    ///
    /// Failures keep their discovery order (depth-first, manifest order);
    /// a cached failure reached through several parents is listed once.
    #[must_use]
    pub fn collect(
        tree: ResolvedNode,
        failures: Vec<FailureRecord>,
        resolved_count: usize,
    ) -> Self {
        let mut seen = HashSet::new();
        let failures = failures
            .into_iter()
            .filter(|f| seen.insert((f.name.clone(), f.requested.clone(), f.reason.code())))
            .collect();

        Self {
            tree,
            failures,
            resolved_count,
        }
    }

    /// Whether every edge resolved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of nodes in the tree, counting repeated packages each time.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.tree.node_count()
    }

    /// Distinct `(name, version)` pairs in the tree, sorted.
    #[must_use]
    pub fn packages(&self) -> Vec<ResolvedPackageInfo> {
        let mut unique: BTreeMap<(&str, &str), Option<&Dist>> = BTreeMap::new();
        self.tree.walk(&mut |node| {
            unique
                .entry((node.name.as_str(), node.version.as_str()))
                .or_insert(node.dist.as_ref());
        });

        unique
            .into_iter()
            .map(|((name, version), dist)| ResolvedPackageInfo {
                name: name.to_string(),
                version: version.to_string(),
                tarball: dist.map(|d| d.tarball.clone()).filter(|t| !t.is_empty()),
                integrity: dist.and_then(|d| d.integrity.clone()),
            })
            .collect()
    }

    /// Human-readable run summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Resolved {}@{} ({} packages, {} nodes)\n",
            self.tree.name,
            self.tree.version,
            self.resolved_count,
            self.node_count()
        );

        if self.failures.is_empty() {
            return out;
        }

        let _ = writeln!(out, "{} dependencies failed to resolve:", self.failures.len());
        for (i, failure) in self.failures.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {}@{}: {}",
                i + 1,
                failure.name,
                failure.requested,
                failure.reason
            );
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;

    fn node(name: &str, version: &str, children: Vec<ResolvedNode>) -> ResolvedNode {
        ResolvedNode {
            name: name.to_string(),
            version: version.to_string(),
            dist: Some(Dist {
                tarball: format!("https://registry.test/{name}-{version}.tgz"),
                integrity: Some(format!("sha512-{name}")),
            }),
            children,
        }
    }

    fn failure(name: &str, requested: &str, reason: PkgError) -> FailureRecord {
        FailureRecord::new(PackageReference::new(name, requested), reason)
    }

    #[test]
    fn test_collect_dedupes_repeated_failures() {
        let tree = node("a", "1.0.0", vec![]);
        let failures = vec![
            failure("b", "^2.0.0", PkgError::version_not_found("b", "^2.0.0")),
            failure("c", "^1.0.0", PkgError::not_found("c")),
            failure("b", "^2.0.0", PkgError::version_not_found("b", "^2.0.0")),
        ];

        let report = Report::collect(tree, failures, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].name, "b");
        assert_eq!(report.failures[1].name, "c");
        assert!(!report.is_complete());
    }

    #[test]
    fn test_packages_are_unique_and_sorted() {
        let tree = node(
            "app",
            "1.0.0",
            vec![
                node("zed", "2.0.0", vec![node("dep", "1.0.0", vec![])]),
                node("dep", "1.0.0", vec![]),
                node("dep", "1.2.0", vec![]),
            ],
        );
        let report = Report::collect(tree, vec![], 4);

        let packages: Vec<String> = report
            .packages()
            .iter()
            .map(|p| format!("{}@{}", p.name, p.version))
            .collect();
        assert_eq!(packages, vec!["app@1.0.0", "dep@1.0.0", "dep@1.2.0", "zed@2.0.0"]);
        assert_eq!(report.node_count(), 5);
        assert_eq!(report.packages()[0].integrity.as_deref(), Some("sha512-app"));
    }

    #[test]
    fn test_summary_lists_failures() {
        let tree = node("a", "1.0.0", vec![node("b", "1.0.0", vec![])]);
        let report = Report::collect(
            tree,
            vec![failure("a", "^1.0.0", PkgError::cycle_detected("a", "1.0.0"))],
            2,
        );

        let summary = report.summary();
        assert!(summary.starts_with("Resolved a@1.0.0 (2 packages, 2 nodes)"));
        assert!(summary.contains("1 dependencies failed to resolve"));
        assert!(summary.contains("1. a@^1.0.0: PKG_CYCLE_DETECTED"));
    }

    #[test]
    fn test_report_serializes() {
        let report = Report::collect(
            node("a", "1.0.0", vec![]),
            vec![failure("b", "^1.0.0", PkgError::not_found("b"))],
            1,
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tree"]["name"], "a");
        assert_eq!(json["resolved_count"], 1);
        assert_eq!(json["failures"][0]["reason"]["code"], codes::PKG_NOT_FOUND);
    }
}
