//! Reversibility checks over a revision graph.

use std::fmt;

use syspace_core::schema::Catalog;
use tracing::debug;

use super::diff::SchemaDiff;
use super::error::Direction;
use super::graph::RevisionGraph;
use super::operation::Operation;
use super::revision::RevisionId;

/// A problem found in one script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyIssue {
    pub revision: RevisionId,
    pub problem: String,
}

impl fmt::Display for VerifyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.revision, self.problem)
    }
}

/// Result of checking every script in a graph.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Scripts examined.
    pub checked: usize,
    /// Scripts containing raw SQL, which the structural check cannot see into.
    pub opaque: Vec<RevisionId>,
    pub issues: Vec<VerifyIssue>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check each script against an in-memory schema.
///
/// For every revision the schema of its ancestors is built, then `upgrade`
/// must apply cleanly and `downgrade` must apply cleanly and restore that
/// schema exactly.
pub fn verify_graph(graph: &RevisionGraph) -> VerifyReport {
    let mut report = VerifyReport::default();

    for script in graph.scripts() {
        report.checked += 1;
        let id = script.id();

        let has_raw_sql = script
            .upgrade
            .iter()
            .chain(script.downgrade.iter())
            .any(|op| matches!(op, Operation::Execute { .. }));
        if has_raw_sql {
            report.opaque.push(id.clone());
        }

        let before = match ancestor_schema(graph, id) {
            Ok(catalog) => catalog,
            Err(problem) => {
                report.issues.push(VerifyIssue {
                    revision: id.clone(),
                    problem,
                });
                continue;
            }
        };

        let mut schema = before.clone();
        if let Err(problem) = apply_all(&mut schema, &script.upgrade, Direction::Upgrade) {
            report.issues.push(VerifyIssue {
                revision: id.clone(),
                problem,
            });
            continue;
        }
        if let Err(problem) = apply_all(&mut schema, &script.downgrade, Direction::Downgrade) {
            report.issues.push(VerifyIssue {
                revision: id.clone(),
                problem,
            });
            continue;
        }

        let diff = SchemaDiff::between(&before, &schema);
        if !diff.is_empty() {
            report.issues.push(VerifyIssue {
                revision: id.clone(),
                problem: format!("downgrade does not restore the schema:\n{}", diff),
            });
        }
        debug!(revision = %id, "verified");
    }

    report
}

fn ancestor_schema(graph: &RevisionGraph, id: &RevisionId) -> Result<Catalog, String> {
    let mut catalog = Catalog::new();
    let ancestors = graph.ancestors(id).map_err(|e| e.to_string())?;
    for ancestor in ancestors {
        let Some(script) = graph.get(ancestor.as_str()) else {
            continue;
        };
        apply_all(&mut catalog, &script.upgrade, Direction::Upgrade)
            .map_err(|e| format!("ancestor {} fails: {}", ancestor, e))?;
    }
    Ok(catalog)
}

fn apply_all(catalog: &mut Catalog, ops: &[Operation], direction: Direction) -> Result<(), String> {
    for (i, op) in ops.iter().enumerate() {
        op.apply_to(catalog).map_err(|e| {
            format!("{} step {} ({}): {}", direction, i + 1, op.describe(), e)
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::revision::{MigrationScript, Revision};
    use syspace_core::schema::{ColumnDef, SqlType};

    fn companies() -> MigrationScript {
        MigrationScript::new(Revision::new("a1", None, "companies"))
            .with_upgrade(vec![Operation::create_table(
                "companies",
                vec![ColumnDef::new("id", SqlType::Serial).primary_key()],
            )])
            .with_downgrade(vec![Operation::drop_table("companies")])
    }

    #[test]
    fn test_reversible_scripts_pass() {
        let add = MigrationScript::new(Revision::new("b2", Some("a1"), "website"))
            .with_upgrade(vec![Operation::add_column(
                "companies",
                ColumnDef::new("website", SqlType::Varchar(None)),
            )])
            .with_downgrade(vec![Operation::drop_column("companies", "website")]);

        let graph = RevisionGraph::new(vec![companies(), add]).unwrap();
        let report = verify_graph(&graph);
        assert_eq!(report.checked, 2);
        assert!(report.is_ok(), "{:?}", report.issues);
    }

    #[test]
    fn test_incomplete_downgrade_is_reported() {
        let add = MigrationScript::new(Revision::new("b2", Some("a1"), "website"))
            .with_upgrade(vec![
                Operation::add_column("companies", ColumnDef::new("website", SqlType::Text)),
                Operation::add_column("companies", ColumnDef::new("mission", SqlType::Text)),
            ])
            .with_downgrade(vec![Operation::drop_column("companies", "website")]);

        let graph = RevisionGraph::new(vec![companies(), add]).unwrap();
        let report = verify_graph(&graph);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].revision.as_str(), "b2");
        assert!(report.issues[0].problem.contains("companies.mission"));
    }

    #[test]
    fn test_invalid_upgrade_is_reported() {
        let bad = MigrationScript::new(Revision::new("b2", Some("a1"), "fk"))
            .with_upgrade(vec![Operation::add_foreign_key("companies", "owner_id", "users")])
            .with_downgrade(vec![]);

        let graph = RevisionGraph::new(vec![companies(), bad]).unwrap();
        let report = verify_graph(&graph);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].problem.starts_with("upgrade step 1 (add_foreign_key companies)"));
    }

    #[test]
    fn test_builtin_types_are_not_enum_references() {
        let settings = MigrationScript::new(Revision::new("b2", Some("a1"), "settings"))
            .with_upgrade(
                ["json", "smallint", "interval", "inet", "time", "numeric", "float"]
                    .iter()
                    .map(|ty| {
                        Operation::add_column(
                            "companies",
                            ColumnDef::new(&format!("{}_value", ty), ty.parse().unwrap()),
                        )
                    })
                    .collect(),
            )
            .with_downgrade(
                ["json", "smallint", "interval", "inet", "time", "numeric", "float"]
                    .iter()
                    .map(|ty| Operation::drop_column("companies", &format!("{}_value", ty)))
                    .collect(),
            );

        let graph = RevisionGraph::new(vec![companies(), settings]).unwrap();
        let report = verify_graph(&graph);
        assert!(report.is_ok(), "{:?}", report.issues);
        assert_eq!(report.checked, 2);
    }
}
