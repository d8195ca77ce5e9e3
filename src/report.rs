//! Read-only queries over the populated dataset. Everything here is a plain
//! SQL join; the heavier statistical post-processing lives outside this tool.

use std::collections::BTreeMap;

use anyhow::Result;
use rusqlite::Connection;

use crate::populate::Table;

#[derive(Debug, Clone, PartialEq)]
pub struct VersionRow {
    pub version: String,
    pub commit_hash: String,
    pub author_date: String,
    pub previous_version: String,
}

/// Version chain of a project, oldest first.
pub fn version_history(conn: &Connection, project: &str) -> Result<Vec<VersionRow>> {
    let mut stmt = conn.prepare(
        "SELECT version, commit_hash, author_date, COALESCE(previous_version, '')
         FROM project_versions WHERE project_name = ?1 ORDER BY author_date",
    )?;
    let rows = stmt
        .query_map([project], |row| {
            Ok(VersionRow {
                version: row.get(0)?,
                commit_hash: row.get(1)?,
                author_date: row.get(2)?,
                previous_version: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssueEffort {
    pub issue_key: String,
    pub time_spent: i64,
}

/// Issues with recorded effort, largest first. Unestimated issues carry an
/// empty `time_spent` and are excluded.
pub fn issue_effort(conn: &Connection, project: &str) -> Result<Vec<IssueEffort>> {
    let mut stmt = conn.prepare(
        "SELECT issue_key, CAST(time_spent AS INTEGER) AS spent
         FROM issues
         WHERE project_name = ?1
           AND time_spent != ''
           AND CAST(time_spent AS INTEGER) > 0
         ORDER BY spent DESC, issue_key",
    )?;
    let rows = stmt
        .query_map([project], |row| {
            Ok(IssueEffort {
                issue_key: row.get(0)?,
                time_spent: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssueRefactorings {
    pub issue_key: String,
    pub refactorings: i64,
}

/// How many detected refactorings each issue's commits contain.
pub fn issue_refactoring_counts(conn: &Connection, project: &str) -> Result<Vec<IssueRefactorings>> {
    let mut stmt = conn.prepare(
        "SELECT ci.issue_key, COUNT(*) AS n
         FROM commit_issues ci
         JOIN refactorings r
           ON r.project_name = ci.project_name AND r.commit_hash = ci.commit_hash
         WHERE ci.project_name = ?1
         GROUP BY ci.issue_key
         ORDER BY n DESC, ci.issue_key",
    )?;
    let rows = stmt
        .query_map([project], |row| {
            Ok(IssueRefactorings {
                issue_key: row.get(0)?,
                refactorings: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssueCommitMetrics {
    pub issue_key: String,
    pub commits: i64,
    pub lines_added: i64,
    pub lines_removed: i64,
    pub churn: i64,
}

/// Size of each issue's footprint over Java sources.
pub fn issue_commit_metrics(conn: &Connection, project: &str) -> Result<Vec<IssueCommitMetrics>> {
    let mut stmt = conn.prepare(
        "SELECT ci.issue_key,
                COUNT(DISTINCT cc.commit_hash),
                SUM(CAST(cc.lines_added AS INTEGER)),
                SUM(CAST(cc.lines_removed AS INTEGER))
         FROM commit_issues ci
         JOIN commit_changes cc
           ON cc.project_name = ci.project_name AND cc.commit_hash = ci.commit_hash
         WHERE ci.project_name = ?1 AND cc.new_path LIKE '%.java'
         GROUP BY ci.issue_key
         ORDER BY ci.issue_key",
    )?;
    let rows = stmt
        .query_map([project], |row| {
            let added: i64 = row.get(2)?;
            let removed: i64 = row.get(3)?;
            Ok(IssueCommitMetrics {
                issue_key: row.get(0)?,
                commits: row.get(1)?,
                lines_added: added,
                lines_removed: removed,
                churn: added + removed,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageVersionRow {
    pub package: String,
    pub version: String,
    pub nloc: i64,
    pub complexity: i64,
    pub smells: i64,
}

/// Static metrics of every (package, version), with the number of design
/// smells reported against it.
pub fn package_version_metrics(conn: &Connection, project: &str) -> Result<Vec<PackageVersionRow>> {
    let mut stmt = conn.prepare(
        "SELECT sm.package, sm.version,
                CAST(sm.pkg_loc AS INTEGER),
                CAST(sm.pkg_cc AS INTEGER),
                (SELECT COUNT(*) FROM design_smells ds
                  WHERE ds.project_name = sm.project_name
                    AND ds.package = sm.package
                    AND ds.version = sm.version)
         FROM static_metrics sm
         WHERE sm.project_name = ?1
         ORDER BY sm.package, sm.version",
    )?;
    let rows = stmt
        .query_map([project], |row| {
            Ok(PackageVersionRow {
                package: row.get(0)?,
                version: row.get(1)?,
                nloc: row.get(2)?,
                complexity: row.get(3)?,
                smells: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Packages touched by each issue, derived from the directory part of the
/// changed paths of the issue's commits.
pub fn issue_packages(conn: &Connection, project: &str) -> Result<BTreeMap<String, Vec<String>>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT ci.issue_key, cc.new_path
         FROM commit_issues ci
         JOIN commit_changes cc
           ON cc.project_name = ci.project_name AND cc.commit_hash = ci.commit_hash
         WHERE ci.project_name = ?1 AND cc.new_path != ''",
    )?;
    let pairs = stmt
        .query_map([project], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut by_issue: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (issue, path) in pairs {
        let package = path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let packages = by_issue.entry(issue).or_default();
        if !packages.iter().any(|p| p == package) {
            packages.push(package.to_string());
        }
    }
    for packages in by_issue.values_mut() {
        packages.sort();
    }
    Ok(by_issue)
}

/// Row counts per table for one project.
pub fn summary(conn: &Connection, project: &str) -> Result<Vec<(&'static str, i64)>> {
    let mut counts = Vec::new();
    for table in Table::ALL {
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE project_name = ?1",
                table.name()
            ),
            [project],
            |row| row.get(0),
        )?;
        counts.push((table.name(), count));
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::initialize_schema;

    fn seeded_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open db");
        initialize_schema(&conn).expect("schema");
        conn.execute_batch(
            "
            INSERT INTO project_versions VALUES
                ('zk', 'v1', 'aaa', '2020-01-01 00:00:00', ''),
                ('zk', 'v2', 'bbb', '2020-06-01 00:00:00', 'v1');

            INSERT INTO issues (project_name, issue_key, time_spent) VALUES
                ('zk', 'ZK-1', '3600'),
                ('zk', 'ZK-2', ''),
                ('zk', 'ZK-3', '7200');

            INSERT INTO commit_issues VALUES
                ('zk', 'ZK-1', 'aaa'),
                ('zk', 'ZK-1', 'bbb'),
                ('zk', 'ZK-3', 'bbb');

            INSERT INTO refactorings VALUES
                ('zk', 'aaa', 'Extract Method', 'd', 'x/A.java', 'x'),
                ('zk', 'bbb', 'Rename Class', 'd', 'x/B.java', 'x');

            INSERT INTO commit_changes
                (project_name, commit_hash, old_path, new_path, change_type,
                 diff, lines_added, lines_removed, nloc, complexity, token_count, methods)
            VALUES
                ('zk', 'aaa', '', 'src/java/org/zk/A.java', 'ADD', '', '10', '0', '10', '1', '20', '[]'),
                ('zk', 'aaa', '', 'README.md', 'ADD', '', '5', '0', '0', '0', '0', '[]'),
                ('zk', 'bbb', 'src/java/org/zk/A.java', 'src/java/org/zk/A.java', 'MODIFY',
                 '', '3', '2', '11', '1', '22', '[]');

            INSERT INTO static_metrics VALUES
                ('zk', 'src/java/org/zk', 'v1', '2', '100', '400', '12', '50.00', '6.00', '200.00');

            INSERT INTO design_smells VALUES
                ('zk', 'v1', 'src/java/org/zk', 'God Class', 'too big');
            ",
        )
        .expect("seed");
        conn
    }

    #[test]
    fn version_history_is_oldest_first() {
        let conn = seeded_db();
        let rows = version_history(&conn, "zk").expect("history");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].version, "v1");
        assert_eq!(rows[1].previous_version, "v1");
    }

    #[test]
    fn issue_effort_excludes_unestimated_issues() {
        let conn = seeded_db();
        let rows = issue_effort(&conn, "zk").expect("effort");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].issue_key, "ZK-3", "largest effort first");
    }

    #[test]
    fn refactoring_counts_follow_the_commit_link() {
        let conn = seeded_db();
        let rows = issue_refactoring_counts(&conn, "zk").expect("counts");
        assert_eq!(rows[0].issue_key, "ZK-1");
        assert_eq!(rows[0].refactorings, 2);
    }

    #[test]
    fn commit_metrics_cover_java_files_only() {
        let conn = seeded_db();
        let rows = issue_commit_metrics(&conn, "zk").expect("metrics");
        let zk1 = rows.iter().find(|r| r.issue_key == "ZK-1").expect("ZK-1");
        assert_eq!(zk1.commits, 2);
        assert_eq!(zk1.lines_added, 13, "README change excluded");
        assert_eq!(zk1.churn, 15);
    }

    #[test]
    fn package_rows_carry_smell_counts() {
        let conn = seeded_db();
        let rows = package_version_metrics(&conn, "zk").expect("packages");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].smells, 1);
        assert_eq!(rows[0].nloc, 100);
    }

    #[test]
    fn issue_packages_deduplicate_directories() {
        let conn = seeded_db();
        let by_issue = issue_packages(&conn, "zk").expect("packages");
        assert_eq!(by_issue["ZK-1"], vec!["", "src/java/org/zk"]);
        assert_eq!(by_issue["ZK-3"], vec!["src/java/org/zk"]);
    }

    #[test]
    fn summary_counts_every_table() {
        let conn = seeded_db();
        let counts = summary(&conn, "zk").expect("summary");
        assert_eq!(counts.len(), Table::ALL.len());
        let issues = counts.iter().find(|(name, _)| *name == "issues").expect("issues");
        assert_eq!(issues.1, 3);
    }
}
