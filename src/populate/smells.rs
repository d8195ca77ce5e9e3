use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{PopulateContext, Populator, Table};
use crate::db::backup::BackupWriter;
use crate::tools::run_smell_detector;
use crate::walker::RepoState;

/// Design smells reported by the external detector, one run per version.
///
/// The detector reports packages by dotted name only, so source trees with
/// several roots would collide. Each macro-package root is therefore moved out
/// into its own numbered proxy folder, analyzed in isolation, and moved back;
/// a `pkg_name.txt` marker next to the detector output preserves the root's
/// true relative path for the parse step.
#[derive(Default)]
pub struct DesignSmellsPopulator {
    writer: Option<BackupWriter>,
}

const SMELL_REPORTS: [&str; 3] = [
    "ArchitectureSmells.csv",
    "DesignSmells.csv",
    "ImplementationSmells.csv",
];

impl Populator for DesignSmellsPopulator {
    fn table(&self) -> Table {
        Table::DesignSmells
    }

    fn per_version(&self) -> bool {
        true
    }

    fn generate_at(&mut self, ctx: &PopulateContext<'_>, state: &RepoState) -> Result<()> {
        if self.writer.is_none() {
            self.writer = Some(ctx.backups.create_csv(&ctx.project.name, self.table().name())?);
        }

        let processing = ctx.paths.processing_dir(&ctx.project.name);
        let staging = processing.join("temp_macro_packages");
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        let out_root = processing
            .join("designite_out")
            .join(state.version.os_safe_id());

        let roots = ordered_roots(state);

        // All roots leave the tree before the first detector run; a shallower
        // root staged while a deeper one is still inside it would carry that
        // root's packages along and report them under the wrong prefix.
        stage_roots(&staging, &roots)?;
        let detected = (|| -> Result<()> {
            for (index, root) in roots.iter().enumerate() {
                let out_dir = out_root.join(index.to_string());
                fs::create_dir_all(&out_dir)?;
                run_smell_detector(ctx.tools, &staging.join(index.to_string()), &out_dir)?;
                // The detector clears its output directory, so the marker
                // goes in after the run.
                fs::write(out_dir.join("pkg_name.txt"), state.local_package_path(root))?;
            }
            Ok(())
        })();
        restore_roots(&staging, &roots)?;
        detected?;

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("smell backup writer not open"))?;
        let mut count = 0usize;
        for index in 0..roots.len() {
            let out_dir = out_root.join(index.to_string());
            let prefix = fs::read_to_string(out_dir.join("pkg_name.txt"))?;
            let prefix = prefix.trim();

            for report in SMELL_REPORTS {
                let path = out_dir.join(report);
                if !path.exists() {
                    log::debug!("no {report} for {}", out_dir.display());
                    continue;
                }
                for (dotted, smell, cause) in parse_smell_report(&path)? {
                    writer.write_record([
                        ctx.project.name.clone(),
                        state.version.id.clone(),
                        rewritten_package(prefix, &dotted),
                        smell,
                        cause,
                    ])?;
                    count += 1;
                }
            }
        }

        fs::remove_dir_all(&staging).ok();
        log::info!(
            "{} {}: recorded {count} smells across {} roots",
            ctx.project.name,
            state.version.id,
            roots.len()
        );
        Ok(())
    }

    fn finish(&mut self, ctx: &PopulateContext<'_>) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let path = writer.finish()?;
            log::info!("{}: smell backup at {}", ctx.project.name, path.display());
        }
        Ok(())
    }
}

/// Macro-package roots deepest first, so staging never moves a root that
/// still contains another.
fn ordered_roots(state: &RepoState) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = state.macro_package_roots().into_iter().collect();
    roots.sort_by_key(|root| std::cmp::Reverse(root.components().count()));
    roots
}

/// Move every root into its numbered proxy folder under `staging`.
fn stage_roots(staging: &Path, roots: &[PathBuf]) -> Result<()> {
    for (index, root) in roots.iter().enumerate() {
        let proxy = staging.join(index.to_string());
        fs::create_dir_all(&proxy)?;
        fs::rename(root, proxy.join("java"))
            .with_context(|| format!("failed to stage {}", root.display()))?;
    }
    Ok(())
}

/// Move every staged root back, shallowest first, so nested roots return to
/// parents that already exist again.
fn restore_roots(staging: &Path, roots: &[PathBuf]) -> Result<()> {
    for (index, root) in roots.iter().enumerate().rev() {
        fs::rename(staging.join(index.to_string()).join("java"), root)
            .with_context(|| format!("failed to restore {}", root.display()))?;
    }
    Ok(())
}

/// Extract (package, smell, cause) from one detector report. The reports
/// differ in their type/method columns; the package, smell and cause columns
/// are located by header name and everything else is dropped.
fn parse_smell_report(path: &Path) -> Result<Vec<(String, String, String)>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open smell report {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let package_idx = position(&headers, |h| h == "Package Name")
        .with_context(|| format!("no package column in {}", path.display()))?;
    let smell_idx = position(&headers, |h| h.ends_with("Smell"))
        .with_context(|| format!("no smell column in {}", path.display()))?;
    let cause_idx = position(&headers, |h| h.starts_with("Cause"))
        .with_context(|| format!("no cause column in {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push((
            record.get(package_idx).unwrap_or("").to_string(),
            record.get(smell_idx).unwrap_or("").to_string(),
            record.get(cause_idx).unwrap_or("").to_string(),
        ));
    }
    Ok(rows)
}

fn position(headers: &csv::StringRecord, pred: impl Fn(&str) -> bool) -> Option<usize> {
    headers.iter().position(|h| pred(h.trim()))
}

/// `org.apache.zookeeper` under root `server/src/main/java` becomes
/// `server/src/main/java/org/apache/zookeeper`.
fn rewritten_package(prefix: &str, dotted: &str) -> String {
    let tail = dotted.trim().replace('.', "/");
    if prefix.is_empty() {
        tail
    } else {
        format!("{}/{tail}", prefix.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_packages_are_rewritten_under_their_root() {
        assert_eq!(
            rewritten_package("server/src/main/java", "org.apache.zookeeper.server"),
            "server/src/main/java/org/apache/zookeeper/server"
        );
        assert_eq!(rewritten_package("", "org.demo"), "org/demo");
    }

    #[test]
    fn reports_are_parsed_by_header_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("DesignSmells.csv");
        fs::write(
            &path,
            "Project Name,Package Name,Type Name,Design Smell,Cause of the Smell\n\
             0,org.demo.server,Quorum,Insufficient Modularization,\"Large class, 900 LOC\"\n\
             0,org.demo.client,Cli,God Class,too many responsibilities\n",
        )
        .expect("write report");

        let rows = parse_smell_report(&path).expect("parse");
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            (
                "org.demo.server".to_string(),
                "Insufficient Modularization".to_string(),
                "Large class, 900 LOC".to_string()
            )
        );
    }

    #[test]
    fn architecture_reports_without_type_column_also_parse() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ArchitectureSmells.csv");
        fs::write(
            &path,
            "Project Name,Package Name,Architecture Smell,Cause of the Smell\n\
             0,org.demo,Cyclic Dependency,cycle with org.demo.util\n",
        )
        .expect("write report");

        let rows = parse_smell_report(&path).expect("parse");
        assert_eq!(rows[0].1, "Cyclic Dependency");
    }

    #[test]
    fn nested_roots_are_fully_extracted_before_staging_their_parent() {
        let tree = tempfile::tempdir().expect("tempdir");
        let shallow = tree.path().join("a/src/main/java");
        let deep = shallow.join("tools/gen/java");
        fs::create_dir_all(shallow.join("org/demo")).expect("mkdir shallow");
        fs::create_dir_all(deep.join("org/gen")).expect("mkdir deep");
        fs::write(shallow.join("org/demo/A.java"), "class A {}").expect("write A");
        fs::write(deep.join("org/gen/B.java"), "class B {}").expect("write B");

        // Deepest first, as ordered_roots produces.
        let roots = vec![deep.clone(), shallow.clone()];
        let staging = tree.path().join("staging");

        stage_roots(&staging, &roots).expect("stage");
        assert!(
            !staging.join("1/java/tools/gen/java").exists(),
            "shallow proxy must not still contain the deep root"
        );
        assert!(staging.join("0/java/org/gen/B.java").exists());
        assert!(staging.join("1/java/org/demo/A.java").exists());

        restore_roots(&staging, &roots).expect("restore");
        assert!(shallow.join("org/demo/A.java").exists());
        assert!(deep.join("org/gen/B.java").exists());
    }
}
