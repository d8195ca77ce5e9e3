//! Process-invocation wrappers around the external analysis tools. Thin by
//! design: no retry, timeout or backpressure — a failed tool call aborts the
//! run with the captured stderr.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};

use crate::config::ToolsConfig;
use crate::error::HarvestError;

/// Run the design-smell detector over one directory.
///
/// The detector clears its output directory before writing results, so
/// `output_dir` must be dedicated to this invocation.
pub fn run_smell_detector(tools: &ToolsConfig, input_dir: &Path, output_dir: &Path) -> Result<()> {
    let decl = tools.require("designite")?;

    let mut cmd = Command::new("java");
    if let Some(alloc) = &decl.max_allocation {
        cmd.arg(format!("-Xmx{alloc}"));
    }
    cmd.arg("-jar")
        .arg(&decl.path)
        .arg("-i")
        .arg(input_dir)
        .arg("-o")
        .arg(output_dir);

    run_checked("designite", cmd)
}

/// Run the refactoring detector over a whole repository; the tool writes its
/// own JSON report to `output_file`.
pub fn run_refactoring_detector(
    tools: &ToolsConfig,
    repo_path: &Path,
    branch: &str,
    output_file: &Path,
) -> Result<()> {
    let decl = tools.require("refactoring_miner")?;

    let mut cmd = Command::new(&decl.path);
    cmd.arg("-a")
        .arg(repo_path)
        .arg(branch)
        .arg("-json")
        .arg(output_file);

    run_checked("refactoring_miner", cmd)
}

fn run_checked(tool: &'static str, mut cmd: Command) -> Result<()> {
    log::debug!("running {tool}: {cmd:?}");
    let output = cmd
        .output()
        .with_context(|| format!("failed to spawn {tool}"))?;

    if !output.status.success() {
        return Err(HarvestError::ToolFailed {
            tool,
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
        .into());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        log::debug!("{tool} output: {}", stdout.trim());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolDecl;

    #[test]
    fn unconfigured_tool_is_a_config_error() {
        let tools = ToolsConfig::default();
        let err = run_refactoring_detector(
            &tools,
            Path::new("/tmp/repo"),
            "master",
            Path::new("/tmp/out.json"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not declared"));
    }

    #[test]
    fn missing_binary_is_a_config_error() {
        let tools = ToolsConfig {
            designite: Some(ToolDecl {
                path: "/nonexistent/designite.jar".into(),
                max_allocation: Some("4G".to_string()),
            }),
            refactoring_miner: None,
        };
        let err =
            run_smell_detector(&tools, Path::new("/tmp/in"), Path::new("/tmp/out")).unwrap_err();
        assert!(err.to_string().contains("binary missing"));
    }
}
