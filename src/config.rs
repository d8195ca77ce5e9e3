//! YAML configuration loading.
//!
//! Three files live in the config directory:
//! - `projects.yaml`   — the tracked repositories
//! - `tools.yaml`      — locations of the external analysis binaries
//! - `processing.yaml` — action/tables/projects for the `process` subcommand

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::HarvestError;
use crate::model::{Project, VersionStyle};
use crate::paths::Paths;
use crate::populate::{Action, Table};

#[derive(Debug, Deserialize)]
struct ProjectDecl {
    project_name: String,
    repo_owner: String,
    repo_main_branch: String,
    repo_link: String,
    #[serde(default)]
    jira_link: String,
    #[serde(default)]
    version_style: VersionStyle,
    #[serde(default = "default_interval_days")]
    version_interval_days: i64,
}

fn default_interval_days() -> i64 {
    60
}

/// Load all project declarations from `projects.yaml`, keyed by name.
pub fn load_projects(config_dir: &Path, paths: &Paths) -> Result<BTreeMap<String, Project>> {
    let file = config_dir.join("projects.yaml");
    let raw = fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let decls: Vec<ProjectDecl> = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse {}", file.display()))?;

    let mut projects = BTreeMap::new();
    for decl in decls {
        let mut project = Project::new(
            &decl.project_name,
            &decl.repo_owner,
            &decl.repo_main_branch,
            &decl.repo_link,
            &decl.jira_link,
            paths,
        );
        project.version_style = decl.version_style;
        project.version_interval_days = decl.version_interval_days;
        projects.insert(project.name.clone(), project);
    }
    Ok(projects)
}

/// One external tool declaration from `tools.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDecl {
    pub path: PathBuf,
    /// JVM heap cap for tools launched through `java -jar`, e.g. "4G".
    #[serde(default)]
    pub max_allocation: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsConfig {
    pub designite: Option<ToolDecl>,
    pub refactoring_miner: Option<ToolDecl>,
}

impl ToolsConfig {
    /// Resolve a tool declaration, verifying the binary actually exists.
    pub fn require(&self, name: &'static str) -> Result<&ToolDecl, HarvestError> {
        let decl = match name {
            "designite" => self.designite.as_ref(),
            "refactoring_miner" => self.refactoring_miner.as_ref(),
            _ => None,
        }
        .ok_or(HarvestError::ToolNotConfigured(name))?;

        if !decl.path.exists() {
            return Err(HarvestError::ToolMissing {
                name,
                path: decl.path.clone(),
            });
        }
        Ok(decl)
    }
}

/// Load `tools.yaml`. A missing file is treated as "no tools configured" so
/// that runs which never touch an external tool do not require one.
pub fn load_tools(config_dir: &Path) -> Result<ToolsConfig> {
    let file = config_dir.join("tools.yaml");
    if !file.exists() {
        return Ok(ToolsConfig::default());
    }
    let raw = fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("failed to parse {}", file.display()))
}

#[derive(Debug, Deserialize)]
struct ProcessingDecl {
    database_action: String,
    targeted_tables: Vec<String>,
    projects_to_process: Vec<String>,
}

/// Fully resolved `processing.yaml` directives.
#[derive(Debug)]
pub struct ProcessingConfig {
    pub action: Action,
    pub tables: Vec<Table>,
    pub projects: Vec<Project>,
}

/// Load `processing.yaml` and resolve its names against the project list.
pub fn load_processing(
    config_dir: &Path,
    all_projects: &BTreeMap<String, Project>,
) -> Result<ProcessingConfig> {
    let file = config_dir.join("processing.yaml");
    let raw = fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let decl: ProcessingDecl = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse {}", file.display()))?;

    let action: Action = decl.database_action.parse()?;

    let mut tables = Vec::new();
    for name in &decl.targeted_tables {
        tables.push(
            Table::from_name(name).ok_or_else(|| HarvestError::UnknownTable(name.clone()))?,
        );
    }

    let mut projects = Vec::new();
    for name in &decl.projects_to_process {
        let project = all_projects
            .get(&name.to_lowercase())
            .ok_or_else(|| HarvestError::UnknownProject(name.clone()))?;
        projects.push(project.clone());
    }

    Ok(ProcessingConfig {
        action,
        tables,
        projects,
    })
}
