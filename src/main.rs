// Main entry point - tracing setup and one sequential run over every project
mod application;
mod domain;
mod infrastructure;

use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::application::pipeline::Pipeline;
use crate::infrastructure::config::{load_project_config, load_runtime_settings};
use crate::infrastructure::registry::Registry;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_runtime_settings().context("Failed to load runtime settings")?;
    let projects = match settings.project_filter() {
        Some(projects) => projects,
        None => list_projects(&settings.workdir)?,
    };
    tracing::info!(
        "running {} projects from {}",
        projects.len(),
        settings.workdir.display()
    );

    for project in &projects {
        run_project(&settings.workdir, project).await;
    }

    Ok(())
}

/// Directory names under `<workdir>/projects`, skipping hidden entries.
fn list_projects(workdir: &Path) -> Result<Vec<String>> {
    let dir = workdir.join("projects");
    let entries = std::fs::read_dir(&dir)
        .with_context(|| format!("Failed to list projects in {}", dir.display()))?;
    let mut projects = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.path().is_dir() && !name.starts_with('.') {
            projects.push(name);
        }
    }
    projects.sort();
    Ok(projects)
}

/// A failing project is logged and never stops the others.
async fn run_project(workdir: &Path, project: &str) {
    let pipeline = Pipeline::new(project, workdir, &Registry);
    let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;

    let result = match load_project_config(workdir, project) {
        Ok(config) if !config.is_active => {
            tracing::info!("skipping project {} (inactive)", project);
            return;
        }
        Ok(config) => {
            tracing::info!("running project {}", project);
            pipeline.run(&config, now).await
        }
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(summary) => tracing::info!(
            "project {} complete: {} acquired, {} generated, {} exported, {} streams failed",
            project,
            summary.acquired,
            summary.generated,
            summary.exported,
            summary.failed_streams
        ),
        Err(e) => {
            tracing::error!("project {} failed: {:#}", project, e);
            pipeline.errlog().append(&format!("{:#}", e));
        }
    }
}
