// Pipeline driver - acquire, generate, reshape, export, then persist state for one project
use crate::application::exporter::{ExportContext, Exporter};
use crate::application::fetcher::{FetchOutcome, WindowedFetcher};
use crate::application::reconciler::run_generators;
use crate::application::remote_source::RemotePlan;
use crate::application::static_source::{StaticAcquisition, StaticBatch};
use crate::domain::dedup::DedupBuffers;
use crate::domain::row::Row;
use crate::domain::state::SourceState;
use crate::domain::watermark::{WatermarkPolicy, WatermarkStore};
use crate::infrastructure::config::{ExportConfig, ProjectConfig, SourceConfig, project_dir};
use crate::infrastructure::errlog::ErrorLog;
use crate::infrastructure::registry::reshaper_for;
use crate::infrastructure::state_store::StateStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

/// Builds the I/O-bound adapters a run needs from their configuration.
#[async_trait]
pub trait Adapters: Send + Sync {
    /// `None` for sources that are not remote.
    fn remote(&self, source: &SourceConfig, project: &str) -> Result<Option<RemotePlan>>;

    async fn exporter(
        &self,
        config: &ExportConfig,
        workdir: &Path,
        project: &str,
    ) -> Result<Box<dyn Exporter>>;
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub acquired: usize,
    pub generated: usize,
    pub exported: usize,
    pub failed_streams: usize,
}

pub struct Pipeline<'a> {
    project: &'a str,
    workdir: &'a Path,
    adapters: &'a dyn Adapters,
}

impl<'a> Pipeline<'a> {
    pub fn new(project: &'a str, workdir: &'a Path, adapters: &'a dyn Adapters) -> Self {
        Self {
            project,
            workdir,
            adapters,
        }
    }

    pub fn errlog(&self) -> ErrorLog {
        ErrorLog::new(self.workdir, self.project)
    }

    /// One full run. State is written and static inputs are archived only
    /// once every exporter succeeded, so a failed export re-reads the same
    /// data next time.
    pub async fn run(&self, config: &ProjectConfig, now: f64) -> Result<RunSummary> {
        let store = StateStore::new(&project_dir(self.workdir, self.project));
        let mut state = store.load()?;
        let errlog = self.errlog();
        let mut summary = RunSummary::default();
        let mut data: Vec<Row> = Vec::new();
        let mut parsed_files: Vec<StaticBatch> = Vec::new();

        for source in &config.acquire {
            if !source.is_active() {
                tracing::info!("skipping {} source {} (inactive)", source.kind(), source.name());
                continue;
            }
            let rows = match source {
                SourceConfig::Static(c) => {
                    let mut batch =
                        StaticAcquisition::new(self.project, self.workdir, c).acquire(&errlog);
                    let rows = std::mem::take(&mut batch.rows);
                    parsed_files.push(batch);
                    rows
                }
                _ => {
                    let plan = self
                        .adapters
                        .remote(source, self.project)?
                        .with_context(|| format!("no remote adapter for `{}`", source.kind()))?;
                    let entry = state.sources.entry(source.name().to_string()).or_default();
                    let outcome = acquire_remote(&plan, entry, now).await;
                    if !outcome.failed.is_empty() {
                        summary.failed_streams += outcome.failed.len();
                        errlog.append(&format!(
                            "{} source {}: query failed for {}",
                            source.kind(),
                            source.name(),
                            outcome.failed.join(", ")
                        ));
                    }
                    outcome.rows
                }
            };
            tracing::info!("{} rows acquired from {}", rows.len(), source.name());
            summary.acquired += rows.len();
            data.extend(rows);
        }

        summary.generated = run_generators(&config.extra, &mut state.calculated_row, &mut data, now);

        for step in config.reshape.iter().filter(|r| r.is_active()) {
            let outcome = reshaper_for(step).reshape(std::mem::take(&mut data));
            if !outcome.rejected.is_empty() {
                tracing::warn!("{} rows failed reshaping", outcome.rejected.len());
                errlog.write_rows("fmterr", &outcome.rejected, now)?;
            }
            if outcome.ignored > 0 {
                tracing::debug!("{} rows ignored during reshaping", outcome.ignored);
            }
            data = outcome.rows;
        }

        if data.is_empty() {
            tracing::info!("no rows for {}; export skipped", self.project);
        } else {
            let ctx = ExportContext { errlog: &errlog, now };
            for export in config.export.iter().filter(|e| e.is_active()) {
                let exporter = self
                    .adapters
                    .exporter(export, self.workdir, self.project)
                    .await?;
                let report = exporter
                    .export(&data, &ctx)
                    .await
                    .with_context(|| format!("{} export failed", exporter.kind()))?;
                tracing::info!(
                    "{} export: {} rows written, {} duplicates, {} failed",
                    exporter.kind(),
                    report.exported,
                    report.duplicates.len(),
                    report.failed.len()
                );
                summary.exported += report.exported;
            }
        }

        for batch in parsed_files {
            let moved = batch.archive_all(&errlog);
            if moved > 0 {
                tracing::info!("archived {} static files", moved);
            }
        }

        store.save(&state)?;
        Ok(summary)
    }
}

/// Fetch one remote source, updating its persisted state in place.
async fn acquire_remote(plan: &RemotePlan, state: &mut SourceState, now: f64) -> FetchOutcome {
    let window = &plan.window;
    let reset = window.start_from.filter(|r| state.reset_applied != Some(*r));
    if let Some(reset) = reset {
        tracing::info!("applying start-from reset to {}", reset);
    }

    let policy = WatermarkPolicy::new(now, window.init_time, reset);
    let mut watermarks = WatermarkStore::new(std::mem::take(&mut state.nonce), policy);
    let mut buffers = window
        .buffer_size
        .map(|span| DedupBuffers::new(span, std::mem::take(&mut state.buff)));

    let outcome = WindowedFetcher::new(plan.source.as_ref(), window.step())
        .fetch_all(&plan.streams, &mut watermarks, buffers.as_mut(), now)
        .await;

    state.nonce = watermarks.materialize();
    state.buff = buffers.map(|b| b.materialize()).unwrap_or_default();
    if reset.is_some() {
        state.reset_applied = reset;
    }
    outcome
}
