// CSV sink - writes rows with a `node,sensor,unit,timestamp,value` header
use crate::application::exporter::{ExportContext, ExportReport, Exporter};
use crate::domain::row::Row;
use crate::infrastructure::config::{CsvExportConfig, CsvMode};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn write_rows<W: Write>(writer: W, rows: &[Row], header: bool) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(header)
        .from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub struct CsvExporter {
    workdir: PathBuf,
    project: String,
    config: CsvExportConfig,
}

impl CsvExporter {
    pub fn new(workdir: &Path, project: &str, config: CsvExportConfig) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            project: project.to_string(),
            config,
        }
    }

    fn target(&self, now: f64) -> PathBuf {
        match &self.config.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => self.workdir.join(p),
            None => self
                .workdir
                .join("outputs")
                .join(&self.project)
                .join(format!("{}-{}.csv", self.config.prefix, now as i64)),
        }
    }
}

#[async_trait]
impl Exporter for CsvExporter {
    fn kind(&self) -> &'static str {
        "csv"
    }

    async fn export(&self, rows: &[Row], ctx: &ExportContext<'_>) -> Result<ExportReport> {
        let path = self.target(ctx.now);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let (file, header) = match self.config.mode {
            CsvMode::Overwrite => (fs::File::create(&path), true),
            CsvMode::Append => {
                let fresh = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
                let file = OpenOptions::new().create(true).append(true).open(&path);
                (file, fresh)
            }
        };
        let file = file.with_context(|| format!("failed to open {}", path.display()))?;

        tracing::info!("writing {} rows to {}", rows.len(), path.display());
        write_rows(file, rows, header)?;

        Ok(ExportReport {
            exported: rows.len(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::errlog::ErrorLog;

    fn exporter(workdir: &Path, json: &str) -> CsvExporter {
        CsvExporter::new(workdir, "demo", serde_json::from_str(json).unwrap())
    }

    #[tokio::test]
    async fn test_default_path_is_timestamped() {
        let tmp = tempfile::tempdir().unwrap();
        let errlog = ErrorLog::new(tmp.path(), "demo");
        let ctx = ExportContext {
            errlog: &errlog,
            now: 1_700_000_000.0,
        };

        exporter(tmp.path(), "{}")
            .export(&[Row::new("n", "s", "u", 1.0, 2.0)], &ctx)
            .await
            .unwrap();

        let text = fs::read_to_string(tmp.path().join("outputs/demo/raw-1700000000.csv")).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("node,sensor,unit,timestamp,value"));
        assert_eq!(lines.count(), 1);
    }

    #[tokio::test]
    async fn test_append_writes_header_once() {
        let tmp = tempfile::tempdir().unwrap();
        let errlog = ErrorLog::new(tmp.path(), "demo");
        let ctx = ExportContext { errlog: &errlog, now: 0.0 };
        let csv = exporter(tmp.path(), r#"{"path": "all.csv", "mode": "append"}"#);

        csv.export(&[Row::new("n", "s", "u", 1.0, 2.0)], &ctx).await.unwrap();
        csv.export(&[Row::new("n", "s", "u", 2.0, 3.0)], &ctx).await.unwrap();

        let text = fs::read_to_string(tmp.path().join("all.csv")).unwrap();
        assert_eq!(text.matches("node,sensor").count(), 1);
        assert_eq!(text.lines().count(), 3);
    }
}
