// Export step - sink traits and per-row isolated table export
use crate::application::error::InsertError;
use crate::domain::row::{Row, RowField};
use crate::infrastructure::errlog::ErrorLog;
use async_trait::async_trait;
use std::collections::HashSet;

pub struct ExportContext<'a> {
    pub errlog: &'a ErrorLog,
    pub now: f64,
}

#[derive(Debug, Default, PartialEq)]
pub struct ExportReport {
    pub exported: usize,
    pub duplicates: Vec<Row>,
    pub failed: Vec<(Row, String)>,
}

#[async_trait]
pub trait Exporter: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn export(&self, rows: &[Row], ctx: &ExportContext<'_>) -> anyhow::Result<ExportReport>;
}

/// A store accepting one row at a time.
#[async_trait]
pub trait RowSink: Send + Sync {
    async fn insert_row(&self, row: &Row) -> Result<(), InsertError>;
}

/// Insert every row, isolating failures. Rows repeating an earlier row's
/// primary key within the batch are reported as duplicates without an insert.
pub async fn push_rows(
    sink: &dyn RowSink,
    rows: &[Row],
    primary_key: Option<&[RowField]>,
) -> ExportReport {
    let mut report = ExportReport::default();
    let mut seen_keys = HashSet::new();

    for row in rows {
        if let Some(fields) = primary_key {
            let key: Vec<String> = fields
                .iter()
                .map(|f| row.field_text(*f).into_owned())
                .collect();
            if !seen_keys.insert(key) {
                report.duplicates.push(row.clone());
                continue;
            }
        }
        match sink.insert_row(row).await {
            Ok(()) => report.exported += 1,
            Err(InsertError::Duplicate(_)) => report.duplicates.push(row.clone()),
            Err(InsertError::Failed(msg)) => report.failed.push((row.clone(), msg)),
        }
    }

    report
}

pub struct TableExporter {
    sink: Box<dyn RowSink>,
    primary_key: Option<Vec<RowField>>,
    archive_duplicates: bool,
}

impl TableExporter {
    pub fn new(
        sink: Box<dyn RowSink>,
        primary_key: Option<Vec<RowField>>,
        archive_duplicates: bool,
    ) -> Self {
        Self {
            sink,
            primary_key,
            archive_duplicates,
        }
    }
}

#[async_trait]
impl Exporter for TableExporter {
    fn kind(&self) -> &'static str {
        "psql"
    }

    async fn export(&self, rows: &[Row], ctx: &ExportContext<'_>) -> anyhow::Result<ExportReport> {
        let report = push_rows(self.sink.as_ref(), rows, self.primary_key.as_deref()).await;

        if !report.duplicates.is_empty() {
            tracing::info!("duplicate rows ignored: {}", report.duplicates.len());
            if self.archive_duplicates {
                ctx.errlog.write_rows("duplicates", &report.duplicates, ctx.now)?;
            }
        }
        if !report.failed.is_empty() {
            tracing::warn!("{} rows failed to insert", report.failed.len());
            let failed: Vec<Row> = report.failed.iter().map(|(r, _)| r.clone()).collect();
            ctx.errlog.write_rows("psqlerr", &failed, ctx.now)?;
            for (_, msg) in &report.failed {
                ctx.errlog.append(msg);
            }
        }

        Ok(report)
    }
}
