// Static registry - maps configured `type` tags onto adapter implementations
use crate::application::exporter::{Exporter, TableExporter};
use crate::application::pipeline::Adapters;
use crate::application::remote_source::RemotePlan;
use crate::application::reshaper::{Reshaper, ValueMapper};
use crate::application::static_source::FileParser;
use crate::infrastructure::config::{ExportConfig, ParserKind, ReshapeConfig, SourceConfig};
use crate::infrastructure::csv_export::CsvExporter;
use crate::infrastructure::csv_parsers::{HoboCsvParser, SimpleCsvParser};
use crate::infrastructure::egauge::{self, EgaugeSource};
use crate::infrastructure::postgres_sink::PostgresSink;
use crate::infrastructure::webctrl::{self, WebctrlSource};
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

pub fn parser_for(kind: ParserKind) -> Box<dyn FileParser> {
    match kind {
        ParserKind::SimpleCsv => Box::new(SimpleCsvParser),
        ParserKind::HoboCsv => Box::new(HoboCsvParser),
    }
}

pub fn reshaper_for(config: &ReshapeConfig) -> Box<dyn Reshaper> {
    match config {
        ReshapeConfig::ValueMap(c) => Box::new(ValueMapper::new(c)),
    }
}

/// Production adapters: HTTP sources, CSV files and PostgreSQL.
pub struct Registry;

#[async_trait]
impl Adapters for Registry {
    fn remote(&self, source: &SourceConfig, project: &str) -> Result<Option<RemotePlan>> {
        let plan = match source {
            SourceConfig::Webctrl(c) => RemotePlan {
                source: Box::new(WebctrlSource::new(&c.settings)?),
                streams: webctrl::descriptors(c, project),
                window: c.settings.window.clone(),
            },
            SourceConfig::Egauge(c) => RemotePlan {
                source: Box::new(EgaugeSource::new(&c.settings)?),
                streams: egauge::descriptors(c),
                window: c.settings.window.clone(),
            },
            SourceConfig::Static(_) => return Ok(None),
        };
        Ok(Some(plan))
    }

    async fn exporter(
        &self,
        config: &ExportConfig,
        workdir: &Path,
        project: &str,
    ) -> Result<Box<dyn Exporter>> {
        Ok(match config {
            ExportConfig::Csv(c) => Box::new(CsvExporter::new(workdir, project, c.clone())),
            ExportConfig::Psql(c) => {
                let sink = PostgresSink::connect(&c.database_url, &c.table, &c.conversions).await?;
                Box::new(TableExporter::new(
                    Box::new(sink),
                    c.primary_key.clone(),
                    c.archive_duplicates,
                ))
            }
        })
    }
}
