// Configuration - runtime settings and per-project pipeline definitions
use crate::application::error::ConfigError;
use crate::domain::row::RowField;
use crate::domain::selector::Selector;
use crate::domain::watermark::DEFAULT_STEP_SECS;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_EGAUGE_URL: &str = "http://egauge{gauge}.egaug.es/cgi-bin/egauge-show?c&C&m";

fn default_true() -> bool {
    true
}

fn default_unit() -> String {
    "undefined".to_string()
}

fn default_workdir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_csv_prefix() -> String {
    "raw".to_string()
}

fn default_egauge_url() -> String {
    DEFAULT_EGAUGE_URL.to_string()
}

/// Process-wide settings: `config/pipeline.*` layered with `PIPELINE_*` env vars.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeSettings {
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    /// Comma separated project names; all projects when absent.
    #[serde(default)]
    pub projects: Option<String>,
}

impl RuntimeSettings {
    pub fn project_filter(&self) -> Option<Vec<String>> {
        self.projects.as_ref().map(|list| {
            list.split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
    }
}

pub fn load_runtime_settings() -> anyhow::Result<RuntimeSettings> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/pipeline").required(false))
        .add_source(config::Environment::with_prefix("PIPELINE"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectConfig {
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub acquire: Vec<SourceConfig>,
    #[serde(default)]
    pub extra: Vec<GeneratorConfig>,
    #[serde(default)]
    pub reshape: Vec<ReshapeConfig>,
    pub export: Vec<ExportConfig>,
}

// ---- acquisition ----

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SourceConfig {
    Webctrl(WebctrlConfig),
    Egauge(EgaugeConfig),
    Static(StaticConfig),
}

impl SourceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::Webctrl(_) => "webctrl",
            SourceConfig::Egauge(_) => "egauge",
            SourceConfig::Static(_) => "static",
        }
    }

    /// Key of this source's state; defaults to its type.
    pub fn name(&self) -> &str {
        let name = match self {
            SourceConfig::Webctrl(c) => c.name.as_deref(),
            SourceConfig::Egauge(c) => c.name.as_deref(),
            SourceConfig::Static(c) => c.name.as_deref(),
        };
        name.unwrap_or(self.kind())
    }

    pub fn is_active(&self) -> bool {
        match self {
            SourceConfig::Webctrl(c) => c.is_active,
            SourceConfig::Egauge(c) => c.is_active,
            SourceConfig::Static(c) => c.is_active,
        }
    }
}

/// Watermark and buffering settings shared by remote sources.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct WindowSettings {
    pub init_time: Option<f64>,
    pub step_time: Option<f64>,
    pub start_from: Option<f64>,
    pub buffer_size: Option<f64>,
    pub timeout_secs: Option<u64>,
}

impl WindowSettings {
    pub fn step(&self) -> f64 {
        self.step_time.unwrap_or(DEFAULT_STEP_SECS)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    fn validate(&self) -> Result<(), String> {
        if self.step_time.is_some_and(|s| !(s > 0.0)) {
            return Err("`step-time` must be positive".to_string());
        }
        if self.buffer_size.is_some_and(|s| !(s > 0.0)) {
            return Err("`buffer-size` must be positive".to_string());
        }
        if self.timeout_secs == Some(0) {
            return Err("`timeout-secs` must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct WebctrlConfig {
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub settings: WebctrlSettings,
    pub sensor: Vec<WebctrlSensor>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct WebctrlSettings {
    pub server: String,
    pub login: Login,
    #[serde(flatten)]
    pub window: WindowSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Login {
    pub name: String,
    pub pass: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct WebctrlSensor {
    pub name: String,
    pub path: String,
    pub node: Option<String>,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct EgaugeConfig {
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub settings: EgaugeSettings,
    /// Node name -> gauge device id.
    pub nodes: BTreeMap<String, GaugeEntry>,
}

/// Either a bare device id or `{ gauge = "..", is-active = false }`.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum GaugeEntry {
    Id(String),
    Detailed {
        gauge: String,
        #[serde(default = "default_true", rename = "is-active")]
        is_active: bool,
    },
}

impl GaugeEntry {
    pub fn gauge(&self) -> &str {
        match self {
            GaugeEntry::Id(gauge) | GaugeEntry::Detailed { gauge, .. } => gauge,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            GaugeEntry::Id(_) => true,
            GaugeEntry::Detailed { is_active, .. } => *is_active,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct EgaugeSettings {
    #[serde(default = "default_egauge_url")]
    pub url_template: String,
    #[serde(flatten)]
    pub window: WindowSettings,
}

impl Default for EgaugeSettings {
    fn default() -> Self {
        Self {
            url_template: default_egauge_url(),
            window: WindowSettings::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct StaticConfig {
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub settings: StaticSettings,
    pub parser: Vec<ParserSpec>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct StaticSettings {
    pub source: Option<PathBuf>,
    pub on_fmt: Option<PathBuf>,
    pub on_err: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ParserSpec {
    pub parser: ParserKind,
    pub source: Option<PathBuf>,
    pub suffix: Option<String>,
    pub on_fmt: Option<PathBuf>,
    pub on_err: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ParserKind {
    SimpleCsv,
    HoboCsv,
}

impl std::fmt::Display for ParserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ParserKind::SimpleCsv => "simple-csv",
            ParserKind::HoboCsv => "hobo-csv",
        })
    }
}

// ---- generated rows ----

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GeneratorConfig {
    CalculatedRow(CalculatedRowConfig),
}

impl GeneratorConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            GeneratorConfig::CalculatedRow(_) => "calculated-row",
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            GeneratorConfig::CalculatedRow(c) => c.is_active,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct CalculatedRowConfig {
    pub data_point: DataPointConfig,
    pub add: Selector,
    #[serde(default)]
    pub sub: Option<Selector>,
    #[serde(default)]
    pub expect: ExpectConfig,
    #[serde(default)]
    pub modify: ModifyConfig,
    /// Seconds after which an incomplete group is dropped.
    #[serde(default)]
    pub max_partial_age: Option<f64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataPointConfig {
    pub node: String,
    pub sensor: String,
    #[serde(default = "default_unit")]
    pub unit: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ExpectConfig {
    pub add_count: Option<usize>,
    pub sub_count: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ModifyConfig {
    /// Decimal places; unrounded when absent.
    pub round: Option<u32>,
}

// ---- reshaping ----

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ReshapeConfig {
    ValueMap(ValueMapConfig),
}

impl ReshapeConfig {
    pub fn is_active(&self) -> bool {
        match self {
            ReshapeConfig::ValueMap(c) => c.is_active,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ValueMapConfig {
    pub field: RowField,
    pub map: BTreeMap<String, String>,
    #[serde(default)]
    pub ignores: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

// ---- export ----

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExportConfig {
    Csv(CsvExportConfig),
    Psql(PsqlExportConfig),
}

impl ExportConfig {
    pub fn is_active(&self) -> bool {
        match self {
            ExportConfig::Csv(c) => c.is_active,
            ExportConfig::Psql(c) => c.is_active,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CsvMode {
    #[default]
    Overwrite,
    Append,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct CsvExportConfig {
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub mode: CsvMode,
    #[serde(default = "default_csv_prefix")]
    pub prefix: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Conversion {
    #[default]
    Default,
    ToTimestamp,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct PsqlExportConfig {
    pub database_url: String,
    pub table: String,
    #[serde(default)]
    pub conversions: BTreeMap<RowField, Conversion>,
    pub primary_key: Option<Vec<RowField>>,
    #[serde(default)]
    pub archive_duplicates: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

// ---- loading ----

pub fn project_dir(workdir: &Path, project: &str) -> PathBuf {
    workdir.join("projects").join(project)
}

/// Load `<workdir>/projects/<project>/config.{toml,json}` and validate it.
pub fn load_project_config(workdir: &Path, project: &str) -> Result<ProjectConfig, ConfigError> {
    let path = project_dir(workdir, project).join("config");
    let load = |source| ConfigError::Load {
        project: project.to_string(),
        source,
    };
    let settings = config::Config::builder()
        .add_source(config::File::with_name(&path.to_string_lossy()))
        .build()
        .map_err(load)?;
    let parsed: ProjectConfig = settings.try_deserialize().map_err(load)?;

    parsed.validate().map_err(|message| ConfigError::Invalid {
        project: project.to_string(),
        message,
    })?;
    Ok(parsed)
}

impl ProjectConfig {
    /// Checks that serde alone cannot express.
    pub fn validate(&self) -> Result<(), String> {
        let mut names = HashSet::new();
        for source in &self.acquire {
            if !names.insert(source.name()) {
                return Err(format!("duplicate source name `{}`", source.name()));
            }
            let scope = |e: String| format!("source `{}`: {}", source.name(), e);
            match source {
                SourceConfig::Webctrl(c) => {
                    c.settings.window.validate().map_err(scope)?;
                    if let Some(s) = c
                        .sensor
                        .iter()
                        .find(|s| s.name.trim().is_empty() || s.path.trim().is_empty())
                    {
                        return Err(scope(format!("sensor `{}` needs a name and path", s.name)));
                    }
                }
                SourceConfig::Egauge(c) => {
                    c.settings.window.validate().map_err(scope)?;
                    if !c.settings.url_template.contains("{gauge}") {
                        return Err(scope("`url-template` must contain `{gauge}`".to_string()));
                    }
                }
                SourceConfig::Static(_) => {}
            }
        }

        for generator in &self.extra {
            let GeneratorConfig::CalculatedRow(c) = generator;
            if c.max_partial_age.is_some_and(|a| !(a > 0.0)) {
                return Err(format!(
                    "calculated-row `{}`: `max-partial-age` must be positive",
                    c.data_point.sensor
                ));
            }
        }

        for reshaper in &self.reshape {
            let ReshapeConfig::ValueMap(c) = reshaper;
            if !c.field.is_textual() {
                return Err(format!("value-map cannot remap numeric field `{}`", c.field));
            }
        }

        for export in &self.export {
            if let ExportConfig::Psql(c) = export {
                if !is_table_name(&c.table) {
                    return Err(format!("invalid table name `{}`", c.table));
                }
                if c.primary_key.as_ref().is_some_and(|pk| pk.is_empty()) {
                    return Err("`primary-key` must name at least one field".to_string());
                }
            }
        }

        Ok(())
    }
}

/// `schema.table` style identifiers only; the name is spliced into SQL.
fn is_table_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const PROJECT: &str = r##"
[[acquire]]
type = "webctrl"
[acquire.settings]
server = "https://webctrl.example/trend"
step-time = 3600
buffer-size = 86400
[acquire.settings.login]
name = "reader"
pass = "secret"
[[acquire.sensor]]
name = "Chiller Power"
path = "#chiller/kw"
unit = "kw"

[[acquire]]
type = "static"
[[acquire.parser]]
parser = "hobo-csv"
suffix = ".csv"

[[extra]]
type = "calculated-row"
data-point = { node = "plant", sensor = "net" }
add = { sensor = "*power" }
sub = { include = { node = "plant" }, exclude = { sensor = "aux*" } }
expect = { add-count = 1, sub-count = 0 }
modify = { round = 2 }

[[export]]
type = "csv"
mode = "append"
path = "out.csv"
"##;

    fn write_project(dir: &Path, body: &str) {
        let project = project_dir(dir, "demo");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("config.toml"), body).unwrap();
    }

    #[test]
    fn test_load_project_config() {
        let tmp = tempfile::tempdir().unwrap();
        write_project(tmp.path(), PROJECT);

        let config = load_project_config(tmp.path(), "demo").unwrap();

        assert_eq!(config.acquire.len(), 2);
        assert_eq!(config.acquire[0].name(), "webctrl");
        let SourceConfig::Webctrl(webctrl) = &config.acquire[0] else {
            panic!("expected webctrl source");
        };
        assert_eq!(webctrl.settings.window.step(), 3600.0);
        assert_eq!(webctrl.settings.window.buffer_size, Some(86400.0));
        assert_eq!(webctrl.sensor[0].node, None);
        let GeneratorConfig::CalculatedRow(calc) = &config.extra[0];
        assert_eq!(calc.data_point.unit, "undefined");
        assert_eq!(calc.modify.round, Some(2));
        assert!(matches!(&config.export[0], ExportConfig::Csv(c) if c.mode == CsvMode::Append));
    }

    #[test]
    fn test_unknown_type_is_a_load_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_project(
            tmp.path(),
            "[[acquire]]\ntype = \"ftp\"\n\n[[export]]\ntype = \"csv\"\n",
        );
        assert!(matches!(
            load_project_config(tmp.path(), "demo"),
            Err(ConfigError::Load { .. })
        ));
    }

    #[test]
    fn test_missing_export_section_is_a_load_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_project(tmp.path(), "acquire = []\n");
        assert!(load_project_config(tmp.path(), "demo").is_err());
    }

    #[test]
    fn test_invalid_table_name_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_project(
            tmp.path(),
            "acquire = []\n[[export]]\ntype = \"psql\"\ndatabase-url = \"postgres://x\"\ntable = \"t; drop table t\"\n",
        );
        assert!(matches!(
            load_project_config(tmp.path(), "demo"),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_table_names() {
        assert!(is_table_name("readings"));
        assert!(is_table_name("public.readings_2"));
        assert!(!is_table_name("1readings"));
        assert!(!is_table_name("a.b c"));
        assert!(!is_table_name(""));
    }

    #[test]
    fn test_project_filter() {
        let settings = RuntimeSettings {
            workdir: default_workdir(),
            projects: Some("a, b,,c".to_string()),
        };
        assert_eq!(
            settings.project_filter(),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }
}
