// Static acquisition - parse dropped-in files, then archive or quarantine them
use crate::application::error::ParseError;
use crate::domain::row::Row;
use crate::infrastructure::config::{ParserSpec, StaticConfig};
use crate::infrastructure::errlog::ErrorLog;
use crate::infrastructure::registry::parser_for;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub trait FileParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<Vec<Row>, ParseError>;
}

/// Resolved directories for one parser spec.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticDirs {
    pub source: PathBuf,
    pub on_fmt: PathBuf,
    pub on_err: PathBuf,
}

/// Rows read from parsed files, plus the archive moves that must wait until
/// those rows have been exported.
#[derive(Debug, Default)]
pub struct StaticBatch {
    pub rows: Vec<Row>,
    pub archive: Vec<(PathBuf, PathBuf)>,
}

impl StaticBatch {
    /// Move every parsed file into its archive directory. Failures are
    /// logged; the file is then parsed again next run.
    pub fn archive_all(self, errlog: &ErrorLog) -> usize {
        let mut moved = 0;
        for (file, dest) in &self.archive {
            match move_file(file, dest) {
                Ok(_) => moved += 1,
                Err(e) => {
                    tracing::warn!("{:#}", e);
                    errlog.append(&format!("{:#}", e));
                }
            }
        }
        moved
    }
}

pub struct StaticAcquisition<'a> {
    project: &'a str,
    workdir: &'a Path,
    config: &'a StaticConfig,
}

impl<'a> StaticAcquisition<'a> {
    pub fn new(project: &'a str, workdir: &'a Path, config: &'a StaticConfig) -> Self {
        Self {
            project,
            workdir,
            config,
        }
    }

    pub fn dirs_for(&self, spec: &ParserSpec) -> StaticDirs {
        let settings = &self.config.settings;
        let resolve = |configured: Option<&PathBuf>, fallback: Option<&PathBuf>, default: PathBuf| {
            match configured.or(fallback) {
                Some(p) if p.is_absolute() => p.clone(),
                Some(p) => self.workdir.join(p),
                None => self.workdir.join(default),
            }
        };
        StaticDirs {
            source: resolve(
                spec.source.as_ref(),
                settings.source.as_ref(),
                PathBuf::from("inputs").join(self.project),
            ),
            on_fmt: resolve(
                spec.on_fmt.as_ref(),
                settings.on_fmt.as_ref(),
                PathBuf::from("archive").join(self.project).join("static"),
            ),
            on_err: resolve(
                spec.on_err.as_ref(),
                settings.on_err.as_ref(),
                PathBuf::from("errors").join(self.project).join("static"),
            ),
        }
    }

    /// Run every active parser spec. Per-file failures are logged and the
    /// file is moved to the error directory; they never abort acquisition.
    /// Parsed files stay in place until the caller archives the batch.
    pub fn acquire(&self, errlog: &ErrorLog) -> StaticBatch {
        let mut batch = StaticBatch::default();
        for spec in &self.config.parser {
            if !spec.is_active {
                tracing::info!("skipping static parser {} (inactive)", spec.parser);
                continue;
            }
            tracing::info!("running static file parser: {}", spec.parser);
            let dirs = self.dirs_for(spec);
            let files = match list_files(&dirs.source, spec.suffix.as_deref()) {
                Ok(files) => files,
                Err(e) => {
                    tracing::warn!("static parser {} skipped: {:#}", spec.parser, e);
                    errlog.append(&format!("static parser {}: {:#}", spec.parser, e));
                    continue;
                }
            };
            let parser = parser_for(spec.parser);
            for file in files {
                if let Some(rows) = self.ingest_file(parser.as_ref(), &file, &dirs, errlog) {
                    batch.rows.extend(rows);
                    batch.archive.push((file, dirs.on_fmt.clone()));
                }
            }
        }
        batch
    }

    fn ingest_file(
        &self,
        parser: &dyn FileParser,
        file: &Path,
        dirs: &StaticDirs,
        errlog: &ErrorLog,
    ) -> Option<Vec<Row>> {
        tracing::info!("attempting to parse file: {}", file.display());
        match parse_checked(parser, file) {
            Ok(rows) => {
                tracing::info!("{} rows acquired from {}", rows.len(), file.display());
                Some(rows)
            }
            Err(e) => {
                tracing::warn!(
                    "error while parsing {}: {}; moving to {}",
                    file.display(),
                    e,
                    dirs.on_err.display()
                );
                errlog.append(&format!("failed to parse {}: {}", file.display(), e));
                if let Err(e) = move_file(file, &dirs.on_err) {
                    tracing::warn!("{:#}", e);
                }
                None
            }
        }
    }
}

fn parse_checked(parser: &dyn FileParser, file: &Path) -> Result<Vec<Row>, ParseError> {
    let rows = parser.parse(file)?;
    if let Some(bad) = rows.iter().find(|r| !r.is_well_formed()) {
        return Err(ParseError::MalformedRow(format!("{:?}", bad)));
    }
    Ok(rows)
}

/// Regular files in `dir` whose name ends with `suffix` (`*` or none = all),
/// in name order.
pub fn list_files(dir: &Path, suffix: Option<&str>) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("source directory does not exist: {}", dir.display()))?;
    let suffix = suffix.filter(|s| *s != "*");
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if suffix.map(|s| name.ends_with(s)).unwrap_or(true) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn move_file(file: &Path, dest_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dest_dir)
        .with_context(|| format!("failed to create {}", dest_dir.display()))?;
    let name = file
        .file_name()
        .with_context(|| format!("not a file: {}", file.display()))?;
    let target = dest_dir.join(name);
    fs::rename(file, &target)
        .with_context(|| format!("failed to move {} to {}", file.display(), target.display()))?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_config(json: &str) -> StaticConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_default_dirs_follow_project_layout() {
        let config = static_config(r#"{"parser": [{"parser": "simple-csv"}]}"#);
        let workdir = PathBuf::from("/work");
        let acq = StaticAcquisition::new("demo", &workdir, &config);
        let dirs = acq.dirs_for(&config.parser[0]);
        assert_eq!(dirs.source, PathBuf::from("/work/inputs/demo"));
        assert_eq!(dirs.on_fmt, PathBuf::from("/work/archive/demo/static"));
        assert_eq!(dirs.on_err, PathBuf::from("/work/errors/demo/static"));
    }

    #[test]
    fn test_parsed_and_failed_files_are_relocated() {
        let tmp = tempfile::tempdir().unwrap();
        let inputs = tmp.path().join("inputs").join("demo");
        fs::create_dir_all(&inputs).unwrap();
        fs::write(
            inputs.join("good.csv"),
            "node,sensor,unit,timestamp,value\nbldg1,temp,f,100,71.5\n",
        )
        .unwrap();
        fs::write(inputs.join("bad.csv"), "what,is,this\n1,2,3\n").unwrap();
        fs::write(inputs.join("notes.txt"), "ignored").unwrap();

        let config = static_config(r#"{"parser": [{"parser": "simple-csv", "suffix": ".csv"}]}"#);
        let errlog = ErrorLog::new(tmp.path(), "demo");
        let batch = StaticAcquisition::new("demo", tmp.path(), &config).acquire(&errlog);

        assert_eq!(batch.rows, vec![Row::new("bldg1", "temp", "f", 100.0, 71.5)]);
        assert!(tmp.path().join("errors/demo/static/bad.csv").exists());
        assert!(inputs.join("notes.txt").exists());
        let log = fs::read_to_string(tmp.path().join("errors/demo/errlog.txt")).unwrap();
        assert!(log.contains("bad.csv"));

        // Parsed files wait in the source directory until archived.
        assert!(inputs.join("good.csv").exists());
        assert_eq!(batch.archive_all(&errlog), 1);
        assert!(!inputs.join("good.csv").exists());
        assert!(tmp.path().join("archive/demo/static/good.csv").exists());
    }

    #[test]
    fn test_missing_source_dir_is_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let config = static_config(r#"{"parser": [{"parser": "hobo-csv"}]}"#);
        let errlog = ErrorLog::new(tmp.path(), "demo");
        let batch = StaticAcquisition::new("demo", tmp.path(), &config).acquire(&errlog);
        assert!(batch.rows.is_empty());
        assert!(batch.archive.is_empty());
    }
}
