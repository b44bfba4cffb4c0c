// Per-project error log and rejected-row archives
use crate::domain::row::Row;
use crate::infrastructure::csv_export::write_rows;
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ErrorLog {
    dir: PathBuf,
    project: String,
}

impl ErrorLog {
    pub fn new(workdir: &Path, project: &str) -> Self {
        Self {
            dir: workdir.join("errors").join(project),
            project: project.to_string(),
        }
    }

    /// Append a block to `errlog.txt`. Failures to write are reported
    /// through tracing only.
    pub fn append(&self, text: &str) {
        if let Err(e) = self.try_append(text) {
            tracing::error!("failed to append to error log for {}: {:#}", self.project, e);
        }
    }

    fn try_append(&self, text: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.dir.join("errlog.txt");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        writeln!(file, "logtime............{}", chrono::Utc::now().timestamp())?;
        writeln!(file, "project............{}", self.project)?;
        writeln!(file, "{}", text)?;
        writeln!(file, "...................endlog\n")?;
        Ok(())
    }

    /// Append rejected rows to `<prefix>-<unix>.csv`; the header is written
    /// only when the file starts out empty.
    pub fn write_rows(&self, prefix: &str, rows: &[Row], now: f64) -> Result<Option<PathBuf>> {
        if rows.is_empty() {
            return Ok(None);
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.dir.join(format!("{}-{}.csv", prefix, now as i64));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let fresh = file.metadata()?.len() == 0;
        write_rows(file, rows, fresh)?;
        tracing::info!("wrote {} rejected rows to {}", rows.len(), path.display());
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_block_format() {
        let tmp = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(tmp.path(), "demo");
        log.append("first problem");
        log.append("second problem");

        let text = fs::read_to_string(tmp.path().join("errors/demo/errlog.txt")).unwrap();
        assert_eq!(text.matches("...................endlog").count(), 2);
        assert!(text.contains("project............demo\nfirst problem\n"));
    }

    #[test]
    fn test_write_rows_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(tmp.path(), "demo");
        let path = log
            .write_rows("fmterr", &[Row::new("n", "s", "u", 1.0, 2.5)], 1_700_000_000.0)
            .unwrap()
            .unwrap();

        assert!(path.ends_with("fmterr-1700000000.csv"));
        let text = fs::read_to_string(path).unwrap();
        assert!(text.starts_with("node,sensor,unit,timestamp,value\n"));
        assert!(log.write_rows("fmterr", &[], 0.0).unwrap().is_none());
    }

    #[test]
    fn test_write_rows_same_second_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(tmp.path(), "demo");
        let now = 1_700_000_000.0;
        let first = log.write_rows("psqlerr", &[Row::new("a", "s", "u", 1.0, 1.0)], now);
        let second = log.write_rows("psqlerr", &[Row::new("b", "s", "u", 2.0, 2.0)], now);
        assert_eq!(first.unwrap(), second.unwrap());

        let text = fs::read_to_string(tmp.path().join("errors/demo/psqlerr-1700000000.csv")).unwrap();
        assert_eq!(text.matches("node,sensor,unit,timestamp,value").count(), 1);
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("a,s,u,"));
        assert!(text.contains("b,s,u,"));
    }
}
