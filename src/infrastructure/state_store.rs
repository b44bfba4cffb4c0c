// JSON state store - one state file per project, replaced atomically
use crate::domain::state::PipelineState;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            path: project_dir.join("state.json"),
        }
    }

    /// A missing file is an empty state; an unreadable one is an error.
    pub fn load(&self) -> Result<PipelineState> {
        if !self.path.exists() {
            return Ok(PipelineState::default());
        }
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("failed to read state at {}", self.path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse state JSON at {}", self.path.display()))
    }

    pub fn save(&self, state: &PipelineState) -> Result<()> {
        let dir = self
            .path
            .parent()
            .with_context(|| format!("state path has no parent: {}", self.path.display()))?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let contents = serde_json::to_vec_pretty(state)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&contents)?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|err| anyhow::anyhow!("failed to persist state: {err}"))?;
        Ok(())
    }
}
