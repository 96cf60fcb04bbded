use crate::stats::{ExerciseResult, UserStats};
use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const STATS_FILE: &str = "mindflow_stats.json";
pub const RESULTS_FILE: &str = "mindflow_results.json";

/// Where progress lives between runs. Read once at startup, written after
/// every change.
pub trait ProgressStore {
    fn load(&self) -> Result<(UserStats, Vec<ExerciseResult>)>;

    fn save(&self, stats: &UserStats, results: &[ExerciseResult]) -> Result<()>;
}

/// Two JSON documents with fixed names inside a data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(value))
    }

    // Write to a sibling temp file first so a crash never leaves half a document.
    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

impl ProgressStore for JsonFileStore {
    fn load(&self) -> Result<(UserStats, Vec<ExerciseResult>)> {
        let stats = self.read_json(STATS_FILE)?.unwrap_or_default();
        let results = self.read_json(RESULTS_FILE)?.unwrap_or_default();
        Ok((stats, results))
    }

    fn save(&self, stats: &UserStats, results: &[ExerciseResult]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        self.write_json(RESULTS_FILE, results)?;
        self.write_json(STATS_FILE, stats)?;
        tracing::debug!("Progress saved to {}", self.dir.display());
        Ok(())
    }
}

/// In-memory store. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Option<(UserStats, Vec<ExerciseResult>)>>>,
}

impl ProgressStore for MemoryStore {
    fn load(&self) -> Result<(UserStats, Vec<ExerciseResult>)> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(guard.clone().unwrap_or_default())
    }

    fn save(&self, stats: &UserStats, results: &[ExerciseResult]) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        *guard = Some((stats.clone(), results.to_vec()));
        Ok(())
    }
}
