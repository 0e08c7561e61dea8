use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Local snapshot of the sheet exports: task rows and working-day cells, each
/// kept as the JSON the sheet endpoint returns.
#[derive(Debug)]
pub struct SheetStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub workdays_path: PathBuf,
}

impl SheetStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.json");
        let workdays_path = data_dir.join("workdays.json");

        if !tasks_path.exists() {
            fs::write(&tasks_path, "[]")?;
        }
        if !workdays_path.exists() {
            fs::write(&workdays_path, "[]")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            workdays = %workdays_path.display(),
            "opened sheet store"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            workdays_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_task_rows(&self) -> anyhow::Result<Vec<Vec<Value>>> {
        load_json(&self.tasks_path).context("failed to load tasks.json")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_working_day_cells(&self) -> anyhow::Result<Vec<Value>> {
        load_json(&self.workdays_path).context("failed to load workdays.json")
    }

    #[tracing::instrument(skip(self, rows))]
    pub fn save_task_rows(&self, rows: &[Vec<Value>]) -> anyhow::Result<()> {
        save_json_atomic(&self.tasks_path, &rows).context("failed to save tasks.json")
    }

    #[tracing::instrument(skip(self, cells))]
    pub fn save_working_day_cells(&self, cells: &[Value]) -> anyhow::Result<()> {
        save_json_atomic(&self.workdays_path, &cells).context("failed to save workdays.json")
    }
}

#[tracing::instrument(skip(path))]
fn load_json<T>(path: &Path) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    debug!(file = %path.display(), "loading json");
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&raw).with_context(|| format!("failed parsing {}", path.display()))
}

#[tracing::instrument(skip(path, value))]
fn save_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    debug!(file = %path.display(), "saving json atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, value)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
