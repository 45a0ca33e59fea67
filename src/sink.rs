//! Append-only text log for status records.

use qubox_core::Result;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

pub struct LogSink {
    path: PathBuf,
    file: File,
    records: u64,
}

impl LogSink {
    /// Open `path` for appending, creating it (and its directory) if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path).await?;
        info!("Appending status records to {}", path.display());
        Ok(Self { path: path.to_path_buf(), file, records: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written through this handle.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub async fn append(&mut self, record: &str) -> Result<()> {
        let mut line = String::with_capacity(record.len() + 1);
        line.push_str(record);
        line.push('\n');
        self.file.write_all(line.as_bytes()).await?;
        self.records += 1;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }
}
