use anyhow::{Context, Result};
use mp_core::CaptureResultRecord;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes each record as `<seq>.<ext>` (compressed image) and `<seq>.yuv`
/// (planar Y, U, V), and appends its metadata to `records.jsonl`.
pub struct FileSink {
    directory: PathBuf,
    index: File,
}

impl FileSink {
    pub fn create(directory: &Path) -> Result<Self> {
        fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create output directory {}", directory.display()))?;

        let index = OpenOptions::new()
            .create(true)
            .append(true)
            .open(directory.join("records.jsonl"))
            .context("Failed to open record index")?;

        Ok(Self {
            directory: directory.to_path_buf(),
            index,
        })
    }

    pub fn write(&mut self, record: &CaptureResultRecord, prefix: &str) -> Result<PathBuf> {
        let stem = format!("{prefix}{:06}", record.sequence_number);

        let image_path = self
            .directory
            .join(format!("{stem}.{}", record.encoded_format.extension()));
        fs::write(&image_path, &record.encoded_bytes)
            .with_context(|| format!("Failed to write {}", image_path.display()))?;

        let yuv_path = self.directory.join(format!("{stem}.yuv"));
        fs::write(&yuv_path, &record.yuv_planar.data)
            .with_context(|| format!("Failed to write {}", yuv_path.display()))?;

        let line = serde_json::to_string(&record.metadata())
            .context("Failed to serialize record metadata")?;
        writeln!(self.index, "{line}").context("Failed to append record index")?;

        Ok(image_path)
    }
}
