use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{ConvertError, Result};

/// Helper function to infer image format from image bytes
pub fn infer_image_format(image_bytes: &[u8]) -> Option<&'static str> {
    if image_bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if image_bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("png")
    } else if image_bytes.starts_with(b"BM") {
        Some("bmp")
    } else if image_bytes.starts_with(&[0x47, 0x49, 0x46]) {
        Some("gif")
    } else {
        None
    }
}

/// Create a progress bar with the given length and label
pub fn create_progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
            label
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// Remove `path` if present and create it empty
pub fn create_output_directory(path: &Path) -> Result<PathBuf> {
    let to_write_error = |source| ConvertError::Write {
        path: path.to_path_buf(),
        source,
    };
    if path.exists() {
        log::warn!(
            "Directory {:?} already exists. Deleting and recreating it.",
            path
        );
        fs::remove_dir_all(path).map_err(to_write_error)?;
    }
    fs::create_dir_all(path).map_err(to_write_error)?;
    Ok(path.to_path_buf())
}

/// Build a rayon pool bounded to `workers` threads (0 means one per CPU)
pub fn create_io_thread_pool(workers: usize) -> Result<rayon::ThreadPool> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("convert-{}", i))
        .build()?)
}

/// Write `contents` to `path` through a temporary sibling file and a rename,
/// so readers see either the old file or the complete new one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let to_write_error = |source| ConvertError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut file = NamedTempFile::new_in(dir).map_err(to_write_error)?;
    file.write_all(contents).map_err(to_write_error)?;
    file.as_file().sync_all().map_err(to_write_error)?;
    file.persist(path)
        .map_err(|e| to_write_error(e.error))?;
    Ok(())
}
