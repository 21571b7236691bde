use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::conversion::{CancellationToken, ConvertOptions};

/// Command-line arguments for converting DataTurks annotations to a YOLO dataset.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct Args {
    /// JSON/NDJSON annotation file, or a directory searched recursively for them
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Dataset root to write into (default: YOLODataset next to the input)
    #[arg(short = 'o', long = "output_dir")]
    pub output_dir: Option<PathBuf>,

    /// Proportion of the dataset to use for validation
    #[arg(long = "val_size", default_value_t = 0.2, value_parser = validate_size)]
    pub val_size: f32,

    /// Proportion of the dataset to use for testing
    #[arg(long = "test_size", default_value_t = 0.0, value_parser = validate_size)]
    pub test_size: f32,

    /// Seed for random shuffling
    #[arg(long = "seed", default_value_t = 42)]
    pub seed: u64,

    /// Number of fetch-and-write workers (0 = one per CPU)
    #[arg(long = "workers", default_value_t = 0)]
    pub workers: usize,

    /// Timeout in seconds for each image download
    #[arg(long = "timeout_secs", default_value_t = 30)]
    pub timeout_secs: u64,

    /// What to do with zero-area or out-of-range boxes
    #[arg(long = "degenerate", value_enum, default_value = "skip")]
    pub degenerate: DegeneratePolicy,

    /// Ordered class names; when empty, classes are sorted by name
    #[arg(value_delimiter = ',')]
    pub label_list: Vec<String>,
}

impl Args {
    /// Dataset root, defaulting to `YOLODataset` beside the input.
    pub fn output_root(&self) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => {
                let base = if self.input.is_dir() {
                    self.input.as_path()
                } else {
                    self.input.parent().unwrap_or_else(|| Path::new("."))
                };
                base.join("YOLODataset")
            }
        }
    }

    pub fn convert_options(&self, cancel: CancellationToken) -> ConvertOptions {
        ConvertOptions {
            workers: self.workers,
            degenerate_policy: self.degenerate,
            cancel,
            show_progress: true,
        }
    }
}

// How malformed box geometry is handled
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum DegeneratePolicy {
    /// Drop the box with a warning and keep the rest of the record
    #[default]
    Skip,
    /// Fail the whole record
    Reject,
}

// Validate that the size is between 0.0 and 1.0
fn validate_size(s: &str) -> Result<f32, String> {
    match f32::from_str(s) {
        Ok(val) if (0.0..=1.0).contains(&val) => Ok(val),
        _ => Err("SIZE must be between 0.0 and 1.0".to_string()),
    }
}
