use glob::{glob, Pattern};
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::category::CategoryIndex;
use crate::error::{ConvertError, Result};
use crate::source::is_http;
use crate::types::{ImageRecord, RawRecord};
use crate::utils::write_atomic;

const INPUT_EXTENSIONS: &[&str] = &["json", "jsonl", "ndjson"];

/// Load every record from a file, or from all annotation files under a directory.
pub fn read_records(input: &Path) -> Result<Vec<ImageRecord>> {
    if !input.is_dir() {
        return read_records_from_file(input);
    }

    let mut files = Vec::new();
    for ext in INPUT_EXTENSIONS {
        let pattern = format!("{}/**/*.{}", Pattern::escape(&input.to_string_lossy()), ext);
        let entries = glob(&pattern).map_err(|e| {
            ConvertError::MalformedRecord(format!("bad input pattern {}: {}", pattern, e))
        })?;
        files.extend(
            entries
                .filter_map(|entry| entry.ok())
                // Skip previously generated datasets
                .filter(|path| !path.components().any(|c| c.as_os_str() == "YOLODataset")),
        );
    }
    files.sort();

    let mut records = Vec::new();
    for file in &files {
        records.extend(read_records_from_file(file)?);
    }
    info!("Read {} records from {} files.", records.len(), files.len());
    Ok(records)
}

/// Parse a JSON array file or an NDJSON file into records.
///
/// Records that fail to parse or validate are logged and skipped; only an
/// unreadable file (or an unparsable array) is an error.
pub fn read_records_from_file(path: &Path) -> Result<Vec<ImageRecord>> {
    let content = fs::read_to_string(path).map_err(|source| ConvertError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));

    let values: Vec<(usize, std::result::Result<RawRecord, serde_json::Error>)> =
        if content.trim_start().starts_with('[') {
            let array: Vec<serde_json::Value> =
                serde_json::from_str(&content).map_err(|source| ConvertError::Parse {
                    path: path.to_path_buf(),
                    line: source.line(),
                    source,
                })?;
            array
                .into_iter()
                .enumerate()
                .map(|(i, value)| (i + 1, serde_json::from_value(value)))
                .collect()
        } else {
            content
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(i, line)| (i + 1, serde_json::from_str(line)))
                .collect()
        };

    let mut records = Vec::with_capacity(values.len());
    let mut skipped = 0;
    for (position, value) in values {
        let record = value
            .map_err(|source| ConvertError::Parse {
                path: path.to_path_buf(),
                line: position,
                source,
            })
            .and_then(ImageRecord::try_from);
        match record {
            Ok(mut record) => {
                record.source_reference = resolve_reference(base_dir, &record.source_reference);
                records.push(record);
            }
            Err(e) => {
                error!("Skipping record {} of {}: {}", position, path.display(), e);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} malformed records in {}", skipped, path.display());
    }
    debug!("Parsed {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Relative local paths are resolved against the annotation file's directory.
pub fn resolve_reference(base_dir: &Path, reference: &str) -> String {
    if is_http(reference) || reference.starts_with("data:") {
        return reference.to_string();
    }
    let path = Path::new(reference);
    if path.is_absolute() {
        reference.to_string()
    } else {
        base_dir.join(path).to_string_lossy().into_owned()
    }
}

/// Write the dataset.yaml consumed by the YOLO trainer
pub fn create_dataset_yaml(
    output_root: &Path,
    category_index: &CategoryIndex,
    has_test_split: bool,
) -> Result<PathBuf> {
    let dataset_yaml_path = output_root.join("dataset.yaml");
    let absolute_path = fs::canonicalize(output_root).map_err(|source| ConvertError::Read {
        path: output_root.to_path_buf(),
        source,
    })?;

    let mut yaml_content = format!(
        "path: {}\ntrain: images/train\nval: images/val\n",
        absolute_path.to_string_lossy()
    );
    if has_test_split {
        yaml_content.push_str("test: images/test\n");
    } else {
        yaml_content.push_str("test:\n");
    }
    yaml_content.push_str("\nnames:\n");
    for (id, label) in category_index.names().iter().enumerate() {
        yaml_content.push_str(&format!("    {}: {}\n", id, label));
    }

    write_atomic(&dataset_yaml_path, yaml_content.as_bytes())?;
    Ok(dataset_yaml_path)
}
