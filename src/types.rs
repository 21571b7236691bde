use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::error::ConvertError;

// Supported image formats
pub const IMG_FORMATS: &[&str] = &[
    "bmp", "dng", "jpeg", "jpg", "mpo", "png", "tif", "tiff", "webp", "pfm", "gif",
];

// Precomputed HashSet of image extensions for fast lookup
pub static IMAGE_EXTENSIONS_SET: OnceLock<HashSet<String>> = OnceLock::new();

/// Get the image extensions set
pub fn get_image_extensions_set() -> &'static HashSet<String> {
    IMAGE_EXTENSIONS_SET.get_or_init(|| IMG_FORMATS.iter().map(|ext| ext.to_lowercase()).collect())
}

// A point as exported by DataTurks, normalized to the image size
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct RawPoint {
    pub x: f64,
    pub y: f64,
}

// DataTurks stores the label as a one-element list, older exports as a bare string
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum RawLabel {
    Many(Vec<String>),
    One(String),
}

impl RawLabel {
    /// The category name, by convention the first entry.
    pub fn first(&self) -> Option<&str> {
        match self {
            RawLabel::Many(labels) => labels.first().map(String::as_str),
            RawLabel::One(label) => Some(label.as_str()),
        }
    }
}

// One entry of the `annotation` array
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawAnnotation {
    pub label: RawLabel,
    pub points: Vec<RawPoint>,
    #[serde(default)]
    pub image_width: Option<u32>,
    #[serde(default)]
    pub image_height: Option<u32>,
}

// One input line: an image locator plus its annotations
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RawRecord {
    pub content: String,
    #[serde(default)]
    pub annotation: Option<Vec<RawAnnotation>>,
}

/// One labelled object: a category and two opposite corners of an
/// axis-aligned box, in normalized image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub category: String,
    pub corner_a: (f64, f64),
    pub corner_b: (f64, f64),
}

impl Annotation {
    pub fn new(category: impl Into<String>, corner_a: (f64, f64), corner_b: (f64, f64)) -> Self {
        Self {
            category: category.into(),
            corner_a,
            corner_b,
        }
    }
}

/// One source image and its annotations, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub source_reference: String,
    pub annotations: Vec<Annotation>,
}

impl ImageRecord {
    pub fn new(source_reference: impl Into<String>, annotations: Vec<Annotation>) -> Self {
        Self {
            source_reference: source_reference.into(),
            annotations,
        }
    }
}

impl TryFrom<RawRecord> for ImageRecord {
    type Error = ConvertError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        if raw.content.trim().is_empty() {
            return Err(ConvertError::MalformedRecord(
                "empty `content` locator".to_string(),
            ));
        }

        let annotations = raw
            .annotation
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, entry)| -> Result<Annotation, ConvertError> {
                let category = entry
                    .label
                    .first()
                    .filter(|label| !label.is_empty())
                    .ok_or_else(|| {
                        ConvertError::MalformedRecord(format!(
                            "annotation {} of {} has no label",
                            i, raw.content
                        ))
                    })?
                    .to_string();
                match entry.points.as_slice() {
                    [a, b] => Ok(Annotation::new(category, (a.x, a.y), (b.x, b.y))),
                    points => Err(ConvertError::MalformedRecord(format!(
                        "annotation {} of {} has {} points, expected 2",
                        i,
                        raw.content,
                        points.len()
                    ))),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ImageRecord {
            source_reference: raw.content,
            annotations,
        })
    }
}

/// A YOLO box: class index plus center and size, all normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedBox {
    pub category_index: usize,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedBox {
    /// Render as a YOLO label line, newline included.
    pub fn to_label_line(&self) -> String {
        format!(
            "{} {} {} {} {}\n",
            self.category_index,
            format_coord(self.center_x),
            format_coord(self.center_y),
            format_coord(self.width),
            format_coord(self.height)
        )
    }
}

// Shortest round-trip representation, always with a decimal point
fn format_coord(value: f64) -> String {
    let mut s = value.to_string();
    if !s.contains('.') {
        s.push_str(".0");
    }
    s
}

/// A record that could not be converted.
#[derive(Debug)]
pub struct RecordFailure {
    pub id: usize,
    pub source_reference: String,
    pub error: ConvertError,
}

// Struct to hold conversion statistics for one split
#[derive(Debug, Default)]
pub struct ConversionReport {
    pub split: String,
    pub images_processed: usize,
    pub images_written: usize,
    pub labels_written: usize,
    pub boxes_written: usize,
    pub boxes_skipped: usize,
    pub cancelled: usize,
    pub failures: Vec<RecordFailure>,
}

impl ConversionReport {
    pub fn new(split: impl Into<String>) -> Self {
        Self {
            split: split.into(),
            ..Default::default()
        }
    }

    /// Records processed without error.
    pub fn succeeded(&self) -> usize {
        self.images_processed - self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold another partial report into this one.
    pub fn merge(&mut self, other: ConversionReport) {
        self.images_processed += other.images_processed;
        self.images_written += other.images_written;
        self.labels_written += other.labels_written;
        self.boxes_written += other.boxes_written;
        self.boxes_skipped += other.boxes_skipped;
        self.cancelled += other.cancelled;
        self.failures.extend(other.failures);
    }

    pub fn print_summary(&self) {
        log::info!("=== {} summary ===", self.split);
        log::info!("Images processed: {}", self.images_processed);
        log::info!("Succeeded: {}", self.succeeded());
        log::info!("Failed: {}", self.failures.len());
        log::info!(
            "Images written: {}, labels written: {}, boxes written: {}",
            self.images_written,
            self.labels_written,
            self.boxes_written
        );

        if self.boxes_skipped > 0 {
            log::warn!("Skipped {} malformed boxes", self.boxes_skipped);
        }
        if self.cancelled > 0 {
            log::warn!("{} records were not started (cancelled)", self.cancelled);
        }
        for failure in &self.failures {
            log::error!(
                "[{}] record {} ({}): {}",
                self.split,
                failure.id,
                failure.source_reference,
                failure.error
            );
        }
    }
}
