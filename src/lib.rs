//! DataTurks to YOLO format converter
//!
//! This library converts DataTurks-style bounding-box annotations (an image
//! locator plus two-corner boxes in normalized coordinates) into a YOLO
//! object-detection dataset, and defines the prediction interface used when
//! serving a trained model.

pub mod category;
pub mod config;
pub mod conversion;
pub mod dataset;
pub mod error;
pub mod io;
pub mod predictor;
pub mod source;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use category::{build_category_index, CategoryIndex};
pub use config::{Args, DegeneratePolicy};
pub use conversion::{convert, normalize_annotation, CancellationToken, ConvertOptions};
pub use dataset::{process_dataset, split_records, DatasetSummary};
pub use error::{ConvertError, FetchError, PredictError, Result};
pub use io::{create_dataset_yaml, read_records};
pub use predictor::{Prediction, PredictionHandler, Predictor};
pub use source::{DefaultImageSource, FetchedImage, ImageSource};
pub use types::{Annotation, ConversionReport, ImageRecord, NormalizedBox, RecordFailure};
