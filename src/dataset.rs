use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::PathBuf;

use crate::category::{build_category_index, CategoryIndex};
use crate::config::Args;
use crate::conversion::{convert, ConvertOptions, SplitDirs};
use crate::error::Result;
use crate::io::create_dataset_yaml;
use crate::source::ImageSource;
use crate::types::{ConversionReport, ImageRecord};
use crate::utils::create_output_directory;

// Records assigned to each split, in the order they will be numbered
#[derive(Debug, Default)]
pub struct SplitData {
    pub train: Vec<ImageRecord>,
    pub val: Vec<ImageRecord>,
    pub test: Vec<ImageRecord>,
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct DatasetSummary {
    pub category_index: CategoryIndex,
    pub dataset_yaml: PathBuf,
    pub reports: Vec<ConversionReport>,
}

impl DatasetSummary {
    pub fn failed_records(&self) -> usize {
        self.reports.iter().map(|r| r.failures.len()).sum()
    }
}

/// Shuffle with a fixed seed, then carve off test and validation records.
pub fn split_records(
    mut records: Vec<ImageRecord>,
    val_size: f32,
    test_size: f32,
    seed: u64,
) -> SplitData {
    let mut rng = StdRng::seed_from_u64(seed);
    records.shuffle(&mut rng);

    let total = records.len();
    let test_len = ((total as f32 * test_size).ceil() as usize).min(total);
    let val_len = ((total as f32 * val_size).ceil() as usize).min(total - test_len);

    let test = records.drain(0..test_len).collect();
    let val = records.drain(0..val_len).collect();

    SplitData {
        train: records,
        val,
        test,
    }
}

/// Pick the class index: the explicit label list if given, otherwise every
/// category found in the records.
pub fn resolve_category_index(records: &[ImageRecord], label_list: &[String]) -> Result<CategoryIndex> {
    if label_list.is_empty() {
        build_category_index(records)
    } else {
        CategoryIndex::from_names(label_list.to_vec())
    }
}

/// Run the whole pipeline: index, split, convert each split, write dataset.yaml.
pub fn process_dataset(
    records: Vec<ImageRecord>,
    args: &Args,
    source: &(impl ImageSource + ?Sized),
    options: &ConvertOptions,
) -> Result<DatasetSummary> {
    info!("Loaded {} records.", records.len());

    // Indexed before splitting so every split shares the same class ids
    let category_index = resolve_category_index(&records, &args.label_list)?;
    info!(
        "Found {} categories: {}",
        category_index.len(),
        category_index.names().join(", ")
    );

    let split_data = split_records(records, args.val_size, args.test_size, args.seed);
    let has_test_split = args.test_size > 0.0;

    let output_root = args.output_root();
    let mut splits = vec![("train", split_data.train), ("val", split_data.val)];
    if has_test_split {
        splits.push(("test", split_data.test));
    }

    let mut reports = Vec::with_capacity(splits.len());
    for (name, records) in splits {
        // A cancelled split keeps whatever an earlier run left there
        if options.cancel.is_cancelled() {
            info!("Cancelled before split '{}'", name);
            let mut report = ConversionReport::new(name);
            report.cancelled = records.len();
            reports.push(report);
            continue;
        }

        let dirs = SplitDirs::new(&output_root, name);
        create_output_directory(&dirs.images_dir)?;
        create_output_directory(&dirs.labels_dir)?;

        let report = convert(&records, &category_index, name, &output_root, source, options)?;
        report.print_summary();
        reports.push(report);
    }

    info!("Creating dataset.yaml file...");
    let dataset_yaml = create_dataset_yaml(&output_root, &category_index, has_test_split)?;
    info!("Conversion process completed.");

    Ok(DatasetSummary {
        category_index,
        dataset_yaml,
        reports,
    })
}
