use glob::{glob, Pattern};
use indicatif::ProgressBar;
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::fs;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::category::CategoryIndex;
use crate::config::DegeneratePolicy;
use crate::error::{ConvertError, Result};
use crate::source::ImageSource;
use crate::types::{Annotation, ConversionReport, ImageRecord, NormalizedBox, RecordFailure};
use crate::utils::{create_io_thread_pool, create_progress_bar, write_atomic};

/// Cooperative stop signal shared between the caller and the workers.
///
/// Once cancelled, no further record is started; records already in flight
/// run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Cancel once `signal` resolves with `Ok`, on a dedicated thread.
    ///
    /// The CLI passes `tokio::signal::ctrl_c()`; an `Err` (no handler could
    /// be registered) leaves the token untouched.
    pub fn cancel_when<F>(&self, signal: F) -> thread::JoinHandle<()>
    where
        F: Future<Output = std::io::Result<()>> + Send + 'static,
    {
        let token = self.clone();
        thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("Could not start the signal runtime: {}", e);
                    return;
                }
            };
            match runtime.block_on(signal) {
                Ok(()) => {
                    warn!("Interrupted; records in flight will finish, the rest are skipped");
                    token.cancel();
                }
                Err(e) => warn!("Could not listen for interrupts: {}", e),
            }
        })
    }
}

/// Knobs for a single [`convert`] call.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Worker threads for fetch-and-write; 0 means one per CPU.
    pub workers: usize,
    pub degenerate_policy: DegeneratePolicy,
    pub cancel: CancellationToken,
    pub show_progress: bool,
}

/// Output directories of one split
#[derive(Debug, Clone)]
pub struct SplitDirs {
    pub images_dir: PathBuf,
    pub labels_dir: PathBuf,
}

impl SplitDirs {
    pub fn new(output_root: &Path, split: &str) -> Self {
        Self {
            images_dir: output_root.join("images").join(split),
            labels_dir: output_root.join("labels").join(split),
        }
    }

    /// Create both directories if missing; existing files are kept.
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.images_dir, &self.labels_dir] {
            fs::create_dir_all(dir).map_err(|source| ConvertError::Write {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// A split name must be usable as exactly one directory component.
pub fn validate_split_name(split: &str) -> Result<()> {
    let mut components = Path::new(split).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == split => Ok(()),
        _ => Err(ConvertError::InvalidSplitName(split.to_string())),
    }
}

/// Derive the YOLO box of one annotation.
///
/// Corners may come in any order; they are normalized with a componentwise
/// min/max before computing center and size.
pub fn normalize_annotation(
    annotation: &Annotation,
    category_index: &CategoryIndex,
) -> Result<NormalizedBox> {
    let class_id = category_index
        .get(&annotation.category)
        .ok_or_else(|| ConvertError::UnknownCategory(annotation.category.clone()))?;

    for &(x, y) in [&annotation.corner_a, &annotation.corner_b] {
        let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_range(x) || !in_range(y) {
            return Err(ConvertError::CoordinateOutOfRange {
                category: annotation.category.clone(),
                x,
                y,
            });
        }
    }

    let (ax, ay) = annotation.corner_a;
    let (bx, by) = annotation.corner_b;
    let (x1, x2) = (ax.min(bx), ax.max(bx));
    let (y1, y2) = (ay.min(by), ay.max(by));

    let width = x2 - x1;
    let height = y2 - y1;
    if width <= 0.0 || height <= 0.0 {
        return Err(ConvertError::DegenerateBox {
            category: annotation.category.clone(),
            width,
            height,
        });
    }

    Ok(NormalizedBox {
        category_index: class_id,
        center_x: x1 + width / 2.0,
        center_y: y1 + height / 2.0,
        width,
        height,
    })
}

/// Build the label file body for a record, one line per kept annotation.
///
/// Returns the body together with the number of boxes written and skipped.
pub fn build_label_file(
    record: &ImageRecord,
    category_index: &CategoryIndex,
    policy: DegeneratePolicy,
) -> Result<(String, usize, usize)> {
    let mut body = String::with_capacity(record.annotations.len() * 48);
    let mut written = 0;
    let mut skipped = 0;

    for annotation in &record.annotations {
        match normalize_annotation(annotation, category_index) {
            Ok(bbox) => {
                body.push_str(&bbox.to_label_line());
                written += 1;
            }
            Err(
                e @ (ConvertError::DegenerateBox { .. }
                | ConvertError::CoordinateOutOfRange { .. }),
            ) if policy == DegeneratePolicy::Skip => {
                warn!("Skipping box in {}: {}", record.source_reference, e);
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok((body, written, skipped))
}

fn write_record(
    id: usize,
    record: &ImageRecord,
    category_index: &CategoryIndex,
    dirs: &SplitDirs,
    source: &(impl ImageSource + ?Sized),
    policy: DegeneratePolicy,
    report: &mut ConversionReport,
) -> Result<()> {
    // Geometry and categories are checked before any network traffic
    let (body, written, skipped) = build_label_file(record, category_index, policy)?;

    let image = source
        .fetch(&record.source_reference)
        .map_err(|source| ConvertError::SourceFetch {
            reference: record.source_reference.clone(),
            source,
        })?;

    let image_path = dirs.images_dir.join(format!("{}.{}", id, image.extension));
    write_atomic(&image_path, &image.bytes)?;

    let label_path = dirs.labels_dir.join(format!("{}.txt", id));
    write_atomic(&label_path, body.as_bytes())?;

    // An earlier run may have stored this id under another extension
    for stale in record_images(dirs, id)? {
        if stale.file_name() != image_path.file_name() {
            remove_output(&stale)?;
        }
    }

    report.images_written += 1;
    report.labels_written += 1;
    report.boxes_written += written;
    report.boxes_skipped += skipped;

    debug!(
        "Wrote {} ({} boxes) for {}",
        label_path.display(),
        written,
        record.source_reference
    );
    Ok(())
}

/// Every image file stored under identifier `id`, whatever its extension.
fn record_images(dirs: &SplitDirs, id: usize) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/{}.*",
        Pattern::escape(&dirs.images_dir.to_string_lossy()),
        id
    );
    let entries = glob(&pattern).map_err(|e| {
        ConvertError::MalformedRecord(format!("bad output pattern {}: {}", pattern, e))
    })?;
    Ok(entries.filter_map(|entry| entry.ok()).collect())
}

fn remove_output(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ConvertError::Write {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Delete whatever image and label exist for `id`, so a failed record never
/// leaves a half-written pair or output from an earlier run behind.
pub fn remove_record_outputs(dirs: &SplitDirs, id: usize) -> Result<()> {
    for image in record_images(dirs, id)? {
        remove_output(&image)?;
    }
    remove_output(&dirs.labels_dir.join(format!("{}.txt", id)))
}

/// Convert a single record; failures end up in the returned report.
pub fn convert_record(
    id: usize,
    record: &ImageRecord,
    category_index: &CategoryIndex,
    split: &str,
    dirs: &SplitDirs,
    source: &(impl ImageSource + ?Sized),
    policy: DegeneratePolicy,
) -> ConversionReport {
    let mut report = ConversionReport::new(split);
    report.images_processed = 1;

    if let Err(e) = write_record(id, record, category_index, dirs, source, policy, &mut report) {
        error!(
            "Failed to convert record {} ({}): {}",
            id, record.source_reference, e
        );
        if let Err(cleanup) = remove_record_outputs(dirs, id) {
            warn!("Could not remove outputs of record {}: {}", id, cleanup);
        }
        report.failures.push(RecordFailure {
            id,
            source_reference: record.source_reference.clone(),
            error: e,
        });
    }

    report
}

/// Convert `records` into `<output_root>/images/<split>` and
/// `<output_root>/labels/<split>`.
///
/// Record `i` of the input is written as `<i>.<ext>` / `<i>.txt`. These
/// identifiers are positional: a different order or subset of the same
/// records yields different file names. Existing files with the same
/// identifiers are overwritten; a record that fails has its image and label
/// removed, so no half-written pair or output from an earlier run remains.
///
/// Per-record failures are collected in the report and do not stop the batch.
/// Only setup problems (bad split name, output directories, worker pool)
/// return an error.
pub fn convert(
    records: &[ImageRecord],
    category_index: &CategoryIndex,
    split: &str,
    output_root: &Path,
    source: &(impl ImageSource + ?Sized),
    options: &ConvertOptions,
) -> Result<ConversionReport> {
    validate_split_name(split)?;

    let dirs = SplitDirs::new(output_root, split);
    dirs.ensure()?;

    let pool = create_io_thread_pool(options.workers)?;
    let pb = if options.show_progress {
        create_progress_bar(records.len() as u64, split)
    } else {
        ProgressBar::hidden()
    };

    info!(
        "Converting {} records into split '{}' with {} workers",
        records.len(),
        split,
        pool.current_num_threads()
    );

    // Identifiers come from the input position, fixed before any worker runs
    let outcomes: Vec<ConversionReport> = pool.install(|| {
        records
            .par_iter()
            .enumerate()
            .map(|(id, record)| {
                if options.cancel.is_cancelled() {
                    let mut skipped = ConversionReport::new(split);
                    skipped.cancelled = 1;
                    pb.inc(1);
                    return skipped;
                }
                let outcome = convert_record(
                    id,
                    record,
                    category_index,
                    split,
                    &dirs,
                    source,
                    options.degenerate_policy,
                );
                pb.inc(1);
                outcome
            })
            .collect()
    });

    let mut report = ConversionReport::new(split);
    for outcome in outcomes {
        report.merge(outcome);
    }

    if report.cancelled > 0 {
        pb.abandon_with_message(format!("{} cancelled", split));
    } else {
        pb.finish_with_message(format!("{} processing complete", split));
    }

    Ok(report)
}
