use clap::Parser;

use log::{error, info};
use std::process::ExitCode;
use std::time::Duration;

use dataturks2yolo::{process_dataset, read_records, Args, CancellationToken, DefaultImageSource};

fn main() -> ExitCode {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !args.input.exists() {
        error!("The specified input does not exist: {}", args.input.display());
        return ExitCode::FAILURE;
    }

    info!("Starting the conversion process...");

    let records = match read_records(&args.input) {
        Ok(records) => records,
        Err(e) => {
            error!("Failed to read annotations: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let source = match DefaultImageSource::new(Duration::from_secs(args.timeout_secs)) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to set up the HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Ctrl-C stops new records from starting; in-flight ones finish
    let cancel = CancellationToken::new();
    cancel.cancel_when(tokio::signal::ctrl_c());

    let options = args.convert_options(cancel);
    match process_dataset(records, &args, &source, &options) {
        Ok(summary) => {
            info!("Dataset config written to {}", summary.dataset_yaml.display());
            let failed = summary.failed_records();
            if failed > 0 {
                error!("{} records failed to convert", failed);
                return ExitCode::from(1);
            }
            if options.cancel.is_cancelled() {
                error!("Conversion was interrupted; the dataset is incomplete");
                return ExitCode::from(130);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to process dataset: {}", e);
            ExitCode::FAILURE
        }
    }
}
