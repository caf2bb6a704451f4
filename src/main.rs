use std::{path::PathBuf, process::ExitCode, time::Instant};

use beanextract::{config, DatasetSettings, Dispatcher, PipelineConfig};
use clap::Parser;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

const DEFAULT_SETTINGS: &str = "dataset/settings.yaml";

/// Cut every coffee bean out of a folder of tray photographs.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Folder with the tray photographs (.jpg, .jpeg, .png)
    #[arg(short, long)]
    source: PathBuf,

    /// Where annotated overviews go [default: <SOURCE>/result]
    #[arg(long)]
    overview_dir: Option<PathBuf>,

    /// Where bean crops go [default: <SOURCE>/coffee_beans]
    #[arg(long)]
    crops_dir: Option<PathBuf>,

    /// Dataset settings holding `coffee_bean_pixel_threshold`
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Smallest accepted contour area, exclusive (overrides settings)
    #[arg(long)]
    lower: Option<f32>,

    /// Largest accepted contour area, exclusive (overrides settings)
    #[arg(long)]
    upper: Option<f32>,

    #[arg(short, long, default_value_t = config::DEFAULT_WORKERS)]
    workers: usize,

    #[arg(long, default_value_t = config::DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Margin kept around every bean, in pixels
    #[arg(long, default_value_t = config::DEFAULT_PADDING)]
    padding: u32,

    /// Dump intermediate segmentation rasters here
    #[arg(long)]
    debug_dir: Option<PathBuf>,
}

fn build_config(args: Args) -> beanextract::Result<PipelineConfig> {
    let mut config = PipelineConfig::new(args.source);

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS));
    if settings_path.is_file() {
        let settings = DatasetSettings::from_file(&settings_path)?;
        match settings.coffee_bean_pixel_threshold {
            Some(thresholds) => config.thresholds = thresholds,
            None => log::warn!(
                "{} has no coffee_bean_pixel_threshold, using defaults",
                settings_path.display()
            ),
        }
    } else if args.settings.is_some() {
        return Err(beanextract::Error::config(format!(
            "settings file {} not found",
            settings_path.display()
        )));
    } else {
        log::warn!(
            "No settings at {}, using default thresholds",
            settings_path.display()
        );
    }

    if let Some(lower) = args.lower {
        config.thresholds.lower = lower;
    }
    if let Some(upper) = args.upper {
        config.thresholds.upper = upper;
    }
    if let Some(dir) = args.overview_dir {
        config.overview_dir = dir;
    }
    if let Some(dir) = args.crops_dir {
        config.crops_dir = dir;
    }
    config.workers = args.workers;
    config.queue_capacity = args.queue_capacity;
    config.padding = args.padding;
    config.debug_dir = args.debug_dir;
    Ok(config)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let start = Instant::now();
    let result = build_config(args)
        .and_then(Dispatcher::new)
        .and_then(|dispatcher| {
            log::info!(
                "Area thresholds: {:?}, {} workers",
                dispatcher.config().thresholds,
                dispatcher.config().workers
            );
            dispatcher.run()
        });

    match result {
        Ok(report) => {
            log::info!("Done in {:?}", start.elapsed());
            if report.skipped > 0 {
                log::warn!("{} of {} images were skipped", report.skipped, report.discovered);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
