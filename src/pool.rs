use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        mpsc::{sync_channel, Receiver},
        Arc, Mutex,
    },
    thread,
};

use tracing::instrument;

use crate::{
    writer::{bean_namespace, ResultWriter},
    BeanExtractor, Error, PipelineConfig, Result,
};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Work done for one dequeued image. Returns the number of crops written.
pub trait ImageJob: Send + Sync {
    fn run(&self, path: &Path) -> Result<usize>;
}

/// Extracts the beans of one image and writes the overview and every crop.
pub struct ExtractionJob {
    extractor: BeanExtractor,
    writer: ResultWriter,
    overview_dir: PathBuf,
    crops_dir: PathBuf,
}

impl ExtractionJob {
    pub fn new(extractor: BeanExtractor, config: &PipelineConfig) -> Self {
        Self {
            extractor,
            writer: ResultWriter::new(),
            overview_dir: config.overview_dir.clone(),
            crops_dir: config.crops_dir.clone(),
        }
    }
}

impl ImageJob for ExtractionJob {
    fn run(&self, path: &Path) -> Result<usize> {
        let extraction = self.extractor.process(path)?;
        let overview = self
            .writer
            .save_overview(&self.overview_dir, &extraction.overview, path)?;
        log::info!("Saved overview to {}", overview.display());

        let namespace = bean_namespace(path);
        for bean in &extraction.beans {
            self.writer.save(&self.crops_dir, &bean.image, &namespace)?;
        }
        Ok(extraction.beans.len())
    }
}

enum Job {
    Process(PathBuf),
    Shutdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub discovered: usize,
    pub processed: usize,
    pub skipped: usize,
    pub beans_written: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct WorkerStats {
    processed: usize,
    skipped: usize,
    beans_written: usize,
}

pub struct Dispatcher {
    config: PipelineConfig,
}

impl Dispatcher {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes every image in the source folder.
    #[instrument(skip(self), fields(source = %self.config.source_dir.display()))]
    pub fn run(&self) -> Result<DispatchReport> {
        let config = &self.config;
        if !config.source_dir.is_dir() {
            log::error!("Folder {} does not exist", config.source_dir.display());
            return Err(Error::MissingSource(config.source_dir.clone()));
        }
        for folder in [&config.overview_dir, &config.crops_dir] {
            if !folder.is_dir() {
                fs::create_dir_all(folder)?;
                log::info!("Created folder {}", folder.display());
            }
        }

        let images = find_images(&config.source_dir)?;
        log::info!("Found {} images to process", images.len());

        let job = ExtractionJob::new(BeanExtractor::from_config(config), config);
        let report = self.run_with(images, Arc::new(job))?;
        log::info!(
            "Processed {} of {} images ({} skipped, {} beans written)",
            report.processed,
            report.discovered,
            report.skipped,
            report.beans_written
        );
        Ok(report)
    }

    /// Feeds `paths` through the worker pool, running `job` on each one. Blocks
    /// while the queue is full and ends with one shutdown message per worker.
    pub fn run_with<J: ImageJob + 'static>(
        &self,
        paths: Vec<PathBuf>,
        job: Arc<J>,
    ) -> Result<DispatchReport> {
        let workers = self.config.workers;
        let (job_tx, job_rx) = sync_channel::<Job>(self.config.queue_capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let job = Arc::clone(&job);
            let handle = thread::Builder::new()
                .name(format!("bean-worker-{id}"))
                .spawn(move || work(id, job_rx, job.as_ref()))?;
            handles.push(handle);
        }
        drop(job_rx);

        let discovered = paths.len();
        let messages = paths
            .into_iter()
            .map(Job::Process)
            .chain((0..workers).map(|_| Job::Shutdown));
        for message in messages {
            if job_tx.send(message).is_err() {
                log::error!("All workers exited before the queue was drained");
                break;
            }
        }
        drop(job_tx);

        let mut report = DispatchReport {
            discovered,
            ..Default::default()
        };
        let mut panicked = None;
        for (id, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(stats) => {
                    report.processed += stats.processed;
                    report.skipped += stats.skipped;
                    report.beans_written += stats.beans_written;
                }
                Err(_) => {
                    log::error!("Worker {id} panicked");
                    panicked.get_or_insert(id);
                }
            }
        }
        match panicked {
            Some(id) => Err(Error::WorkerPanicked(id)),
            None => Ok(report),
        }
    }
}

fn work<J: ImageJob + ?Sized>(id: usize, job_rx: Arc<Mutex<Receiver<Job>>>, job: &J) -> WorkerStats {
    let mut stats = WorkerStats::default();
    loop {
        let message = {
            let rx = job_rx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            rx.recv()
        };
        let path = match message {
            Ok(Job::Process(path)) => path,
            Ok(Job::Shutdown) | Err(_) => break,
        };

        log::info!("[worker {id}] Processing {}", path.display());
        match job.run(&path) {
            Ok(beans) => {
                stats.processed += 1;
                stats.beans_written += beans;
                log::info!("[worker {id}] Finished {} ({beans} beans)", path.display());
            }
            Err(err @ Error::Decode { .. }) => {
                stats.skipped += 1;
                log::warn!("[worker {id}] {err}");
            }
            Err(err) => {
                stats.skipped += 1;
                log::error!("[worker {id}] Failed on {}: {err}", path.display());
            }
        }
    }
    log::debug!("[worker {id}] Shutting down");
    stats
}

/// Image files directly inside `folder` (`.jpg`, `.jpeg`, `.png`, any case),
/// sorted by path.
pub fn find_images(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)));
        if is_image && path.is_file() {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}
