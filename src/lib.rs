use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::instrument;

pub mod config;
mod error;
pub mod overlay;
pub mod pool;
pub mod rectify;
mod result;
pub mod segment;
pub mod util;
pub mod writer;

pub use config::{DatasetSettings, PipelineConfig, PixelThreshold};
pub use error::{Error, Result};
pub use pool::{DispatchReport, Dispatcher, ExtractionJob, ImageJob};
pub use result::*;
pub use writer::ResultWriter;

use rectify::rectify;
use segment::{annotate, find_candidates, segment_stages, SegmentStages};

pub struct BeanExtractorBuilder {
    thresholds: PixelThreshold,
    padding: u32,
    debug_dir: Option<PathBuf>,
}

impl BeanExtractorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thresholds(mut self, thresholds: PixelThreshold) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    /// Also write the grayscale, blurred, binary and opened rasters of every
    /// processed file into `path`.
    pub fn debug_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(path.into());
        self
    }

    pub fn build(self) -> BeanExtractor {
        BeanExtractor {
            thresholds: self.thresholds,
            padding: self.padding,
            debug_dir: self.debug_dir,
        }
    }
}

impl Default for BeanExtractorBuilder {
    fn default() -> Self {
        Self {
            thresholds: PixelThreshold::default(),
            padding: config::DEFAULT_PADDING,
            debug_dir: None,
        }
    }
}

pub struct BeanExtractor {
    thresholds: PixelThreshold,
    padding: u32,
    debug_dir: Option<PathBuf>,
}

impl BeanExtractor {
    pub fn builder() -> BeanExtractorBuilder {
        BeanExtractorBuilder::new()
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        let builder = Self::builder()
            .thresholds(config.thresholds)
            .padding(config.padding);
        let builder = match &config.debug_dir {
            Some(dir) => builder.debug_dir(dir),
            None => builder,
        };
        builder.build()
    }

    /// Decodes the file at `path` and extracts its beans. A file that cannot
    /// be decoded yields [`Error::Decode`].
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn process(&self, path: &Path) -> Result<Extraction> {
        let image = image::open(path)
            .map_err(|source| Error::Decode {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgb8();
        let stages = segment_stages(&image);
        if let Some(dir) = &self.debug_dir {
            save_stages(dir, path, &stages)?;
        }
        Ok(self.extract_from_mask(&image, &stages))
    }

    #[instrument(skip(self, image))]
    pub fn extract(&self, image: &RgbImage) -> Extraction {
        let stages = segment_stages(image);
        self.extract_from_mask(image, &stages)
    }

    fn extract_from_mask(&self, image: &RgbImage, stages: &SegmentStages) -> Extraction {
        let candidates = find_candidates(&stages.opened, self.thresholds);
        let overview = annotate(image, &candidates);

        let beans = candidates
            .iter()
            .filter_map(|candidate| {
                let Some(bean) = rectify(image, candidate, self.padding) else {
                    log::warn!("Bean #{} has an empty crop, skipping", candidate.index);
                    return None;
                };
                log::info!(
                    "Bean #{} rectified: center=({:.1}, {:.1}), w={}, h={}, angle={:.1}",
                    bean.source_index,
                    bean.center.0,
                    bean.center.1,
                    bean.width,
                    bean.height,
                    bean.angle_applied
                );
                Some(bean)
            })
            .collect::<Vec<_>>();

        Extraction {
            overview,
            candidates: candidates.len(),
            beans,
        }
    }
}

fn save_stages(dir: &Path, source: &Path, stages: &SegmentStages) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let stem = writer::file_stem(source);
    let named = [
        ("gray", &stages.gray),
        ("blurred", &stages.blurred),
        ("binary", &stages.binary),
        ("opened", &stages.opened),
    ];
    for (name, stage) in named {
        let path = dir.join(format!("{stem}_{name}.png"));
        stage.save(&path).map_err(|source| Error::Encode { path, source })?;
    }
    log::debug!("Saved intermediate stages of {stem} to {}", dir.display());
    Ok(())
}
