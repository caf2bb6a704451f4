use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;
pub const DEFAULT_PADDING: u32 = 3;

/// Open interval of accepted contour areas, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PixelThreshold {
    pub lower: f32,
    pub upper: f32,
}

impl PixelThreshold {
    pub fn new(lower: f32, upper: f32) -> Self {
        Self { lower, upper }
    }

    /// Both bounds are exclusive.
    pub fn contains(&self, area: f32) -> bool {
        self.lower < area && area < self.upper
    }
}

impl Default for PixelThreshold {
    fn default() -> Self {
        Self {
            lower: 10_000.0,
            upper: 50_000.0,
        }
    }
}

/// The part of the dataset settings file the extractor cares about. Other
/// keys (labels, last index, ...) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetSettings {
    #[serde(default)]
    pub coffee_bean_pixel_threshold: Option<PixelThreshold>,
}

impl DatasetSettings {
    pub fn from_yaml_str(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml).map_err(|source| Error::Settings {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_dir: PathBuf,
    pub overview_dir: PathBuf,
    pub crops_dir: PathBuf,
    pub thresholds: PixelThreshold,
    pub padding: u32,
    pub workers: usize,
    pub queue_capacity: usize,
    /// Where to dump the intermediate binarisation rasters, if anywhere.
    pub debug_dir: Option<PathBuf>,
}

impl PipelineConfig {
    /// Overviews go to `<source>/result`, crops to `<source>/coffee_beans`.
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        let source_dir = source_dir.into();
        Self {
            overview_dir: source_dir.join("result"),
            crops_dir: source_dir.join("coffee_beans"),
            source_dir,
            thresholds: PixelThreshold::default(),
            padding: DEFAULT_PADDING,
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            debug_dir: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let PixelThreshold { lower, upper } = self.thresholds;
        if !(lower.is_finite() && upper.is_finite()) || lower < 0.0 || lower >= upper {
            return Err(Error::config(format!(
                "pixel threshold must satisfy 0 <= lower < upper, got lower={lower} upper={upper}"
            )));
        }
        if self.workers == 0 {
            return Err(Error::config("at least one worker is required"));
        }
        if self.queue_capacity == 0 {
            return Err(Error::config("queue capacity must be positive"));
        }
        Ok(())
    }
}
