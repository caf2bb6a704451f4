use std::{
    collections::{hash_map::Entry, HashMap},
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
};

use image::{ImageFormat, RgbImage};
use tracing::instrument;

use crate::{Error, Result};

const EXTENSION: &str = "jpg";

/// Persists overviews and sequentially numbered crops.
///
/// Sequence numbers are tracked per `(folder, namespace)`: the first save into
/// a namespace scans the folder for the highest existing `{namespace}_{n}.jpg`,
/// after which numbers are handed out from an atomic counter. One writer shared
/// between workers therefore never gives the same name twice. Separate
/// processes writing into the same folder are not coordinated.
#[derive(Debug, Default)]
pub struct ResultWriter {
    counters: Mutex<HashMap<(PathBuf, String), Arc<AtomicU32>>>,
}

impl ResultWriter {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(level = "debug", skip(self, image))]
    pub fn save(&self, folder: &Path, image: &RgbImage, namespace: &str) -> Result<PathBuf> {
        ensure_folder(folder)?;
        let number = self.next_number(folder, namespace)?;
        let path = folder.join(format!("{namespace}_{number}.{EXTENSION}"));
        write_image(&path, image, ImageFormat::Jpeg)?;
        log::info!("Saved image to {}", path.display());
        Ok(path)
    }

    /// Writes the annotated overview under the file name of `source`, encoded
    /// in the format its extension names, replacing any previous one.
    #[instrument(level = "debug", skip(self, image))]
    pub fn save_overview(&self, folder: &Path, image: &RgbImage, source: &Path) -> Result<PathBuf> {
        ensure_folder(folder)?;
        let path = match source.file_name() {
            Some(name) => folder.join(name),
            None => folder.join(format!("image.{EXTENSION}")),
        };
        let format = ImageFormat::from_path(&path).unwrap_or(ImageFormat::Jpeg);
        write_image(&path, image, format)?;
        Ok(path)
    }

    fn next_number(&self, folder: &Path, namespace: &str) -> Result<u32> {
        let counter = {
            let mut counters = self
                .counters
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match counters.entry((folder.to_path_buf(), namespace.to_string())) {
                Entry::Occupied(entry) => Arc::clone(entry.get()),
                Entry::Vacant(entry) => {
                    let start = highest_number(folder, namespace)?;
                    log::debug!("Numbering for {namespace:?} in {folder:?} continues after {start}");
                    Arc::clone(entry.insert(Arc::new(AtomicU32::new(start))))
                }
            }
        };
        counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .map(|previous| previous + 1)
            .map_err(|_| Error::NumberingExhausted {
                folder: folder.to_path_buf(),
                namespace: namespace.to_string(),
            })
    }
}

/// Namespace the crops of `source` are numbered under.
pub fn bean_namespace(source: &Path) -> String {
    format!("{}_coffee_bean", file_stem(source))
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

fn ensure_folder(folder: &Path) -> Result<()> {
    if !folder.is_dir() {
        fs::create_dir_all(folder)?;
        log::info!("Created folder {}", folder.display());
    }
    Ok(())
}

fn write_image(path: &Path, image: &RgbImage, format: ImageFormat) -> Result<()> {
    image
        .save_with_format(path, format)
        .map_err(|source| Error::Encode {
            path: path.to_path_buf(),
            source,
        })
}

/// Largest `n` among files named exactly `{namespace}_{n}.jpg`, or 0.
fn highest_number(folder: &Path, namespace: &str) -> Result<u32> {
    let prefix = format!("{namespace}_");
    let suffix = format!(".{EXTENSION}");
    let mut highest = 0;
    for entry in fs::read_dir(folder)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let number = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(&suffix))
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u32>().ok());
        if let Some(number) = number {
            highest = highest.max(number);
        }
    }
    Ok(highest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashSet, thread};

    fn tiny() -> RgbImage {
        RgbImage::from_pixel(4, 4, image::Rgb([90, 60, 30]))
    }

    #[test]
    fn numbering_continues_after_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "a_coffee_bean_2.jpg",
            "a_coffee_bean_11.jpg",
            "a_coffee_bean_x.jpg",
            "a_coffee_bean_40.png",
            "b_coffee_bean_99.jpg",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let writer = ResultWriter::new();
        let first = writer.save(dir.path(), &tiny(), "a_coffee_bean").unwrap();
        let second = writer.save(dir.path(), &tiny(), "a_coffee_bean").unwrap();
        assert_eq!(first, dir.path().join("a_coffee_bean_12.jpg"));
        assert_eq!(second, dir.path().join("a_coffee_bean_13.jpg"));
        assert!(first.is_file() && second.is_file());

        let fresh = writer.save(dir.path(), &tiny(), "c_coffee_bean").unwrap();
        assert_eq!(fresh, dir.path().join("c_coffee_bean_1.jpg"));
    }

    #[test]
    fn creates_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("x").join("y");
        let path = ResultWriter::new().save(&nested, &tiny(), "n").unwrap();
        assert_eq!(path, nested.join("n_1.jpg"));
    }

    #[test]
    fn concurrent_saves_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(ResultWriter::new());
        let handles = (0..8)
            .map(|_| {
                let writer = Arc::clone(&writer);
                let folder = dir.path().to_path_buf();
                thread::spawn(move || {
                    (0..10)
                        .map(|_| writer.save(&folder, &tiny(), "shared").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();
        let paths = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect::<HashSet<_>>();
        assert_eq!(paths.len(), 80);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 80);
    }

    #[test]
    fn overview_keeps_source_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new();
        let png = writer
            .save_overview(dir.path(), &tiny(), Path::new("/trays/IMG_0042.PNG"))
            .unwrap();
        let jpg = writer
            .save_overview(dir.path(), &tiny(), Path::new("/trays/IMG_0042.jpg"))
            .unwrap();
        assert_eq!(png, dir.path().join("IMG_0042.PNG"));
        assert_eq!(jpg, dir.path().join("IMG_0042.jpg"));
        assert_eq!(image::ImageFormat::from_path(&png).unwrap(), ImageFormat::Png);
        assert!(image::open(&png).is_ok() && image::open(&jpg).is_ok());
        assert_eq!(bean_namespace(Path::new("/trays/IMG_0042.PNG")), "IMG_0042_coffee_bean");
    }

    #[test]
    fn exhausted_numbering_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(format!("n_{}.jpg", u32::MAX)), b"").unwrap();
        let writer = ResultWriter::new();
        let result = writer.save(dir.path(), &tiny(), "n");
        assert!(matches!(result, Err(Error::NumberingExhausted { .. })));
        assert!(matches!(
            writer.save(dir.path(), &tiny(), "n"),
            Err(Error::NumberingExhausted { .. })
        ));
        assert_eq!(
            writer.save(dir.path(), &tiny(), "m").unwrap(),
            dir.path().join("m_1.jpg")
        );
    }
}
