//! Locating, downloading and unpacking the hand landmarker model bundle.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::Context;

/// Where the MediaPipe hand landmarker bundle is downloaded from by default.
pub const DEFAULT_MODEL_URL: &str = "https://storage.googleapis.com/mediapipe-models/hand_landmarker/hand_landmarker/float16/latest/hand_landmarker.task";

/// Default location of the model bundle, relative to the working directory.
pub const DEFAULT_MODEL_PATH: &str = "hand_landmarker.task";

const PALM_DETECTOR_ENTRY: &str = "hand_detector.tflite";
const LANDMARK_DETECTOR_ENTRY: &str = "hand_landmarks_detector.tflite";

/// Makes sure the model file at `path` exists, downloading it from `url` if it does not.
///
/// The download goes to a temporary file next to `path` which is only renamed to `path` once it is
/// complete.
pub fn ensure_model(path: &Path, url: &str) -> anyhow::Result<PathBuf> {
    if path.exists() {
        log::debug!("using existing model at {}", path.display());
        return Ok(path.to_path_buf());
    }

    println!();
    println!("Downloading model from {url}...");

    let part = partial_path(path);
    let result = download(url, &part);
    if result.is_err() {
        fs::remove_file(&part).ok();
    }
    result?;
    fs::rename(&part, path).with_context(|| {
        format!(
            "failed to move downloaded model from {} to {}",
            part.display(),
            path.display(),
        )
    })?;

    println!("Model downloaded and saved as {}", path.display());
    Ok(path.to_path_buf())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

fn download(url: &str, to: &Path) -> anyhow::Result<()> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("failed to download model from {url}"))?;
    let mut file =
        File::create(to).with_context(|| format!("failed to create {}", to.display()))?;
    let bytes = io::copy(&mut response.into_reader(), &mut file)
        .with_context(|| format!("failed to download model from {url}"))?;
    file.sync_all()?;
    log::debug!("downloaded {bytes} bytes from {url}");
    Ok(())
}

/// The networks contained in a MediaPipe hand landmarker `.task` bundle.
///
/// The bundle is a zip archive holding the palm detection and hand landmark networks as TensorFlow
/// Lite files.
pub struct ModelBundle {
    palm_detector: Vec<u8>,
    landmark_detector: Vec<u8>,
}

impl ModelBundle {
    /// Reads both networks from the bundle at `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open model bundle {}", path.display()))?;
        let mut archive = zip::ZipArchive::new(file)
            .with_context(|| format!("{} is not a model bundle", path.display()))?;

        let mut read_entry = |name: &str| -> anyhow::Result<Vec<u8>> {
            let mut entry = archive
                .by_name(name)
                .with_context(|| format!("model bundle {} has no {name}", path.display()))?;
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            Ok(buf)
        };

        let palm_detector = read_entry(PALM_DETECTOR_ENTRY)?;
        let landmark_detector = read_entry(LANDMARK_DETECTOR_ENTRY)?;
        log::debug!(
            "loaded model bundle {} (palm detector: {} bytes, landmark detector: {} bytes)",
            path.display(),
            palm_detector.len(),
            landmark_detector.len(),
        );

        Ok(Self {
            palm_detector,
            landmark_detector,
        })
    }

    /// Returns the raw palm detection network.
    pub fn palm_detector(&self) -> &[u8] {
        &self.palm_detector
    }

    /// Returns the raw hand landmark network.
    pub fn landmark_detector(&self) -> &[u8] {
        &self.landmark_detector
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::tempdir;
    use zip::write::FileOptions;

    use super::*;

    fn write_bundle(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn open_bundle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hands.task");
        write_bundle(
            &path,
            &[
                ("hand_detector.tflite", b"palm"),
                ("hand_landmarks_detector.tflite", b"landmarks"),
            ],
        );

        let bundle = ModelBundle::open(&path).unwrap();
        assert_eq!(bundle.palm_detector(), b"palm");
        assert_eq!(bundle.landmark_detector(), b"landmarks");
    }

    #[test]
    fn incomplete_bundle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hands.task");
        write_bundle(&path, &[("hand_detector.tflite", b"palm")]);

        let err = ModelBundle::open(&path).err().unwrap();
        assert!(format!("{err:#}").contains("hand_landmarks_detector.tflite"));

        fs::write(&path, b"not a zip").unwrap();
        assert!(ModelBundle::open(&path).is_err());
    }

    #[test]
    fn existing_model_is_not_downloaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.task");
        fs::write(&path, b"model").unwrap();

        // The URL is never contacted.
        let found = ensure_model(&path, "http://invalid.invalid/model.task").unwrap();
        assert_eq!(found, path);
    }

    #[test]
    fn failed_download_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.task");
        // Left over from an earlier interrupted run.
        fs::write(partial_path(&path), b"stale").unwrap();

        // Nothing listens on port 1.
        let err = ensure_model(&path, "http://127.0.0.1:1/x").unwrap_err();
        assert!(format!("{err:#}").contains("http://127.0.0.1:1/x"), "{err:#}");
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn partial_download_path() {
        assert_eq!(
            partial_path(Path::new("models/hand_landmarker.task")),
            Path::new("models/hand_landmarker.task.part"),
        );
    }
}
