//! On-disk layout of a request directory.
//!
//! ```text
//! <request>/
//!   request.json
//!   rgb/ thermal/            input images, one directory per datatype
//!   processed/               preprocessing output (same per-datatype layout)
//!   outputs/<datatype>/      extracted engine results
//!   .odm-tasks.json          local task registry
//! ```
//!
//! [`RequestLayout`] only resolves paths and scans directories; it never
//! deletes anything.

use std::path::{Path, PathBuf};

use crate::datatype::DataType;
use crate::error::CoreError;
use crate::request::REQUEST_FILE_NAME;

/// Image extensions accepted as engine input (lowercase, no dot).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff"];

/// Directory holding preprocessed images.
pub const PROCESSED_DIR: &str = "processed";
/// Directory holding downloaded engine results.
pub const OUTPUTS_DIR: &str = "outputs";
/// File name of the local task registry.
pub const REGISTRY_FILE_NAME: &str = ".odm-tasks.json";

/// Orthophoto location inside an extracted result archive.
const ORTHOPHOTO_PATH: &str = "odm_orthophoto/odm_orthophoto.tif";
/// Report locations inside an extracted result archive, in preference order.
const REPORT_PATHS: &[&str] = &["odm_report/report.pdf", "odm_report/odm_report.pdf"];

/// Images found for one datatype.
#[derive(Debug, Clone)]
pub struct DatatypeGroup {
    pub datatype: DataType,
    pub dir: PathBuf,
    pub images: Vec<PathBuf>,
}

/// Result files extracted from a completed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFiles {
    pub orthophoto: PathBuf,
    pub report: Option<PathBuf>,
}

impl ResultFiles {
    /// All present files, orthophoto first.
    pub fn files(&self) -> Vec<&Path> {
        std::iter::once(self.orthophoto.as_path())
            .chain(self.report.as_deref())
            .collect()
    }
}

/// Path resolver for a single request directory.
#[derive(Debug, Clone)]
pub struct RequestLayout {
    root: PathBuf,
}

impl RequestLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn request_file(&self) -> PathBuf {
        self.root.join(REQUEST_FILE_NAME)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join(PROCESSED_DIR)
    }

    pub fn registry_file(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE_NAME)
    }

    /// Output directory for a datatype; not created here.
    pub fn output_dir(&self, datatype: DataType) -> PathBuf {
        self.root.join(OUTPUTS_DIR).join(datatype.name())
    }

    /// Check that the directory looks like a request.
    ///
    /// Requires the directory itself, a `request.json`, and at least one
    /// subdirectory holding datatype images.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.root.is_dir() {
            return Err(CoreError::Validation(format!(
                "Path '{}' is not a valid directory",
                self.root.display()
            )));
        }
        if !self.request_file().is_file() {
            return Err(CoreError::Validation(format!(
                "{REQUEST_FILE_NAME} file missing in '{}'",
                self.root.display()
            )));
        }
        let entries = std::fs::read_dir(&self.root).map_err(|e| CoreError::io(&self.root, e))?;
        let has_subdir = entries
            .filter_map(Result::ok)
            .any(|entry| entry.path().is_dir());
        if !has_subdir {
            return Err(CoreError::Validation(
                "At least one data type subdirectory is required".into(),
            ));
        }
        Ok(())
    }

    /// Collect images for each requested datatype below `data_root`.
    ///
    /// `data_root` is either the request root or its `processed/`
    /// directory. Datatypes without images are skipped with a warning.
    pub fn datatype_groups(
        data_root: &Path,
        datatypes: &[DataType],
    ) -> Result<Vec<DatatypeGroup>, CoreError> {
        let mut groups = Vec::new();
        for &datatype in datatypes {
            let dir = data_root.join(datatype.name());
            if !dir.is_dir() {
                tracing::warn!(datatype = %datatype, path = %dir.display(), "Missing datatype directory");
                continue;
            }
            let images = find_images(&dir)?;
            if images.is_empty() {
                tracing::warn!(datatype = %datatype, path = %dir.display(), "No images found for datatype");
                continue;
            }
            groups.push(DatatypeGroup {
                datatype,
                dir,
                images,
            });
        }
        Ok(groups)
    }

    /// Locate the result files inside an extracted archive.
    ///
    /// Returns `None` when the orthophoto is missing.
    pub fn find_result_files(result_dir: &Path) -> Option<ResultFiles> {
        let orthophoto = result_dir.join(ORTHOPHOTO_PATH);
        if !orthophoto.is_file() {
            return None;
        }
        let report = REPORT_PATHS
            .iter()
            .map(|p| result_dir.join(p))
            .find(|p| p.is_file());
        Some(ResultFiles { orthophoto, report })
    }
}

/// Whether a path has one of the [`IMAGE_EXTENSIONS`] (case-insensitive).
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// List image files directly inside `dir`, sorted by path.
pub fn find_images(dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let entries = std::fs::read_dir(dir).map_err(|e| CoreError::io(dir, e))?;
    let mut images: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_image(path))
        .collect();
    images.sort();
    Ok(images)
}
