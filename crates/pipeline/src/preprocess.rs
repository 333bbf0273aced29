//! Image preprocessing before submission.
//!
//! RGB and thermal frames are captured in pairs with identical file
//! names. Pairs whose RGB frame was taken outside the request footprint
//! (or carries no GPS position) are dropped, the survivors are
//! subsampled by a frame step, and copied into `processed/` with
//! sequential names:
//!
//! ```text
//! processed/rgb/0007_RGB.jpg
//! processed/thermal/0007_THERMAL.jpg
//! processed/.preprocessing_complete
//! ```
//!
//! The number is the index of the pair in the original sorted listing.
//! All work here is blocking; run it on a blocking thread.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use exif::{In, Reader, Tag, Value};
use geo::{Contains, MultiPolygon, Point};
use odm_core::layout::find_images;
use odm_core::{DataType, ProcessingRequest, RequestLayout};

use crate::error::PipelineError;

/// Marker written once `processed/` is complete.
pub const COMPLETION_MARKER: &str = ".preprocessing_complete";

/// What a preprocessing run kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessSummary {
    pub processed_dir: PathBuf,
    /// Pairs found in the input directories.
    pub total: usize,
    /// Pairs inside the footprint.
    pub in_area: usize,
    /// Pairs copied after subsampling.
    pub kept: usize,
}

/// Preprocessing of one request directory.
pub struct Preprocessor<'a> {
    layout: RequestLayout,
    request: &'a ProcessingRequest,
    frame_step: usize,
}

impl<'a> Preprocessor<'a> {
    /// `frame_step` keeps one pair out of N; values below 1 are treated as 1.
    pub fn new(layout: RequestLayout, request: &'a ProcessingRequest, frame_step: usize) -> Self {
        Self {
            layout,
            request,
            frame_step: frame_step.max(1),
        }
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.layout.processed_dir()
    }

    /// Whether a run is required.
    ///
    /// With `force`, any previous output is deleted first.
    pub fn is_needed(&self, force: bool) -> Result<bool, PipelineError> {
        let processed = self.processed_dir();
        if force {
            if processed.exists() {
                tracing::debug!(path = %processed.display(), "Preprocessing forced, deleting previous output");
                std::fs::remove_dir_all(&processed).map_err(|e| PipelineError::io(&processed, e))?;
            }
            return Ok(true);
        }
        Ok(!processed.join(COMPLETION_MARKER).is_file())
    }

    pub fn run(&self) -> Result<PreprocessSummary, PipelineError> {
        tracing::info!(request_id = %self.request.request_id, "Starting preprocessing");

        let pairs = self.collect_pairs()?;
        let footprint = self.request.footprint()?;

        let in_area: Vec<(usize, &ImagePair)> = pairs
            .iter()
            .enumerate()
            .filter(|(_, pair)| match gps_position(&pair.rgb) {
                Some(position) => contains(&footprint, position),
                None => {
                    tracing::warn!(image = %pair.rgb.display(), "Skipping image without GPS position");
                    false
                }
            })
            .collect();
        tracing::info!(total = pairs.len(), in_area = in_area.len(), "Filtered images by area");

        let selected: Vec<_> = in_area.iter().step_by(self.frame_step).collect();
        tracing::info!(
            count = selected.len(),
            frame_step = self.frame_step,
            "Images after frame step filtering"
        );

        let processed = self.processed_dir();
        if processed.exists() {
            // Leftovers of an interrupted run would be submitted too.
            tracing::info!(path = %processed.display(), "Discarding incomplete preprocessing output");
            std::fs::remove_dir_all(&processed).map_err(|e| PipelineError::io(&processed, e))?;
        }
        let rgb_dir = processed.join(DataType::Rgb.name());
        let thermal_dir = processed.join(DataType::Thermal.name());
        create_dir(&rgb_dir)?;

        for (index, pair) in &selected {
            copy_renamed(&pair.rgb, &rgb_dir, *index, "RGB")?;
            if let Some(thermal) = &pair.thermal {
                create_dir(&thermal_dir)?;
                copy_renamed(thermal, &thermal_dir, *index, "THERMAL")?;
            }
        }

        let marker = processed.join(COMPLETION_MARKER);
        File::create(&marker).map_err(|e| PipelineError::io(&marker, e))?;

        tracing::info!(images_processed = selected.len(), "Preprocessing complete");
        Ok(PreprocessSummary {
            processed_dir: processed,
            total: pairs.len(),
            in_area: in_area.len(),
            kept: selected.len(),
        })
    }

    /// Pair RGB frames with their thermal counterpart.
    fn collect_pairs(&self) -> Result<Vec<ImagePair>, PipelineError> {
        let rgb_dir = self.layout.root().join(DataType::Rgb.name());
        let rgb = if rgb_dir.is_dir() { find_images(&rgb_dir)? } else { Vec::new() };
        if rgb.is_empty() {
            return Err(PipelineError::Preprocess(
                "No RGB images found, cannot proceed".into(),
            ));
        }

        if !self.request.wants(DataType::Thermal) {
            return Ok(rgb
                .into_iter()
                .map(|rgb| ImagePair { rgb, thermal: None })
                .collect());
        }

        let thermal_dir = self.layout.root().join(DataType::Thermal.name());
        let thermal = if thermal_dir.is_dir() { find_images(&thermal_dir)? } else { Vec::new() };
        if thermal.is_empty() {
            return Err(PipelineError::Preprocess(
                "Thermal imagery was requested but none was found".into(),
            ));
        }
        if rgb.len() != thermal.len() {
            return Err(PipelineError::Preprocess(format!(
                "Length mismatch: {} (RGB), {} (thermal)",
                rgb.len(),
                thermal.len()
            )));
        }

        rgb.into_iter()
            .zip(thermal)
            .map(|(rgb, thermal)| {
                if rgb.file_name() != thermal.file_name() {
                    return Err(PipelineError::Preprocess(format!(
                        "Name mismatch: {} <-> {}",
                        rgb.display(),
                        thermal.display()
                    )));
                }
                Ok(ImagePair {
                    rgb,
                    thermal: Some(thermal),
                })
            })
            .collect()
    }
}

#[derive(Debug)]
struct ImagePair {
    rgb: PathBuf,
    thermal: Option<PathBuf>,
}

/// `(latitude, longitude)` in decimal degrees from the EXIF GPS tags.
pub fn gps_position(path: &Path) -> Option<(f64, f64)> {
    let file = File::open(path).ok()?;
    let exif = match Reader::new().read_from_container(&mut BufReader::new(file)) {
        Ok(exif) => exif,
        Err(e) => {
            tracing::debug!(image = %path.display(), error = %e, "No EXIF metadata");
            return None;
        }
    };

    let coordinate = |value_tag: Tag, ref_tag: Tag, negative: u8| -> Option<f64> {
        let degrees = match &exif.get_field(value_tag, In::PRIMARY)?.value {
            Value::Rational(parts) if parts.len() >= 3 => {
                parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0
            }
            _ => return None,
        };
        let hemisphere = match &exif.get_field(ref_tag, In::PRIMARY)?.value {
            Value::Ascii(values) => values.first().and_then(|v| v.first()).copied(),
            _ => None,
        };
        Some(if hemisphere == Some(negative) { -degrees } else { degrees })
    };

    let lat = coordinate(Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S')?;
    let lon = coordinate(Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W')?;
    Some((lat, lon))
}

fn contains(footprint: &MultiPolygon<f64>, (lat, lon): (f64, f64)) -> bool {
    footprint.contains(&Point::new(lon, lat))
}

fn create_dir(dir: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))
}

fn copy_renamed(source: &Path, dir: &Path, index: usize, label: &str) -> Result<(), PipelineError> {
    let extension = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let target = dir.join(format!("{index:04}_{label}{extension}"));
    std::fs::copy(source, &target).map_err(|e| PipelineError::io(&target, e))?;
    Ok(())
}
