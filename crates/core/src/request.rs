//! The `request.json` job descriptor stored at the root of every request
//! directory.
//!
//! Field names are camelCase on disk. Unknown fields are ignored so the
//! mapping form can evolve without breaking older tool versions.

use std::path::{Path, PathBuf};

use geo::{LineString, MultiPolygon, Polygon};
use serde::Deserialize;

use crate::datatype::DataType;
use crate::error::CoreError;
use crate::types::{DatatypeId, Timestamp};

/// File name of the job descriptor inside a request directory.
pub const REQUEST_FILE_NAME: &str = "request.json";

/// A drone mission processing request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRequest {
    /// Start of the acquisition window.
    #[serde(deserialize_with = "flexible_datetime::deserialize")]
    pub start: Timestamp,
    /// End of the acquisition window.
    #[serde(deserialize_with = "flexible_datetime::deserialize")]
    pub end: Timestamp,
    pub request_id: String,
    pub situation_id: String,
    /// Requested datatypes, see [`DataType::id`].
    pub datatype_ids: Vec<DatatypeId>,
    /// Area of interest as a GeoJSON Feature (Polygon or MultiPolygon).
    pub feature: geojson::Feature,
    /// Location of the `request.json` this request was loaded from.
    #[serde(skip)]
    pub file_path: PathBuf,
}

impl ProcessingRequest {
    /// Load and validate a request descriptor from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        let mut request: ProcessingRequest =
            serde_json::from_str(&raw).map_err(|e| CoreError::InvalidJson {
                path: path.to_path_buf(),
                source: e,
            })?;
        request.file_path = path.to_path_buf();
        request.validate()?;
        Ok(request)
    }

    /// Load the descriptor of the request rooted at `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, CoreError> {
        Self::from_file(&dir.join(REQUEST_FILE_NAME))
    }

    /// Request directory (parent of `request.json`).
    pub fn path(&self) -> &Path {
        self.file_path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Requested datatypes, rejecting unknown ids.
    pub fn datatypes(&self) -> Result<Vec<DataType>, CoreError> {
        self.datatype_ids.iter().map(|id| DataType::from_id(*id)).collect()
    }

    /// Whether the given datatype was requested.
    pub fn wants(&self, datatype: DataType) -> bool {
        self.datatype_ids.contains(&datatype.id())
    }

    /// GeoJSON geometry of the area of interest.
    pub fn geometry(&self) -> Option<&geojson::Geometry> {
        self.feature.geometry.as_ref()
    }

    /// Area of interest as a multipolygon in (lon, lat) order.
    pub fn footprint(&self) -> Result<MultiPolygon<f64>, CoreError> {
        let geometry = self
            .geometry()
            .ok_or_else(|| CoreError::Validation("Request feature has no geometry".into()))?;

        match &geometry.value {
            geojson::Value::Polygon(rings) => Ok(MultiPolygon::new(vec![polygon_from(rings)?])),
            geojson::Value::MultiPolygon(polygons) => polygons
                .iter()
                .map(|rings| polygon_from(rings))
                .collect::<Result<Vec<_>, _>>()
                .map(MultiPolygon::new),
            other => Err(CoreError::Validation(format!(
                "Request geometry must be a Polygon or MultiPolygon, got {}",
                geometry_type_name(other)
            ))),
        }
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.request_id.trim().is_empty() {
            return Err(CoreError::Validation("requestId must not be empty".into()));
        }
        if self.datatype_ids.is_empty() {
            return Err(CoreError::Validation("datatypeIds must not be empty".into()));
        }
        if self.end < self.start {
            return Err(CoreError::Validation(format!(
                "Request end ({}) is before start ({})",
                self.end, self.start
            )));
        }
        self.datatypes()?;
        self.footprint()?;
        Ok(())
    }
}

fn geometry_type_name(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn polygon_from(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>, CoreError> {
    let mut rings = rings.iter().map(|ring| ring_from(ring));
    let exterior = rings
        .next()
        .ok_or_else(|| CoreError::Validation("Polygon has no exterior ring".into()))??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn ring_from(ring: &[Vec<f64>]) -> Result<LineString<f64>, CoreError> {
    if ring.len() < 4 {
        return Err(CoreError::Validation(format!(
            "Polygon ring needs at least 4 positions, got {}",
            ring.len()
        )));
    }
    ring.iter()
        .map(|pos| match pos.as_slice() {
            [x, y, ..] => Ok((*x, *y)),
            _ => Err(CoreError::Validation("Position needs two coordinates".into())),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::from)
}

/// Accepts RFC 3339 timestamps and naive ISO-8601 ones (taken as UTC).
mod flexible_datetime {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
    }
}
