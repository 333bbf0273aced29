//! Imagery datatypes carried by a drone mission.
//!
//! The numeric ids come from the mapping request form; the lowercase
//! names double as the input directory names inside a request and as
//! the suffix of remote task names.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::types::DatatypeId;

/// A supported imagery datatype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    Thermal,
    Rgb,
}

impl DataType {
    /// Every supported datatype, in a stable order.
    pub const ALL: [DataType; 2] = [DataType::Rgb, DataType::Thermal];

    /// Request-form identifier.
    pub fn id(self) -> DatatypeId {
        match self {
            DataType::Thermal => 22001,
            DataType::Rgb => 22002,
        }
    }

    /// Directory / task-name form of the datatype.
    pub fn name(self) -> &'static str {
        match self {
            DataType::Thermal => "thermal",
            DataType::Rgb => "rgb",
        }
    }

    /// Look up a datatype by its request-form identifier.
    pub fn from_id(id: DatatypeId) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|dt| dt.id() == id)
            .ok_or_else(|| CoreError::Validation(format!("Unknown datatype id: {id}")))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|dt| dt.name() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown datatype name: '{s}'")))
    }
}
