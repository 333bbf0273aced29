/// Numeric datatype identifier as used by the mapping request form.
pub type DatatypeId = i32;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
