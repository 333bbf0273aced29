//! Naming conventions shared between the engine and the data lake.
//!
//! Remote task names encode the request id and datatype
//! (`{request_id}_{datatype}`), which is what makes resubmission
//! idempotent: a task with the same name is adopted instead of created.

use chrono::NaiveDate;

use crate::datatype::DataType;
use crate::types::DatatypeId;

/// Remote task name for a request / datatype pair.
pub fn task_name(request_id: &str, datatype: DataType) -> String {
    format!("{request_id}_{}", datatype.name())
}

/// Split a remote task name into request id and datatype.
///
/// Splits on the last underscore so request ids may contain underscores.
/// Returns `None` for names not created by this tool.
pub fn parse_task_name(name: &str) -> Option<(&str, DataType)> {
    let (request_id, suffix) = name.rsplit_once('_')?;
    if request_id.is_empty() {
        return None;
    }
    let datatype = suffix.parse().ok()?;
    Some((request_id, datatype))
}

/// Whether a remote task name belongs to the given request.
pub fn belongs_to(name: &str, request_id: &str) -> bool {
    parse_task_name(name).is_some_and(|(id, _)| id == request_id)
}

/// Data lake package title for a request.
pub fn package_title(situation_id: &str, request_id: &str) -> String {
    format!("Drone mission - situation: {situation_id}, request: {request_id}")
}

/// Data lake resource name: `{date} {title} {datatype} {request}`.
///
/// Empty components are skipped. With `underscore`, spaces become
/// underscores and `-`, `:` and `,` are dropped.
pub fn resource_name(
    date: NaiveDate,
    title: &str,
    datatype_id: DatatypeId,
    request_code: &str,
    underscore: bool,
) -> String {
    let date = date.format("%Y-%m-%d").to_string();
    let datatype = datatype_id.to_string();
    let name = [date.as_str(), title, datatype.as_str(), request_code]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if !underscore {
        return name;
    }
    name.chars()
        .filter(|c| !matches!(c, '-' | ':' | ','))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_name_round_trip() {
        let name = task_name("REQ_2024_07", DataType::Thermal);
        assert_eq!(name, "REQ_2024_07_thermal");
        assert_eq!(parse_task_name(&name), Some(("REQ_2024_07", DataType::Thermal)));
    }

    #[test]
    fn foreign_names_are_ignored() {
        assert_eq!(parse_task_name("some-other-task"), None);
        assert_eq!(parse_task_name("REQ_swir"), None);
        assert_eq!(parse_task_name("_rgb"), None);
    }

    #[test]
    fn belongs_to_matches_exact_request() {
        assert!(belongs_to("REQ-1_rgb", "REQ-1"));
        assert!(!belongs_to("REQ-10_rgb", "REQ-1"));
    }

    #[test]
    fn resource_name_plain_and_underscored() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert_eq!(
            resource_name(date, "Fire, north", 22002, "REQ-1", false),
            "2024-07-01 Fire, north 22002 REQ-1"
        );
        assert_eq!(
            resource_name(date, "Fire, north", 22002, "REQ-1", true),
            "20240701_Fire_north_22002_REQ1"
        );
    }

    #[test]
    fn resource_name_skips_empty_title() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert_eq!(resource_name(date, "", 22001, "R", false), "2024-07-01 22001 R");
    }
}
