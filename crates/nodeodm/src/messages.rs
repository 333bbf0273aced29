//! Typed NodeODM response bodies.
//!
//! Only the fields the tool relies on are modelled; everything else in
//! the engine's JSON is ignored. Optional fields default so that older
//! and newer node versions both parse.

use chrono::{DateTime, Utc};
use odm_core::TaskStatus;
use serde::Deserialize;

use crate::error::NodeOdmError;

/// `GET /info`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    #[serde(default = "unknown")]
    pub version: String,
    #[serde(default)]
    pub task_queue_count: u32,
    #[serde(default)]
    pub available_memory: Option<u64>,
    #[serde(default = "one")]
    pub max_parallel_tasks: u32,
    #[serde(default)]
    pub max_images: Option<u64>,
    #[serde(default = "unknown")]
    pub engine: String,
    #[serde(default = "unknown")]
    pub engine_version: String,
}

fn unknown() -> String {
    "unknown".to_string()
}

fn one() -> u32 {
    1
}

/// One entry of `GET /task/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskListEntry {
    pub uuid: String,
}

/// `status` object inside [`TaskInfo`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusInfo {
    pub code: u16,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// `GET /task/{uuid}/info`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    /// Creation time in milliseconds since the epoch.
    #[serde(default)]
    pub date_created: i64,
    /// Processing time in milliseconds; `-1` before the task starts.
    #[serde(default)]
    pub processing_time: i64,
    pub status: TaskStatusInfo,
    #[serde(default)]
    pub images_count: u32,
    /// Completion percentage, 0-100.
    #[serde(default)]
    pub progress: f64,
}

impl TaskInfo {
    /// Decode the numeric status code.
    pub fn status(&self) -> Result<TaskStatus, NodeOdmError> {
        TaskStatus::from_code(self.status.code)
            .ok_or(NodeOdmError::UnknownStatus(self.status.code))
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.date_created)
    }

    /// Progress rounded down to a whole percentage.
    pub fn progress_percent(&self) -> u8 {
        self.progress.clamp(0.0, 100.0) as u8
    }

    pub fn last_error(&self) -> Option<&str> {
        self.status.error_message.as_deref()
    }
}

/// `POST /task/new`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskResponse {
    pub uuid: String,
}

/// `POST /task/cancel`, `POST /task/remove`
#[derive(Debug, Clone, Deserialize)]
pub struct SuccessResponse {
    #[serde(default)]
    pub success: bool,
}
