//! Registry entries.

use std::path::PathBuf;

use chrono::Utc;
use odm_core::naming::{parse_task_name, task_name};
use odm_core::types::{DatatypeId, Timestamp};
use odm_core::{CoreError, DataType, TaskStatus};
use serde::{Deserialize, Serialize};

/// A remote task tracked for one request / datatype pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTracker {
    /// NodeODM task uuid.
    pub uuid: String,
    pub request_id: String,
    pub datatype_id: DatatypeId,
    /// Remote task name, `{request_id}_{datatype}`.
    pub name: String,
    pub created_at: Timestamp,
    /// Last status observed on the node.
    pub status: TaskStatus,
    /// Directory the results were extracted into, once downloaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl TaskTracker {
    /// Track a freshly submitted task.
    pub fn new(uuid: impl Into<String>, request_id: impl Into<String>, datatype: DataType) -> Self {
        let request_id = request_id.into();
        Self {
            uuid: uuid.into(),
            name: task_name(&request_id, datatype),
            request_id,
            datatype_id: datatype.id(),
            created_at: Utc::now(),
            status: TaskStatus::Queued,
            output_path: None,
        }
    }

    /// Track a task found on the node.
    ///
    /// Returns `None` when the remote name was not produced by this tool.
    pub fn from_remote(remote: &RemoteTask) -> Option<Self> {
        let (request_id, datatype) = parse_task_name(&remote.name)?;
        Some(Self {
            uuid: remote.uuid.clone(),
            request_id: request_id.to_string(),
            datatype_id: datatype.id(),
            name: remote.name.clone(),
            created_at: remote.created_at.unwrap_or_else(Utc::now),
            status: remote.status,
            output_path: None,
        })
    }

    pub fn datatype(&self) -> Result<DataType, CoreError> {
        DataType::from_id(self.datatype_id)
    }
}

/// What the node reports about one of its tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTask {
    pub uuid: String,
    pub name: String,
    pub status: TaskStatus,
    pub created_at: Option<Timestamp>,
}
