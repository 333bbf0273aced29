//! The persisted registry file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use odm_core::naming::belongs_to;
use odm_core::TaskStatus;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::tracker::{RemoteTask, TaskTracker};

/// Current on-disk format version.
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryFile {
    version: u32,
    request_id: String,
    tasks: Vec<TaskTracker>,
}

/// Outcome of [`TaskRegistry::reconcile`].
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Local entries whose remote task no longer exists.
    pub dropped: Vec<TaskTracker>,
    /// Remote tasks of this request that were not tracked locally.
    pub adopted: Vec<TaskTracker>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.dropped.is_empty() && self.adopted.is_empty()
    }
}

/// Tasks submitted for one request, keyed by remote task name.
///
/// Mutations only touch memory; call [`save`](Self::save) to persist.
#[derive(Debug)]
pub struct TaskRegistry {
    path: PathBuf,
    request_id: String,
    tasks: BTreeMap<String, TaskTracker>,
}

impl TaskRegistry {
    /// Load the registry at `path`, or start an empty one if the file
    /// does not exist yet.
    pub fn open(path: impl Into<PathBuf>, request_id: &str) -> Result<Self, RegistryError> {
        let path = path.into();
        let mut registry = Self {
            path,
            request_id: request_id.to_string(),
            tasks: BTreeMap::new(),
        };

        let raw = match std::fs::read(&registry.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %registry.path.display(), "No task registry yet");
                return Ok(registry);
            }
            Err(e) => return Err(RegistryError::io(&registry.path, e)),
        };

        let file: RegistryFile =
            serde_json::from_slice(&raw).map_err(|source| RegistryError::Corrupt {
                path: registry.path.clone(),
                source,
            })?;
        if file.request_id != request_id {
            return Err(RegistryError::RequestMismatch {
                expected: request_id.to_string(),
                found: file.request_id,
            });
        }

        registry.tasks = file
            .tasks
            .into_iter()
            .map(|task| (task.name.clone(), task))
            .collect();
        tracing::debug!(
            path = %registry.path.display(),
            tasks = registry.tasks.len(),
            "Task registry loaded",
        );
        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn get_by_name(&self, name: &str) -> Option<&TaskTracker> {
        self.tasks.get(name)
    }

    pub fn get(&self, uuid: &str) -> Option<&TaskTracker> {
        self.tasks.values().find(|t| t.uuid == uuid)
    }

    /// Track a task, replacing any previous entry with the same name.
    pub fn record(&mut self, tracker: TaskTracker) -> Option<TaskTracker> {
        self.tasks.insert(tracker.name.clone(), tracker)
    }

    pub fn update_status(&mut self, uuid: &str, status: TaskStatus) -> Result<(), RegistryError> {
        self.get_mut(uuid)?.status = status;
        Ok(())
    }

    pub fn set_output(&mut self, uuid: &str, output: impl Into<PathBuf>) -> Result<(), RegistryError> {
        self.get_mut(uuid)?.output_path = Some(output.into());
        Ok(())
    }

    pub fn remove(&mut self, uuid: &str) -> Option<TaskTracker> {
        let name = self.get(uuid)?.name.clone();
        self.tasks.remove(&name)
    }

    /// Tracked tasks ordered by name.
    pub fn entries(&self) -> impl Iterator<Item = &TaskTracker> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Align the registry with what the node reports.
    ///
    /// `listed` is every task uuid the node lists; `remote` holds the
    /// details that could be fetched for them. Only entries whose uuid is
    /// absent from `listed` are dropped, so a listed task without details
    /// keeps its stored status. Remote tasks named after this request that
    /// are not tracked are adopted, and statuses of surviving entries are
    /// refreshed.
    pub fn reconcile(&mut self, listed: &[String], remote: &[RemoteTask]) -> Reconciliation {
        let mut outcome = Reconciliation::default();

        let stale: Vec<String> = self
            .tasks
            .values()
            .filter(|t| !listed.contains(&t.uuid))
            .map(|t| t.name.clone())
            .collect();
        for name in stale {
            if let Some(tracker) = self.tasks.remove(&name) {
                tracing::info!(task_id = %tracker.uuid, name = %tracker.name, "Dropping task missing on node");
                outcome.dropped.push(tracker);
            }
        }

        for task in remote.iter().filter(|r| belongs_to(&r.name, &self.request_id)) {
            match self.tasks.get_mut(&task.name) {
                Some(local) if local.uuid == task.uuid => local.status = task.status,
                // A different uuid under a known name: keep the local one.
                Some(_) => {}
                None => {
                    if let Some(tracker) = TaskTracker::from_remote(task) {
                        tracing::info!(task_id = %tracker.uuid, name = %tracker.name, "Adopting remote task");
                        outcome.adopted.push(tracker.clone());
                        self.tasks.insert(tracker.name.clone(), tracker);
                    }
                }
            }
        }

        outcome
    }

    /// Write the registry next to its final path, then rename over it.
    pub fn save(&self) -> Result<(), RegistryError> {
        let file = RegistryFile {
            version: FORMAT_VERSION,
            request_id: self.request_id.clone(),
            tasks: self.tasks.values().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|source| RegistryError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json).map_err(|e| RegistryError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| RegistryError::io(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), tasks = self.tasks.len(), "Task registry saved");
        Ok(())
    }

    fn get_mut(&mut self, uuid: &str) -> Result<&mut TaskTracker, RegistryError> {
        self.tasks
            .values_mut()
            .find(|t| t.uuid == uuid)
            .ok_or_else(|| RegistryError::UnknownTask(uuid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use odm_core::DataType;

    use super::*;

    fn uuids(remote: &[RemoteTask]) -> Vec<String> {
        remote.iter().map(|r| r.uuid.clone()).collect()
    }

    fn remote(uuid: &str, name: &str, status: TaskStatus) -> RemoteTask {
        RemoteTask {
            uuid: uuid.into(),
            name: name.into(),
            status,
            created_at: None,
        }
    }

    #[test]
    fn open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TaskRegistry::open(dir.path().join(".odm-tasks.json"), "REQ-1").unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".odm-tasks.json");

        let mut registry = TaskRegistry::open(&path, "REQ-1").unwrap();
        registry.record(TaskTracker::new("u-1", "REQ-1", DataType::Rgb));
        registry.update_status("u-1", TaskStatus::Completed).unwrap();
        registry.set_output("u-1", dir.path().join("outputs/rgb")).unwrap();
        registry.save().unwrap();

        assert!(!dir.path().join(".odm-tasks.json.tmp").exists());

        let reopened = TaskRegistry::open(&path, "REQ-1").unwrap();
        let tracker = reopened.get_by_name("REQ-1_rgb").unwrap();
        assert_eq!(tracker.uuid, "u-1");
        assert_eq!(tracker.status, TaskStatus::Completed);
        assert!(tracker.output_path.as_ref().unwrap().ends_with("outputs/rgb"));
    }

    #[test]
    fn open_rejects_other_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".odm-tasks.json");
        TaskRegistry::open(&path, "REQ-1").unwrap().save().unwrap();

        assert_matches!(
            TaskRegistry::open(&path, "REQ-2"),
            Err(RegistryError::RequestMismatch { found, .. }) if found == "REQ-1"
        );
    }

    #[test]
    fn open_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".odm-tasks.json");
        std::fs::write(&path, b"{not json").unwrap();

        assert_matches!(TaskRegistry::open(&path, "REQ-1"), Err(RegistryError::Corrupt { .. }));
    }

    #[test]
    fn unknown_uuid_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TaskRegistry::open(dir.path().join("r.json"), "REQ-1").unwrap();

        assert_matches!(
            registry.update_status("nope", TaskStatus::Failed),
            Err(RegistryError::UnknownTask(uuid)) if uuid == "nope"
        );
        assert!(registry.remove("nope").is_none());
    }

    #[test]
    fn record_replaces_same_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TaskRegistry::open(dir.path().join("r.json"), "REQ-1").unwrap();

        registry.record(TaskTracker::new("old", "REQ-1", DataType::Rgb));
        let previous = registry.record(TaskTracker::new("new", "REQ-1", DataType::Rgb));

        assert_eq!(previous.unwrap().uuid, "old");
        assert_eq!(registry.len(), 1);
        assert!(registry.get("new").is_some());
    }

    #[test]
    fn reconcile_drops_and_adopts() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TaskRegistry::open(dir.path().join("r.json"), "REQ_1").unwrap();
        registry.record(TaskTracker::new("gone", "REQ_1", DataType::Rgb));
        registry.record(TaskTracker::new("kept", "REQ_1", DataType::Thermal));

        let tasks = [
            remote("kept", "REQ_1_thermal", TaskStatus::Running),
            remote("found", "REQ_1_rgb", TaskStatus::Completed),
            remote("other", "REQ_10_rgb", TaskStatus::Queued),
            remote("foreign", "unrelated", TaskStatus::Queued),
        ];
        let outcome = registry.reconcile(&uuids(&tasks), &tasks);

        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(outcome.dropped[0].uuid, "gone");
        assert_eq!(outcome.adopted.len(), 1);
        assert_eq!(outcome.adopted[0].uuid, "found");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("kept").unwrap().status, TaskStatus::Running);
        assert_eq!(registry.get_by_name("REQ_1_rgb").unwrap().uuid, "found");
    }

    #[test]
    fn reconcile_keeps_local_uuid_on_name_clash() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TaskRegistry::open(dir.path().join("r.json"), "REQ-1").unwrap();
        registry.record(TaskTracker::new("mine", "REQ-1", DataType::Rgb));

        let tasks = [
            remote("mine", "REQ-1_rgb", TaskStatus::Queued),
            remote("duplicate", "REQ-1_rgb", TaskStatus::Queued),
        ];
        let outcome = registry.reconcile(&uuids(&tasks), &tasks);

        assert!(outcome.is_empty());
        assert_eq!(registry.get_by_name("REQ-1_rgb").unwrap().uuid, "mine");
    }

    #[test]
    fn reconcile_keeps_listed_task_without_details() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TaskRegistry::open(dir.path().join("r.json"), "REQ-1").unwrap();
        registry.record(TaskTracker::new("listed", "REQ-1", DataType::Rgb));
        registry.update_status("listed", TaskStatus::Running).unwrap();

        let outcome = registry.reconcile(&["listed".to_string()], &[]);

        assert!(outcome.is_empty());
        assert_eq!(registry.get("listed").unwrap().status, TaskStatus::Running);
    }
}
