//! Remote task lifecycle for one request.
//!
//! [`Processor::process_request`] drives a request through
//! create-or-adopt, monitoring, and result collection. The local
//! [`TaskRegistry`] is reconciled with the node first, so running the
//! same request twice re-attaches to the tasks already submitted instead
//! of uploading the images again.
//!
//! Shutdown is signalled through a [`CancellationToken`]. Whether the
//! remote tasks are cancelled with it depends on
//! [`NodeOdmConfig::cancel_on_shutdown`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use odm_ckan::{CkanUploader, UploadedDataset};
use odm_core::naming::{belongs_to, parse_task_name, task_name};
use odm_core::types::DatatypeId;
use odm_core::{DataType, ProcessingRequest, RequestLayout, TaskStatus};
use odm_events::notifier::DEFAULT_END_MESSAGE;
use odm_events::Notifier;
use odm_nodeodm::retry::{with_backoff, RetryConfig};
use odm_nodeodm::{NodeInfo, NodeOdmApi, NodeOdmConfig, NodeOdmError, ProcessingOptions, TaskInfo};
use odm_registry::{RemoteTask, TaskRegistry, TaskTracker};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

pub const CANCELLED_BY_USER_MESSAGE: &str = "Task cancelled by user";

/// Result of processing one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutcome {
    /// Tasks whose results were uploaded.
    pub completed: usize,
    /// Tasks that failed, were canceled, or whose results could not be
    /// collected.
    pub failed: usize,
    pub datasets: Vec<UploadedDataset>,
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.completed > 0
    }
}

/// Drives NodeODM tasks and hands their results to the data lake.
pub struct Processor {
    api: NodeOdmApi,
    node: NodeOdmConfig,
    notifier: Notifier,
    uploader: Arc<CkanUploader>,
    cancel: CancellationToken,
    retry: RetryConfig,
}

impl Processor {
    pub fn new(
        api: NodeOdmApi,
        node: NodeOdmConfig,
        notifier: Notifier,
        uploader: Arc<CkanUploader>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            node,
            notifier,
            uploader,
            cancel,
            retry: RetryConfig::default(),
        }
    }

    /// Override the backoff used for idempotent node calls.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Make sure the node answers before anything is submitted.
    pub async fn check_node(&self) -> Result<NodeInfo, PipelineError> {
        let info = with_backoff("info", &self.retry, &self.cancel, || self.api.info())
            .await
            .map_err(|e| match e {
                NodeOdmError::Cancelled => PipelineError::Cancelled,
                other => PipelineError::NodeUnavailable(other),
            })?;
        tracing::info!(
            url = %self.api.api_url(),
            version = %info.version,
            engine = %info.engine,
            engine_version = %info.engine_version,
            queue = info.task_queue_count,
            "NodeODM node available"
        );
        Ok(info)
    }

    /// Submit (or re-attach to) one task per requested datatype, wait for
    /// them, then download and upload their results.
    ///
    /// `data_root` holds the per-datatype image directories, either the
    /// request directory itself or its `processed/` output.
    pub async fn process_request(
        &self,
        request: &ProcessingRequest,
        data_root: &Path,
        options: &ProcessingOptions,
    ) -> Result<ProcessOutcome, PipelineError> {
        let layout = RequestLayout::new(request.path());
        let mut registry = TaskRegistry::open(layout.registry_file(), &request.request_id)?;

        let node_tasks = self.node_tasks().await?;
        let remote: Vec<RemoteTask> = node_tasks.details.iter().filter_map(remote_task).collect();
        let reconciliation = registry.reconcile(&node_tasks.listed, &remote);
        if !reconciliation.is_empty() {
            tracing::info!(
                request_id = %request.request_id,
                dropped = reconciliation.dropped.len(),
                adopted = reconciliation.adopted.len(),
                "Registry reconciled with node"
            );
        }
        registry.save()?;

        let mut tracked = Vec::new();
        let result = self
            .run(request, &layout, data_root, options, &mut registry, &mut tracked)
            .await;

        let result = match result {
            Err(e) if e.is_cancelled() => {
                self.cancel_tasks(request, &mut registry, &tracked).await;
                Err(PipelineError::Cancelled)
            }
            other => other,
        };
        registry.save()?;
        result
    }

    async fn run(
        &self,
        request: &ProcessingRequest,
        layout: &RequestLayout,
        data_root: &Path,
        options: &ProcessingOptions,
        registry: &mut TaskRegistry,
        tracked: &mut Vec<String>,
    ) -> Result<ProcessOutcome, PipelineError> {
        self.create_tasks(request, data_root, options, registry, tracked)
            .await?;
        if tracked.is_empty() {
            return Err(PipelineError::NoTasks);
        }

        self.monitor(request, registry, tracked).await?;

        let trackers: Vec<TaskTracker> = tracked
            .iter()
            .filter_map(|uuid| registry.get(uuid).cloned())
            .collect();
        let outcome = self.collect(request, layout, registry, trackers).await?;

        tracing::info!(
            request_id = %request.request_id,
            completed = outcome.completed,
            failed = outcome.failed,
            "Request processed"
        );
        Ok(outcome)
    }

    /// Create a task for every requested datatype that has none yet.
    async fn create_tasks(
        &self,
        request: &ProcessingRequest,
        data_root: &Path,
        options: &ProcessingOptions,
        registry: &mut TaskRegistry,
        tracked: &mut Vec<String>,
    ) -> Result<(), PipelineError> {
        let datatypes = request.datatypes()?;
        let groups = RequestLayout::datatype_groups(data_root, &datatypes)?;

        for datatype in datatypes {
            let name = task_name(&request.request_id, datatype);
            if let Some(existing) = registry.get_by_name(&name) {
                tracing::info!(
                    task_id = %existing.uuid,
                    name = %name,
                    status = %existing.status,
                    "Reusing existing task"
                );
                tracked.push(existing.uuid.clone());
                continue;
            }

            let Some(group) = groups.iter().find(|g| g.datatype == datatype) else {
                continue;
            };

            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            tracing::info!(
                name = %name,
                images = group.images.len(),
                quality = %options.quality.as_str(),
                "Creating task"
            );
            // Neither retried nor interrupted: the node may create the task
            // before answering, and its uuid must reach the registry.
            let uuid = self.api.create_task(&group.images, &name, options).await?;
            tracing::info!(task_id = %uuid, name = %name, "Task created");

            registry.record(TaskTracker::new(&uuid, &request.request_id, datatype));
            registry.save()?;
            tracked.push(uuid);
            self.notifier
                .send_task_start(&request.request_id, datatype.id());

            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
        }
        Ok(())
    }

    /// Poll until every tracked task is terminal or the poll budget is spent.
    async fn monitor(
        &self,
        request: &ProcessingRequest,
        registry: &mut TaskRegistry,
        tracked: &[String],
    ) -> Result<(), PipelineError> {
        let mut failed_polls = 0u32;

        loop {
            let pending: Vec<&TaskTracker> = tracked
                .iter()
                .filter_map(|uuid| registry.get(uuid))
                .filter(|t| t.status.is_active())
                .collect();
            if pending.is_empty() {
                tracing::info!(request_id = %request.request_id, "All tasks finished");
                return Ok(());
            }
            let pending: Vec<(String, DatatypeId)> = pending
                .into_iter()
                .map(|t| (t.uuid.clone(), t.datatype_id))
                .collect();

            let mut poll_failed = false;
            for (uuid, datatype_id) in pending {
                let info = tokio::select! {
                    _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                    info = self.api.task_info(&uuid) => info,
                };
                let (info, status) = match info.and_then(|i| i.status().map(|s| (i, s))) {
                    Ok(polled) => polled,
                    Err(e) => {
                        tracing::warn!(task_id = %uuid, error = %e, "Status poll failed");
                        poll_failed = true;
                        continue;
                    }
                };

                let previous = registry.get(&uuid).map(|t| t.status);
                if previous != Some(status) {
                    tracing::info!(
                        task_id = %uuid,
                        from = ?previous,
                        to = %status,
                        "Task status changed"
                    );
                    registry.update_status(&uuid, status)?;
                }
                self.announce(request, datatype_id, &info, status);
            }

            if poll_failed {
                failed_polls += 1;
                if failed_polls >= self.node.poll_retries {
                    tracing::error!(
                        request_id = %request.request_id,
                        failed_polls,
                        "Too many failed status polls, giving up monitoring"
                    );
                    return Ok(());
                }
            }
            registry.save()?;

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = tokio::time::sleep(self.node.poll_interval()) => {}
            }
        }
    }

    fn announce(&self, request: &ProcessingRequest, datatype_id: DatatypeId, info: &TaskInfo, status: TaskStatus) {
        let request_id = &request.request_id;
        match status {
            TaskStatus::Queued => self.notifier.send_task_update(request_id, datatype_id, "Task queued"),
            TaskStatus::Running => self.notifier.send_task_update(
                request_id,
                datatype_id,
                format!("Processing: {}%", info.progress_percent()),
            ),
            TaskStatus::Canceled => {
                self.notifier
                    .send_task_end(request_id, datatype_id, "Task canceled on the node")
            }
            // Reported once results are collected.
            TaskStatus::Completed | TaskStatus::Failed => {}
        }
    }

    /// Download and upload the results of every tracked task.
    async fn collect(
        &self,
        request: &ProcessingRequest,
        layout: &RequestLayout,
        registry: &mut TaskRegistry,
        trackers: Vec<TaskTracker>,
    ) -> Result<ProcessOutcome, PipelineError> {
        let results: Vec<(String, Result<(PathBuf, UploadedDataset), PipelineError>)> =
            stream::iter(trackers)
                .map(|tracker| async move {
                    let result = self.collect_one(request, layout, &tracker).await;
                    (tracker.uuid, result)
                })
                .buffer_unordered(self.node.max_concurrent_tasks.max(1))
                .collect()
                .await;

        let mut outcome = ProcessOutcome::default();
        let mut cancelled = false;
        for (uuid, result) in results {
            match result {
                Ok((output, dataset)) => {
                    registry.set_output(&uuid, output)?;
                    outcome.completed += 1;
                    outcome.datasets.push(dataset);
                }
                Err(e) if e.is_cancelled() => cancelled = true,
                Err(e) => {
                    tracing::error!(task_id = %uuid, error = %e, "Task did not produce results");
                    outcome.failed += 1;
                }
            }
        }
        if cancelled {
            return Err(PipelineError::Cancelled);
        }
        Ok(outcome)
    }

    async fn collect_one(
        &self,
        request: &ProcessingRequest,
        layout: &RequestLayout,
        tracker: &TaskTracker,
    ) -> Result<(PathBuf, UploadedDataset), PipelineError> {
        let request_id = &request.request_id;
        let datatype = tracker.datatype()?;
        let datatype_id = datatype.id();

        match tracker.status {
            TaskStatus::Completed => {}
            TaskStatus::Failed => {
                self.notifier
                    .send_task_error(request_id, datatype_id, "ODM Task failed");
                return Err(PipelineError::NodeOdm(NodeOdmError::Engine(format!(
                    "task {} failed",
                    tracker.uuid
                ))));
            }
            other => {
                return Err(PipelineError::NodeOdm(NodeOdmError::Engine(format!(
                    "task {} ended {other}",
                    tracker.uuid
                ))));
            }
        }

        let output = layout.output_dir(datatype);
        tracing::info!(task_id = %tracker.uuid, dest = %output.display(), "Downloading results");
        let downloaded = with_backoff("download_results", &self.retry, &self.cancel, || {
            self.api.download_results(&tracker.uuid, &output)
        })
        .await;
        if let Err(e) = downloaded {
            if !matches!(e, NodeOdmError::Cancelled) {
                self.notifier
                    .send_task_error(request_id, datatype_id, "Result download failed");
            }
            return Err(e.into());
        }

        let Some(files) = RequestLayout::find_result_files(&output) else {
            self.notifier
                .send_task_error(request_id, datatype_id, "Missing result files");
            return Err(PipelineError::MissingResults(output));
        };

        match self.uploader.upload_results(request, datatype_id, &files).await {
            Ok(dataset) => {
                self.notifier
                    .send_task_end(request_id, datatype_id, DEFAULT_END_MESSAGE);
                Ok((output, dataset))
            }
            Err(e) => {
                self.notifier
                    .send_task_error(request_id, datatype_id, "Data upload failed");
                Err(e.into())
            }
        }
    }

    /// Handle a shutdown request for the tasks of this run.
    async fn cancel_tasks(&self, request: &ProcessingRequest, registry: &mut TaskRegistry, tracked: &[String]) {
        let active: Vec<TaskTracker> = tracked
            .iter()
            .filter_map(|uuid| registry.get(uuid))
            .filter(|t| t.status.is_active())
            .cloned()
            .collect();
        if active.is_empty() {
            return;
        }

        if !self.node.cancel_on_shutdown {
            tracing::warn!(
                request_id = %request.request_id,
                tasks = active.len(),
                "Letting tasks run on the node, rerun the request to resume"
            );
            return;
        }

        for tracker in active {
            // The shutdown token is already cancelled, so call directly.
            match self.api.cancel_task(&tracker.uuid).await {
                Ok(_) => {
                    tracing::info!(task_id = %tracker.uuid, name = %tracker.name, "Task cancelled");
                    if let Err(e) = registry.update_status(&tracker.uuid, TaskStatus::Canceled) {
                        tracing::warn!(task_id = %tracker.uuid, error = %e, "Could not record cancellation");
                    }
                    self.notifier.send_task_end(
                        &request.request_id,
                        tracker.datatype_id,
                        CANCELLED_BY_USER_MESSAGE,
                    );
                }
                Err(e) => {
                    tracing::error!(task_id = %tracker.uuid, error = %e, "Failed to cancel task");
                }
            }
        }
    }

    /// Every task on the node, with its details.
    ///
    /// Tasks whose details cannot be fetched are skipped.
    pub async fn remote_tasks(&self) -> Result<Vec<TaskInfo>, PipelineError> {
        Ok(self.node_tasks().await?.details)
    }

    async fn node_tasks(&self) -> Result<NodeTasks, PipelineError> {
        let listed = with_backoff("task_list", &self.retry, &self.cancel, || self.api.task_list()).await?;

        let mut details = Vec::with_capacity(listed.len());
        for uuid in &listed {
            match with_backoff("task_info", &self.retry, &self.cancel, || self.api.task_info(uuid)).await {
                Ok(info) => details.push(info),
                Err(NodeOdmError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => tracing::warn!(task_id = %uuid, error = %e, "Skipping task without details"),
            }
        }
        Ok(NodeTasks { listed, details })
    }

    /// Tasks on the node, optionally restricted to one request and to
    /// the given statuses (empty means any).
    pub async fn list_tasks(
        &self,
        request_id: Option<&str>,
        statuses: &[TaskStatus],
    ) -> Result<Vec<TaskInfo>, PipelineError> {
        let tasks = self.remote_tasks().await?;
        Ok(tasks
            .into_iter()
            .filter(|info| request_id.map_or(true, |id| belongs_to(&info.name, id)))
            .filter(|info| {
                statuses.is_empty()
                    || info.status().is_ok_and(|status| statuses.contains(&status))
            })
            .collect())
    }

    /// Remove matching tasks from the node.
    ///
    /// With a request, its registry drops the removed entries as well.
    /// Returns the number of tasks removed (or that would be, on a dry run).
    pub async fn clear_tasks(
        &self,
        request: Option<&ProcessingRequest>,
        statuses: &[TaskStatus],
        dry_run: bool,
    ) -> Result<usize, PipelineError> {
        let request_id = request.map(|r| r.request_id.as_str());
        let tasks = self.list_tasks(request_id, statuses).await?;

        if dry_run {
            for task in &tasks {
                tracing::info!(task_id = %task.uuid, name = %task.name, "Would remove task");
            }
            return Ok(tasks.len());
        }

        let mut registry = request
            .map(|r| {
                TaskRegistry::open(
                    RequestLayout::new(r.path()).registry_file(),
                    &r.request_id,
                )
            })
            .transpose()?;

        let mut removed = 0;
        for task in &tasks {
            match with_backoff("remove_task", &self.retry, &self.cancel, || {
                self.api.remove_task(&task.uuid)
            })
            .await
            {
                Ok(_) => {
                    tracing::info!(task_id = %task.uuid, name = %task.name, "Task removed");
                    if let Some(registry) = registry.as_mut() {
                        registry.remove(&task.uuid);
                    }
                    removed += 1;
                }
                Err(NodeOdmError::Cancelled) => break,
                Err(e) => tracing::error!(task_id = %task.uuid, error = %e, "Failed to remove task"),
            }
        }

        if let Some(registry) = registry {
            registry.save()?;
        }
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(removed)
    }
}

/// The node's task listing.
struct NodeTasks {
    /// Every uuid in `GET /task/list`.
    listed: Vec<String>,
    /// Details of the listed tasks that answered.
    details: Vec<TaskInfo>,
}

/// Registry view of a node task; `None` for unknown status codes.
fn remote_task(info: &TaskInfo) -> Option<RemoteTask> {
    let status = info.status().ok()?;
    Some(RemoteTask {
        uuid: info.uuid.clone(),
        name: info.name.clone(),
        status,
        created_at: info.created_at(),
    })
}

/// Datatype of a remote task, when its name follows our convention.
pub fn task_datatype(info: &TaskInfo) -> Option<DataType> {
    parse_task_name(&info.name).map(|(_, datatype)| datatype)
}

#[cfg(test)]
mod tests {
    use odm_nodeodm::messages::TaskStatusInfo;

    use super::*;

    fn info(name: &str, code: u16) -> TaskInfo {
        TaskInfo {
            uuid: "u-1".into(),
            name: name.into(),
            date_created: 1_720_000_000_000,
            processing_time: -1,
            status: TaskStatusInfo {
                code,
                error_message: None,
            },
            images_count: 3,
            progress: 0.0,
        }
    }

    #[test]
    fn unknown_status_is_not_reconciled() {
        assert!(remote_task(&info("REQ_rgb", 99)).is_none());

        let remote = remote_task(&info("REQ_rgb", 20)).unwrap();
        assert_eq!(remote.status, TaskStatus::Running);
        assert!(remote.created_at.is_some());
    }

    #[test]
    fn datatype_from_task_name() {
        assert_eq!(task_datatype(&info("REQ_7_thermal", 10)), Some(DataType::Thermal));
        assert_eq!(task_datatype(&info("someone-else", 10)), None);
    }

    #[test]
    fn outcome_requires_a_completed_task() {
        assert!(!ProcessOutcome::default().is_success());
        let outcome = ProcessOutcome {
            completed: 1,
            failed: 1,
            datasets: Vec::new(),
        };
        assert!(!outcome.is_success());
    }
}
