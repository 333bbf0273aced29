//! Command-level entry points.
//!
//! Each method runs one CLI command to completion and folds every error
//! into an [`ExitCode`]; errors are logged here, not returned.

use std::path::{Path, PathBuf};

use odm_core::{ProcessingRequest, RequestLayout, TaskStatus};
use odm_nodeodm::{ProcessingOptions, TaskInfo};

use crate::error::PipelineError;
use crate::preprocess::Preprocessor;
use crate::processor::{task_datatype, Processor};

/// Process exit status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
    /// Interrupted by a shutdown signal.
    Cancelled = 2,
}

impl ExitCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code())
    }
}

/// Arguments of the `process` command.
#[derive(Debug, Clone)]
pub struct ProcessArgs {
    pub request_path: PathBuf,
    pub dry_run: bool,
    pub skip_preprocess: bool,
    pub force_preprocess: bool,
    pub frame_step: usize,
    pub options: ProcessingOptions,
}

impl ProcessArgs {
    pub fn new(request_path: impl Into<PathBuf>) -> Self {
        Self {
            request_path: request_path.into(),
            dry_run: false,
            skip_preprocess: false,
            force_preprocess: false,
            frame_step: 1,
            options: ProcessingOptions::default(),
        }
    }
}

pub struct ProcessingService {
    processor: Processor,
}

impl ProcessingService {
    pub fn new(processor: Processor) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    /// `process`: validate, preprocess, then run the request on the node.
    pub async fn handle_request(&self, args: &ProcessArgs) -> ExitCode {
        match self.try_handle_request(args).await {
            Ok(code) => code,
            Err(e) => exit_code_for(&e, "Request processing failed"),
        }
    }

    async fn try_handle_request(&self, args: &ProcessArgs) -> Result<ExitCode, PipelineError> {
        let layout = RequestLayout::new(&args.request_path);
        layout.validate()?;
        let request = ProcessingRequest::from_file(&layout.request_file())?;
        tracing::info!(
            request_id = %request.request_id,
            situation_id = %request.situation_id,
            datatypes = ?request.datatype_ids,
            path = %layout.root().display(),
            "Loaded processing request"
        );

        let data_root = if args.skip_preprocess {
            tracing::info!("Preprocessing skipped, submitting original images");
            Some(layout.root().to_path_buf())
        } else {
            self.preprocess(&layout, &request, args).await?
        };

        let Some(data_root) = data_root else {
            return Ok(ExitCode::Success);
        };
        if args.dry_run {
            tracing::info!(request_id = %request.request_id, "Dry run, request is valid");
            return Ok(ExitCode::Success);
        }

        self.processor.check_node().await?;
        let outcome = self
            .processor
            .process_request(&request, &data_root, &args.options)
            .await?;

        if outcome.is_success() {
            Ok(ExitCode::Success)
        } else {
            tracing::error!(
                request_id = %request.request_id,
                completed = outcome.completed,
                failed = outcome.failed,
                "Request finished with failures"
            );
            Ok(ExitCode::Failure)
        }
    }

    /// Run preprocessing when needed and return the image root to submit.
    ///
    /// On a dry run nothing is written; `None` is returned once the
    /// decision has been logged.
    async fn preprocess(
        &self,
        layout: &RequestLayout,
        request: &ProcessingRequest,
        args: &ProcessArgs,
    ) -> Result<Option<PathBuf>, PipelineError> {
        let layout = layout.clone();
        let request = request.clone();
        let (dry_run, force, frame_step) = (args.dry_run, args.force_preprocess, args.frame_step);

        tokio::task::spawn_blocking(move || -> Result<Option<PathBuf>, PipelineError> {
            let preprocessor = Preprocessor::new(layout, &request, frame_step);
            if dry_run {
                let needed = force || preprocessor.is_needed(false)?;
                tracing::info!(needed, "Dry run, preprocessing decision");
                return Ok(None);
            }
            if preprocessor.is_needed(force)? {
                preprocessor.run()?;
            } else {
                tracing::info!("Preprocessing already complete, reusing output");
            }
            Ok(Some(preprocessor.processed_dir()))
        })
        .await
        .map_err(|e| PipelineError::Preprocess(format!("preprocessing task failed: {e}")))?
    }

    /// `list`: print matching node tasks, one per line.
    pub async fn list_tasks(&self, request_path: Option<&Path>, statuses: &[TaskStatus]) -> ExitCode {
        let request = match load_request(request_path) {
            Ok(request) => request,
            Err(e) => return exit_code_for(&e, "Listing tasks failed"),
        };
        let request_id = request.as_ref().map(|r| r.request_id.as_str());

        match self.processor.list_tasks(request_id, statuses).await {
            Ok(tasks) => {
                if tasks.is_empty() {
                    tracing::info!("No matching tasks");
                }
                for task in &tasks {
                    println!("{}", task_line(task));
                }
                ExitCode::Success
            }
            Err(e) => exit_code_for(&e, "Listing tasks failed"),
        }
    }

    /// `cleanup`: remove matching node tasks.
    pub async fn cleanup_tasks(
        &self,
        request_path: Option<&Path>,
        statuses: &[TaskStatus],
        dry_run: bool,
    ) -> ExitCode {
        let request = match load_request(request_path) {
            Ok(request) => request,
            Err(e) => return exit_code_for(&e, "Cleanup failed"),
        };

        match self
            .processor
            .clear_tasks(request.as_ref(), statuses, dry_run)
            .await
        {
            Ok(count) => {
                tracing::info!(count, dry_run, "Cleanup finished");
                ExitCode::Success
            }
            Err(e) => exit_code_for(&e, "Cleanup failed"),
        }
    }
}

fn load_request(path: Option<&Path>) -> Result<Option<ProcessingRequest>, PipelineError> {
    path.map(|p| ProcessingRequest::from_dir(p).map_err(PipelineError::from))
        .transpose()
}

fn exit_code_for(error: &PipelineError, context: &str) -> ExitCode {
    if error.is_cancelled() {
        tracing::warn!("Interrupted by shutdown request");
        ExitCode::Cancelled
    } else {
        tracing::error!(error = %error, "{context}");
        ExitCode::Failure
    }
}

/// `uuid  name  status  progress  created-at`
pub fn task_line(task: &TaskInfo) -> String {
    let status = task
        .status()
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("code {}", task.status.code));
    let created = task
        .created_at()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    let datatype = task_datatype(task).map(|d| d.name()).unwrap_or("-");
    format!(
        "{}  {:<32}  {:<9}  {:>3}%  {}  [{}]",
        task.uuid,
        task.name,
        status,
        task.progress_percent(),
        created,
        datatype
    )
}
