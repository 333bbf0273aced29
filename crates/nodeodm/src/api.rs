//! REST API client for a NodeODM node.
//!
//! Wraps the task lifecycle endpoints (create, inspect, cancel, remove,
//! download) using [`reqwest`]. Every request carries the node token as
//! a `token` query parameter.

use std::path::{Path, PathBuf};

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

use crate::archive::extract_zip;
use crate::config::NodeOdmConfig;
use crate::error::NodeOdmError;
use crate::messages::{
    CreateTaskResponse, NodeInfo, SuccessResponse, TaskInfo, TaskListEntry,
};
use crate::options::ProcessingOptions;

/// Name of the temporary archive written next to extracted results.
const ARCHIVE_NAME: &str = "all.zip";

/// HTTP client for a single NodeODM node.
#[derive(Clone)]
pub struct NodeOdmApi {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl NodeOdmApi {
    /// Create a new API client for a NodeODM node.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:3000`.
    /// * `token`   - Node access token (may be empty).
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, token)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn from_config(config: &NodeOdmConfig) -> Self {
        Self::new(config.url(), config.token.clone())
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Node version and load (`GET /info`).
    pub async fn info(&self) -> Result<NodeInfo, NodeOdmError> {
        let response = self.get("info").send().await?;
        Self::parse_response(response).await
    }

    /// UUIDs of every task known to the node (`GET /task/list`).
    pub async fn task_list(&self) -> Result<Vec<String>, NodeOdmError> {
        let response = self.get("task/list").send().await?;
        let entries: Vec<TaskListEntry> = Self::parse_response(response).await?;
        Ok(entries.into_iter().map(|e| e.uuid).collect())
    }

    /// Status, progress and metadata of one task (`GET /task/{uuid}/info`).
    pub async fn task_info(&self, uuid: &str) -> Result<TaskInfo, NodeOdmError> {
        let response = self.get(&format!("task/{uuid}/info")).send().await?;
        Self::parse_response(response).await
    }

    /// Upload images and start a new task (`POST /task/new`).
    ///
    /// Images are streamed from disk, one `images` part per file.
    /// Returns the server-assigned task UUID.
    pub async fn create_task(
        &self,
        images: &[PathBuf],
        name: &str,
        options: &ProcessingOptions,
    ) -> Result<String, NodeOdmError> {
        let mut form = Form::new()
            .text("name", name.to_string())
            .text("options", options.to_form_value());

        for image in images {
            form = form.part("images", Self::file_part(image).await?);
        }

        tracing::debug!(name, image_count = images.len(), "Uploading task images");

        let response = self
            .client
            .post(self.url("task/new"))
            .query(&[("token", &self.token)])
            .multipart(form)
            .send()
            .await?;

        let created: CreateTaskResponse = Self::parse_response(response).await?;
        Ok(created.uuid)
    }

    /// Cancel a queued or running task (`POST /task/cancel`).
    pub async fn cancel_task(&self, uuid: &str) -> Result<bool, NodeOdmError> {
        self.post_uuid("task/cancel", uuid).await
    }

    /// Remove a task and its data from the node (`POST /task/remove`).
    pub async fn remove_task(&self, uuid: &str) -> Result<bool, NodeOdmError> {
        self.post_uuid("task/remove", uuid).await
    }

    /// Download the `all.zip` results of a completed task and extract
    /// them into `dest`.
    ///
    /// The archive is streamed to `dest/all.zip`, extracted, then removed.
    /// Returns `dest`.
    pub async fn download_results(&self, uuid: &str, dest: &Path) -> Result<PathBuf, NodeOdmError> {
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| NodeOdmError::io(dest, e))?;

        let mut response = Self::ensure_success(
            self.get(&format!("task/{uuid}/download/{ARCHIVE_NAME}"))
                .send()
                .await?,
        )
        .await?;

        let zip_path = dest.join(ARCHIVE_NAME);
        let mut file = tokio::fs::File::create(&zip_path)
            .await
            .map_err(|e| NodeOdmError::io(&zip_path, e))?;

        let mut bytes = 0u64;
        while let Some(chunk) = response.chunk().await? {
            bytes += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| NodeOdmError::io(&zip_path, e))?;
        }
        file.flush().await.map_err(|e| NodeOdmError::io(&zip_path, e))?;
        drop(file);

        tracing::debug!(task_id = uuid, bytes, "Result archive downloaded");

        let archive = zip_path.clone();
        let target = dest.to_path_buf();
        let written = tokio::task::spawn_blocking(move || extract_zip(&archive, &target))
            .await
            .map_err(|e| NodeOdmError::Archive(format!("extraction task failed: {e}")))??;

        tokio::fs::remove_file(&zip_path)
            .await
            .map_err(|e| NodeOdmError::io(&zip_path, e))?;

        tracing::info!(task_id = uuid, files = written, dest = %dest.display(), "Results extracted");
        Ok(dest.to_path_buf())
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .query(&[("token", &self.token)])
    }

    async fn post_uuid(&self, path: &str, uuid: &str) -> Result<bool, NodeOdmError> {
        let response = self
            .client
            .post(self.url(path))
            .query(&[("token", &self.token)])
            .form(&[("uuid", uuid)])
            .send()
            .await?;

        let result: SuccessResponse = Self::parse_response(response).await?;
        Ok(result.success)
    }

    async fn file_part(path: &Path) -> Result<Part, NodeOdmError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| NodeOdmError::io(path, e))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| NodeOdmError::io(path, e))?
            .len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        Ok(Part::stream_with_length(file, length).file_name(file_name))
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`NodeOdmError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, NodeOdmError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(NodeOdmError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    ///
    /// NodeODM reports many failures as `200 {"error": "..."}`; those
    /// become [`NodeOdmError::Engine`].
    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, NodeOdmError> {
        let response = Self::ensure_success(response).await?;
        let value: serde_json::Value = response.json().await?;

        if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
            return Err(NodeOdmError::Engine(message.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }
}
