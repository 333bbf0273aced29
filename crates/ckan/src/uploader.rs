//! CKAN action API client.
//!
//! One package per request holds the results of every datatype: the
//! package is looked up by request code and created on first upload,
//! then each result file becomes a resource of it.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use odm_core::naming::resource_name;
use odm_core::types::DatatypeId;
use odm_core::{ProcessingRequest, ResultFiles};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::auth::KeycloakAuthenticator;
use crate::config::CkanConfig;
use crate::error::CkanError;
use crate::metadata::{MetadataInspire, ResourceCreateRequest};

/// Envelope of every CKAN action response.
#[derive(Debug, Deserialize)]
struct ActionResponse<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    results: Vec<EntityRef>,
}

#[derive(Debug, Deserialize)]
struct EntityRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ResourceRef {
    url: String,
}

/// Where the results of one datatype ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedDataset {
    pub dataset_id: String,
    pub urls: Vec<String>,
}

/// Uploads task results to the data lake.
pub struct CkanUploader {
    client: reqwest::Client,
    config: CkanConfig,
    auth: KeycloakAuthenticator,
    /// Package id per request code, so concurrent datatype uploads of
    /// one request share a package.
    packages: Mutex<HashMap<String, String>>,
}

impl CkanUploader {
    pub fn new(config: CkanConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: CkanConfig) -> Self {
        let auth = KeycloakAuthenticator::new(client.clone(), config.auth.clone());
        Self {
            client,
            config,
            auth,
            packages: Mutex::new(HashMap::new()),
        }
    }

    pub fn authenticator(&self) -> &KeycloakAuthenticator {
        &self.auth
    }

    /// Upload the result files of one datatype of `request`.
    pub async fn upload_results(
        &self,
        request: &ProcessingRequest,
        datatype_id: DatatypeId,
        results: &ResultFiles,
    ) -> Result<UploadedDataset, CkanError> {
        let files = results.files();
        if files.is_empty() {
            return Err(CkanError::NothingToUpload(request.request_id.clone()));
        }

        let dataset_id = self.ensure_package(request).await?;

        let mut urls = Vec::with_capacity(files.len());
        for file in files {
            let url = self
                .upload_resource(&dataset_id, file, request, datatype_id)
                .await?;
            tracing::info!(
                request_id = %request.request_id,
                datatype_id,
                dataset_id = %dataset_id,
                url = %url,
                "Resource uploaded"
            );
            urls.push(url);
        }

        Ok(UploadedDataset { dataset_id, urls })
    }

    /// Reuse the package of this request or create it.
    async fn ensure_package(&self, request: &ProcessingRequest) -> Result<String, CkanError> {
        let mut packages = self.packages.lock().await;
        if let Some(id) = packages.get(&request.request_id) {
            return Ok(id.clone());
        }

        let id = match self.find_package(&request.request_id).await? {
            Some(id) => {
                tracing::info!(request_id = %request.request_id, package_id = %id, "Reusing existing package");
                id
            }
            None => {
                let metadata = MetadataInspire::for_request(&self.config, request, Utc::now())?;
                tracing::info!(request_id = %request.request_id, title = %metadata.title, "Creating package");
                self.create_package(&metadata).await?
            }
        };

        packages.insert(request.request_id.clone(), id.clone());
        Ok(id)
    }

    /// First package matching `request_code`, private ones included.
    pub async fn find_package(&self, request_code: &str) -> Result<Option<String>, CkanError> {
        let query = format!("*:*\"{request_code}\"*");
        let builder = self
            .client
            .get(self.config.action_url("package_search"))
            .query(&[("include_private", "true"), ("q", query.as_str())]);

        let found: SearchResult = self.call("package_search", builder).await?;
        Ok(found.results.into_iter().next().map(|p| p.id))
    }

    pub async fn create_package(&self, metadata: &MetadataInspire) -> Result<String, CkanError> {
        let builder = self
            .client
            .post(self.config.action_url("package_create"))
            .json(metadata);

        let created: EntityRef = self.call("package_create", builder).await?;
        Ok(created.id)
    }

    /// Upload one file as a resource of `package_id`; returns its URL.
    pub async fn upload_resource(
        &self,
        package_id: &str,
        path: &Path,
        request: &ProcessingRequest,
        datatype_id: DatatypeId,
    ) -> Result<String, CkanError> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let descriptor = ResourceCreateRequest {
            package_id: package_id.to_string(),
            datatype_resource: datatype_id,
            file_date_start: request.start,
            file_date_end: request.end,
            format: path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
            name: resource_name(
                request.start.date_naive(),
                &stem,
                datatype_id,
                &request.request_id,
                false,
            ),
        };

        let mut form = Form::new();
        for (key, value) in descriptor.form_fields() {
            form = form.text(key, value);
        }
        form = form.part("upload", file_part(path).await?);

        tracing::debug!(file = %path.display(), name = %descriptor.name, "Uploading resource");
        let builder = self
            .client
            .post(self.config.action_url("resource_create"))
            .multipart(form);

        let resource: ResourceRef = self.call("resource_create", builder).await?;
        Ok(resource.url)
    }

    /// Authorize, send and unwrap an action call.
    async fn call<T: DeserializeOwned>(
        &self,
        action: &'static str,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, CkanError> {
        let header = self.auth.authorization_header().await?;
        let response = builder
            .header(reqwest::header::AUTHORIZATION, header)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.auth.invalidate().await;
            }
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(CkanError::Api {
                action,
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ActionResponse<T> = response.json().await?;
        match envelope {
            ActionResponse {
                success: true,
                result: Some(result),
                ..
            } => Ok(result),
            ActionResponse { error, .. } => Err(CkanError::Action {
                action,
                message: error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no result".to_string()),
            }),
        }
    }
}

async fn file_part(path: &Path) -> Result<Part, CkanError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| CkanError::io(path, e))?;
    let length = file
        .metadata()
        .await
        .map_err(|e| CkanError::io(path, e))?
        .len();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(Part::stream_with_length(file, length).file_name(file_name))
}
