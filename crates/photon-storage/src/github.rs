//! GitHub repository backend
//!
//! Objects are files in a repository branch, addressed through the REST
//! contents API. The configured `path` is the provider's scope: keys are
//! joined onto it before every call and stripped from listings.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::{GitHubConfig, SecretString};
use crate::keys::{self, join_segments};
use crate::media::ImageFilter;
use crate::traits::{
    ListProgress, ProgressCallback, StorageError, StorageObject, StorageProvider, StorageResult,
    UploadOptions,
};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const RAW_BASE: &str = "https://raw.githubusercontent.com";
const DEFAULT_BRANCH: &str = "main";
const USER_AGENT: &str = concat!("photon-storage/", env!("CARGO_PKG_VERSION"));

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
    #[serde(default)]
    size: Option<u64>,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    content: WrittenContent,
}

#[derive(Debug, Deserialize)]
struct WrittenContent {
    path: String,
    sha: String,
    size: u64,
}

/// GitHub storage provider
pub struct GitHubProvider {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    token: Option<SecretString>,
    path: Option<String>,
    use_raw_url: bool,
    filter: ImageFilter,
}

impl GitHubProvider {
    pub fn new(config: GitHubConfig) -> StorageResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| {
                StorageError::ConfigError(format!("Failed to create HTTP client for GitHub: {}", e))
            })?;

        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            owner: config.owner,
            repo: config.repo,
            branch: config.branch.unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            token: config.token,
            path: keys::normalize_path(config.path.as_deref()),
            use_raw_url: config.use_raw_url.unwrap_or(true),
            filter: ImageFilter::default(),
        })
    }

    /// Point API calls at another host (GitHub Enterprise, test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn full_path(&self, key: &str) -> StorageResult<String> {
        let key = keys::validate_key(key)?;
        Ok(join_segments([self.path.as_deref().unwrap_or_default(), key.as_str()]))
    }

    fn relative_key(&self, full_path: &str) -> String {
        keys::strip_prefix(self.path.as_deref().unwrap_or_default(), full_path)
    }

    fn is_in_scope(&self, full_path: &str) -> bool {
        match self.path.as_deref() {
            None => true,
            Some(path) => full_path.starts_with(&format!("{}/", path)),
        }
    }

    fn encode_path(path: &str) -> String {
        path.split('/')
            .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn contents_url(&self, full_path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            self.owner,
            self.repo,
            Self::encode_path(full_path)
        )
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose()),
            None => builder,
        }
    }

    async fn error_from(response: Response, operation: &str) -> StorageError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        StorageError::BackendError(format!("GitHub {} failed: {} - {}", operation, status, body))
    }

    /// Fetch file metadata; `None` when the file does not exist.
    async fn fetch_content(&self, full_path: &str) -> StorageResult<Option<ContentResponse>> {
        let response = self
            .request(self.client.get(self.contents_url(full_path)))
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response, "get contents").await);
        }

        let content = response
            .json::<ContentResponse>()
            .await
            .map_err(|e| StorageError::BackendError(format!("Invalid GitHub response: {}", e)))?;
        Ok(Some(content))
    }

    async fn list_tree(
        &self,
        progress: Option<&ProgressCallback>,
    ) -> StorageResult<Vec<StorageObject>> {
        let start = std::time::Instant::now();
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}",
            self.api_base,
            self.owner,
            self.repo,
            Self::encode_path(&self.branch)
        );

        let response = self
            .request(self.client.get(url))
            .query(&[("recursive", "1")])
            .send()
            .await
            .map_err(|e| StorageError::ListFailed(e.to_string()))?;

        // An empty repository has no tree yet.
        if response.status() == StatusCode::NOT_FOUND || response.status() == StatusCode::CONFLICT
        {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            let err = Self::error_from(response, "list tree").await;
            tracing::error!(
                error = %err,
                owner = %self.owner,
                repo = %self.repo,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "GitHub list failed"
            );
            return Err(StorageError::ListFailed(err.to_string()));
        }

        let tree = response
            .json::<TreeResponse>()
            .await
            .map_err(|e| StorageError::ListFailed(format!("Invalid GitHub response: {}", e)))?;
        // A partial listing would make folder deletes leave files behind.
        if tree.truncated {
            tracing::error!(
                owner = %self.owner,
                repo = %self.repo,
                entries = tree.tree.len(),
                "GitHub tree listing was truncated"
            );
            return Err(StorageError::ListFailed(format!(
                "GitHub tree for {}/{}@{} is too large to list in one request",
                self.owner, self.repo, self.branch
            )));
        }

        let objects: Vec<StorageObject> = tree
            .tree
            .into_iter()
            .filter(|entry| entry.entry_type == "blob" && self.is_in_scope(&entry.path))
            .map(|entry| StorageObject {
                key: self.relative_key(&entry.path),
                size: entry.size.unwrap_or(0),
                last_modified: None,
                etag: Some(entry.sha),
            })
            .collect();

        if let Some(progress) = progress {
            progress(ListProgress {
                current_path: self.path.clone().unwrap_or_default(),
                files_scanned: objects.len(),
                total_files: Some(objects.len()),
            });
        }

        tracing::debug!(
            owner = %self.owner,
            repo = %self.repo,
            count = objects.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GitHub list successful"
        );
        Ok(objects)
    }

    async fn put_content(
        &self,
        full_path: &str,
        data: &[u8],
        sha: Option<String>,
    ) -> StorageResult<WrittenContent> {
        let mut body = json!({
            "message": format!("Upload {}", full_path),
            "content": STANDARD.encode(data),
            "branch": self.branch,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }

        let response = self
            .request(self.client.put(self.contents_url(full_path)))
            .json(&body)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        if !response.status().is_success() {
            let err = Self::error_from(response, "upload").await;
            return Err(StorageError::UploadFailed(err.to_string()));
        }

        let written = response
            .json::<WriteResponse>()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("Invalid GitHub response: {}", e)))?;
        Ok(written.content)
    }

    async fn delete_path(&self, full_path: &str, sha: &str) -> StorageResult<()> {
        let body = json!({
            "message": format!("Delete {}", full_path),
            "sha": sha,
            "branch": self.branch,
        });

        let response = self
            .request(self.client.delete(self.contents_url(full_path)))
            .json(&body)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !response.status().is_success() {
            let err = Self::error_from(response, "delete").await;
            return Err(StorageError::DeleteFailed(err.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for GitHubProvider {
    async fn get_file(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let start = std::time::Instant::now();
        let full_path = self.full_path(key)?;

        let Some(content) = self.fetch_content(&full_path).await? else {
            return Ok(None);
        };

        let inline = content
            .content
            .as_deref()
            .map(|encoded| encoded.replace(['\n', '\r'], ""))
            .filter(|encoded| !encoded.is_empty());

        let bytes = match (inline, content.download_url) {
            (Some(encoded), _) => STANDARD
                .decode(encoded)
                .map(Bytes::from)
                .map_err(|e| StorageError::DownloadFailed(format!("Invalid base64 content: {}", e)))?,
            // Files above the contents API size limit come back without inline content.
            (None, Some(download_url)) => {
                let response = self
                    .request(self.client.get(download_url))
                    .send()
                    .await
                    .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;
                if !response.status().is_success() {
                    let err = Self::error_from(response, "download").await;
                    return Err(StorageError::DownloadFailed(err.to_string()));
                }
                response
                    .bytes()
                    .await
                    .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            }
            (None, None) => Bytes::new(),
        };

        tracing::info!(
            repo = %self.repo,
            key = %full_path,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GitHub download successful"
        );
        Ok(Some(bytes))
    }

    async fn list_images(&self) -> StorageResult<Vec<StorageObject>> {
        let objects = self.list_tree(None).await?;
        Ok(self.filter.apply(objects))
    }

    async fn list_all_files(
        &self,
        progress: Option<&ProgressCallback>,
    ) -> StorageResult<Vec<StorageObject>> {
        self.list_tree(progress).await
    }

    async fn generate_public_url(&self, key: &str) -> StorageResult<String> {
        let full_path = Self::encode_path(&self.full_path(key)?);
        Ok(if self.use_raw_url {
            format!(
                "{}/{}/{}/{}/{}",
                RAW_BASE, self.owner, self.repo, self.branch, full_path
            )
        } else {
            format!(
                "https://github.com/{}/{}/blob/{}/{}?raw=true",
                self.owner, self.repo, self.branch, full_path
            )
        })
    }

    async fn delete_file(&self, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let full_path = self.full_path(key)?;

        let Some(content) = self.fetch_content(&full_path).await? else {
            return Ok(());
        };
        self.delete_path(&full_path, &content.sha).await.map_err(|e| {
            tracing::error!(
                error = %e,
                repo = %self.repo,
                key = %full_path,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "GitHub delete failed"
            );
            e
        })?;

        tracing::info!(
            repo = %self.repo,
            key = %full_path,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GitHub delete successful"
        );
        Ok(())
    }

    async fn delete_folder(&self, prefix: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let prefix = keys::validate_key(prefix)?;
        let objects = self.list_tree(None).await?;

        // Contents API writes are commits on one branch, so they go one at a time.
        let mut deleted = 0usize;
        for object in objects
            .iter()
            .filter(|object| prefix.is_empty() || keys::strip_prefix(&prefix, &object.key) != object.key)
        {
            let full_path = self.full_path(&object.key)?;
            match &object.etag {
                Some(sha) => self.delete_path(&full_path, sha).await?,
                None => self.delete_file(&object.key).await?,
            }
            deleted += 1;
        }

        tracing::info!(
            repo = %self.repo,
            prefix = %prefix,
            deleted,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GitHub folder delete successful"
        );
        Ok(())
    }

    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        _options: UploadOptions,
    ) -> StorageResult<StorageObject> {
        let start = std::time::Instant::now();
        let full_path = self.full_path(key)?;
        if full_path.is_empty() || keys::normalize_key(key).is_empty() {
            return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
        }

        let existing_sha = self.fetch_content(&full_path).await?.map(|c| c.sha);
        let written = self
            .put_content(&full_path, &data, existing_sha)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    repo = %self.repo,
                    key = %full_path,
                    size_bytes = data.len(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "GitHub upload failed"
                );
                e
            })?;

        tracing::info!(
            repo = %self.repo,
            key = %written.path,
            size_bytes = written.size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GitHub upload successful"
        );

        Ok(StorageObject {
            key: self.relative_key(&written.path),
            size: written.size,
            last_modified: Some(chrono::Utc::now()),
            etag: Some(written.sha),
        })
    }

    async fn move_file(
        &self,
        source_key: &str,
        target_key: &str,
        options: UploadOptions,
    ) -> StorageResult<StorageObject> {
        let data = self
            .get_file(source_key)
            .await?
            .ok_or_else(|| StorageError::NotFound(source_key.to_string()))?;
        let moved = self.upload_file(target_key, data, options).await?;
        self.delete_file(source_key).await?;
        Ok(moved)
    }

    fn provider_name(&self) -> &'static str {
        "github"
    }
}
