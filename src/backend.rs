use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::models::{ClosestResponse, ProjectFeatures, UploadedFile};
use crate::popup::ClosestQuery;

/// Errors at the backend boundary. Transport and decode failures stay
/// distinguishable from legitimate empty responses, which are plain
/// `Ok` values.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("unexpected status {0} from backend")]
    Status(u16),

    #[error("malformed backend response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("refusing URL outside the backend: {0}")]
    ForeignUrl(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Typed client for the progress backend. All row-supplied URLs (delete
/// links, graph links) are resolved through `resolve`, which refuses
/// anything that leaves the backend's origin.
#[derive(Clone)]
pub struct Backend {
    base: Url,
    client: reqwest::Client,
}

impl Backend {
    pub fn new(base: Url, client: reqwest::Client) -> Self {
        Backend { base, client }
    }

    pub async fn project_features(
        &self,
        project: Option<&str>,
    ) -> Result<ProjectFeatures, BackendError> {
        let url = self.base.join("activities.geojson")?;
        let mut params = Vec::new();
        if let Some(project) = project {
            params.push(("project".to_string(), project.to_string()));
        }
        self.get_json(url, &params).await
    }

    pub async fn closest_to(&self, query: &ClosestQuery) -> Result<ClosestResponse, BackendError> {
        let url = self.base.join("get_closest_to")?;
        let mut params = vec![
            ("lat".to_string(), query.lat.to_string()),
            ("lng".to_string(), query.lng.to_string()),
            (
                "objType".to_string(),
                query.obj_type.clone().unwrap_or_default(),
            ),
            (
                "objId".to_string(),
                query.obj_id.map(|id| id.to_string()).unwrap_or_default(),
            ),
        ];
        for overlay in &query.overlays {
            params.push(("overlays[]".to_string(), overlay.clone()));
        }
        self.get_json(url, &params).await
    }

    pub async fn uploaded_files(&self) -> Result<Vec<UploadedFile>, BackendError> {
        let url = self.base.join("uploaded_files")?;
        self.get_json(url, &[]).await
    }

    /// Forward a row's delete link. The caller removes the row
    /// optimistically; any response body is ignored.
    pub async fn delete_uploaded(&self, delete_url: &str) -> Result<(), BackendError> {
        let url = self.resolve(delete_url)?;
        let resp = self
            .client
            .post(url)
            .send()
            .await
            .map_err(BackendError::Transport)?;
        if !resp.status().is_success() {
            return Err(BackendError::Status(resp.status().as_u16()));
        }
        Ok(())
    }

    /// Fetch a detail graph image. Returns the bytes and content type;
    /// the caller decides what "no data" looks like.
    pub async fn graph_image(
        &self,
        graph_url: &str,
        width: u32,
        height: u32,
    ) -> Result<(Vec<u8>, String), BackendError> {
        let mut url = self.resolve(graph_url)?;
        url.query_pairs_mut()
            .append_pair("width", &width.to_string())
            .append_pair("height", &height.to_string());

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(BackendError::Transport)?;
        if !resp.status().is_success() {
            return Err(BackendError::Status(resp.status().as_u16()));
        }
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = resp.bytes().await.map_err(BackendError::Transport)?;
        Ok((bytes.to_vec(), content_type))
    }

    /// Fetch an HTML fragment (dashboard dialog, upload form) from the
    /// backend.
    pub async fn fragment(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<String, BackendError> {
        let url = self.base.join(path)?;
        let resp = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(BackendError::Transport)?;
        if !resp.status().is_success() {
            return Err(BackendError::Status(resp.status().as_u16()));
        }
        resp.text().await.map_err(BackendError::Transport)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        params: &[(String, String)],
    ) -> Result<T, BackendError> {
        let resp = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(BackendError::Transport)?;
        if !resp.status().is_success() {
            return Err(BackendError::Status(resp.status().as_u16()));
        }
        resp.json().await.map_err(BackendError::Decode)
    }

    /// Resolve a possibly-relative URL against the backend base, refusing
    /// anything that ends up on a different origin.
    pub fn resolve(&self, raw: &str) -> Result<Url, BackendError> {
        let url = self.base.join(raw)?;
        if url.origin() != self.base.origin() {
            return Err(BackendError::ForeignUrl(raw.to_string()));
        }
        Ok(url)
    }
}
