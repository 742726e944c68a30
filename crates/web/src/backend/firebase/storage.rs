//! Cloud Storage for Firebase REST client.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use super::{FirebaseAuth, error_details};
use crate::backend::{Blob, BlobError, BlobStore, ObjectRef};
use crate::config::FirebaseConfig;

const STORAGE_HOST: &str = "firebasestorage.googleapis.com";

/// Blob store backed by the project's default bucket.
pub struct StorageClient {
    client: reqwest::Client,
    auth: Arc<FirebaseAuth>,
    bucket: String,
}

/// Object metadata returned by uploads and metadata reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    name: String,
    /// Comma-separated list of download tokens.
    #[serde(default)]
    download_tokens: Option<String>,
}

impl ObjectMetadata {
    fn into_object(self) -> ObjectRef {
        let download_token = self
            .download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').next())
            .filter(|t| !t.is_empty())
            .map(str::to_owned);
        ObjectRef {
            path: self.name,
            download_token,
        }
    }
}

impl StorageClient {
    #[must_use]
    pub fn new(client: reqwest::Client, config: &FirebaseConfig, auth: Arc<FirebaseAuth>) -> Self {
        Self {
            client,
            auth,
            bucket: config.storage_bucket.clone(),
        }
    }

    fn bucket_url(&self) -> String {
        format!("https://{STORAGE_HOST}/v0/b/{}/o", self.bucket)
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/{}", self.bucket_url(), urlencoding::encode(path))
    }

    /// Start a request carrying the principal's ID token, if any.
    async fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.auth.id_token().await {
            Some(token) => builder.header(
                reqwest::header::AUTHORIZATION,
                format!("Firebase {}", token.expose_secret()),
            ),
            None => builder,
        }
    }

    async fn metadata(&self, path: &str) -> Result<ObjectMetadata, BlobError> {
        let response = self
            .request(Method::GET, &self.object_url(path))
            .await
            .send()
            .await?;
        parse_response(response, path).await
    }

    /// Public retrieval URL of an object.
    fn media_url(&self, path: &str, token: Option<&str>) -> Result<Url, BlobError> {
        let mut url = Url::parse(&self.object_url(path)).map_err(|e| BlobError::Backend {
            status: 0,
            message: e.to_string(),
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("alt", "media");
            if let Some(token) = token {
                query.append_pair("token", token);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl BlobStore for StorageClient {
    #[instrument(skip(self, blob), fields(bytes = blob.data.len()))]
    async fn upload(&self, path: &str, blob: &Blob) -> Result<ObjectRef, BlobError> {
        let response = self
            .request(Method::POST, &self.bucket_url())
            .await
            .query(&[("name", path)])
            .header(reqwest::header::CONTENT_TYPE, &blob.content_type)
            .body(blob.data.clone())
            .send()
            .await?;

        parse_response(response, path)
            .await
            .map(ObjectMetadata::into_object)
    }

    async fn download_url(&self, object: &ObjectRef) -> Result<Url, BlobError> {
        let token = match &object.download_token {
            Some(token) => Some(token.clone()),
            None => self.metadata(&object.path).await?.into_object().download_token,
        };
        self.media_url(&object.path, token.as_deref())
    }

    #[instrument(skip(self))]
    async fn delete(&self, object: &ObjectRef) -> Result<(), BlobError> {
        let response = self
            .request(Method::DELETE, &self.object_url(&object.path))
            .await
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(map_blob_error(status, &body, &object.path));
        }
        Ok(())
    }

    fn object_for_url(&self, url: &Url) -> Option<ObjectRef> {
        if url.host_str() != Some(STORAGE_HOST) {
            return None;
        }
        let segments: Vec<&str> = url.path_segments()?.collect();
        let ["v0", "b", bucket, "o", encoded] = segments.as_slice() else {
            return None;
        };
        if *bucket != self.bucket {
            return None;
        }
        let path = urlencoding::decode(encoded).ok()?.into_owned();
        let download_token = url
            .query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned());
        Some(ObjectRef {
            path,
            download_token,
        })
    }
}

async fn parse_response(
    response: reqwest::Response,
    path: &str,
) -> Result<ObjectMetadata, BlobError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(map_blob_error(status, &body, path));
    }
    serde_json::from_str(&body).map_err(|e| BlobError::Backend {
        status: status.as_u16(),
        message: format!("unexpected metadata: {e}"),
    })
}

fn map_blob_error(status: StatusCode, body: &str, path: &str) -> BlobError {
    match status {
        StatusCode::NOT_FOUND => BlobError::NotFound(path.to_string()),
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
            BlobError::PermissionDenied(path.to_string())
        }
        _ => BlobError::Backend {
            status: status.as_u16(),
            message: error_details(body).1,
        },
    }
}
