//! Azure Blob Storage client over the Blob REST API.
//!
//! Requests are authorised with Shared Key: an HMAC-SHA256 over the canonical
//! string-to-sign, keyed with the base64-decoded account key. The canonical
//! resource is built from the request path, so both the public
//! `https://{account}.blob.core.windows.net` endpoint and path-style emulator
//! endpoints (`http://127.0.0.1:10000/{account}`) sign correctly. Blob names
//! are percent-encoded in the URL but signed in their decoded form.

use super::{ObjectStore, StoreError, StoreResult};
use crate::config::StorageConfig;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;

const AZURE_API_VERSION: &str = "2023-11-03";

/// Everything except unreserved characters and `/` is escaped in blob paths.
const BLOB_NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct AzureBlobStore {
    client: reqwest::Client,
    account: String,
    key: Vec<u8>,
    account_url: String,
    container: String,
}

impl AzureBlobStore {
    pub fn new(config: &StorageConfig) -> StoreResult<Self> {
        let encoded = config.account_key.as_deref().ok_or_else(|| {
            StoreError::Credentials("no account key configured (AZURE_STORAGE_KEY)".into())
        })?;
        let key = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| StoreError::Credentials(format!("account key is not base64: {err}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client,
            account: config.account_name.clone(),
            key,
            account_url: config.account_url(),
            container: config.container_name.clone(),
        })
    }

    fn container_url(&self) -> String {
        format!("{}/{}", self.account_url, self.container)
    }

    fn blob_url(&self, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.account_url,
            self.container,
            utf8_percent_encode(name, BLOB_NAME_ENCODE_SET)
        )
    }

    /// RFC 1123 date for `x-ms-date`.
    fn request_date() -> String {
        Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    /// Build the Shared Key string-to-sign for one request.
    ///
    /// `ms_headers` must already contain every `x-ms-*` header that is sent;
    /// `query` holds the query parameters of `url`.
    fn string_to_sign(
        &self,
        method: &Method,
        url: &Url,
        content_length: usize,
        content_type: &str,
        ms_headers: &[(&str, String)],
    ) -> String {
        let content_length = if content_length == 0 {
            String::new()
        } else {
            content_length.to_string()
        };

        let mut headers: Vec<(String, &str)> = ms_headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
            .collect();
        headers.sort_by(|a, b| a.0.cmp(&b.0));
        let canonical_headers = headers
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join("\n");

        let path = percent_decode_str(url.path()).decode_utf8_lossy();
        let mut canonical_resource = format!("/{}{}", self.account, path);
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.into_owned()))
            .collect();
        params.sort();
        for (k, v) in params {
            canonical_resource.push_str(&format!("\n{}:{}", k, v));
        }

        format!(
            "{}\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}\n{}",
            method.as_str(),
            content_length,
            content_type,
            canonical_headers,
            canonical_resource
        )
    }

    fn sign(&self, string_to_sign: &str) -> StoreResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|err| StoreError::Credentials(format!("invalid account key: {err}")))?;
        mac.update(string_to_sign.as_bytes());
        let signature = general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        Ok(format!("SharedKey {}:{}", self.account, signature))
    }

    /// Prepare a signed request. `extra` carries `x-ms-*` headers beyond date
    /// and version.
    fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<(Bytes, &str)>,
        extra: &[(&str, String)],
    ) -> StoreResult<RequestBuilder> {
        let url = Url::parse(url).map_err(|err| {
            StoreError::InvalidName(format!("{url} ({err})"))
        })?;
        let date = Self::request_date();

        let mut ms_headers = vec![
            ("x-ms-date", date),
            ("x-ms-version", AZURE_API_VERSION.to_string()),
        ];
        ms_headers.extend(extra.iter().cloned());

        let (content_length, content_type) = body
            .as_ref()
            .map(|(data, content_type)| (data.len(), *content_type))
            .unwrap_or((0, ""));
        let authorization = self.sign(&self.string_to_sign(
            &method,
            &url,
            content_length,
            content_type,
            &ms_headers,
        ))?;

        let mut req = self.client.request(method, url);
        for (name, value) in &ms_headers {
            req = req.header(*name, value);
        }
        req = req.header("Authorization", authorization);
        req = match body {
            Some((data, content_type)) => req.header("Content-Type", content_type).body(data),
            None => req,
        };
        Ok(req)
    }

    async fn send(operation: &'static str, req: RequestBuilder) -> StoreResult<reqwest::Response> {
        let resp = req.send().await?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(StoreError::Status {
            operation,
            status: status.as_u16(),
            body,
        })
    }

    /// HEAD a resource, mapping 404 to `false`.
    async fn head(&self, operation: &'static str, url: &str) -> StoreResult<bool> {
        let resp = self.request(Method::HEAD, url, None, &[])?.send().await?;
        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(StoreError::Status {
                operation,
                status: status.as_u16(),
                body: String::new(),
            }),
        }
    }
}

#[async_trait]
impl ObjectStore for AzureBlobStore {
    fn container(&self) -> &str {
        &self.container
    }

    async fn container_exists(&self) -> StoreResult<bool> {
        let url = format!("{}?restype=container", self.container_url());
        self.head("container exists", &url).await
    }

    async fn create_container(&self) -> StoreResult<()> {
        let url = format!("{}?restype=container", self.container_url());
        let req = self.request(Method::PUT, &url, None, &[])?.body(Bytes::new());
        Self::send("create container", req).await?;
        Ok(())
    }

    async fn object_exists(&self, name: &str) -> StoreResult<bool> {
        self.head("blob exists", &self.blob_url(name)).await
    }

    async fn write_object(&self, name: &str, data: Bytes) -> StoreResult<()> {
        let size = data.len();
        let req = self.request(
            Method::PUT,
            &self.blob_url(name),
            Some((data, "application/octet-stream")),
            &[("x-ms-blob-type", "BlockBlob".to_string())],
        )?;
        Self::send("put blob", req).await?;
        debug!("put blob {}/{} ({} bytes)", self.container, name, size);
        Ok(())
    }

    async fn set_content_type(&self, name: &str, content_type: &str) -> StoreResult<()> {
        let url = format!("{}?comp=properties", self.blob_url(name));
        let req = self
            .request(
                Method::PUT,
                &url,
                None,
                &[("x-ms-blob-content-type", content_type.to_string())],
            )?
            .body(Bytes::new());
        match Self::send("set blob properties", req).await {
            Err(StoreError::Status { status: 404, .. }) => {
                Err(StoreError::NotFound(name.to_string()))
            }
            other => other.map(|_| ()),
        }
    }

    async fn read_object(&self, name: &str) -> StoreResult<Bytes> {
        let req = self.request(Method::GET, &self.blob_url(name), None, &[])?;
        match Self::send("get blob", req).await {
            Ok(resp) => Ok(resp.bytes().await?),
            Err(StoreError::Status { status: 404, .. }) => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(err) => Err(err),
        }
    }
}
