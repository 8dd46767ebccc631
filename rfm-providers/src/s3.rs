// SPDX-License-Identifier: AGPL-3.0-or-later
//! S3-compatible object client
//!
//! Works with AWS S3, MinIO, Wasabi, Cloudflare R2 and any store speaking
//! the S3 REST API. Requests are signed with AWS Signature Version 4.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Method, StatusCode};
use rfm_core::{
    config::ObjectConfig,
    error::{RfmError, RfmResult},
};
use std::collections::BTreeMap;

use crate::object::{ObjectClient, ObjectInfo};

/// S3 connection settings
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Endpoint URL (e.g., "https://s3.amazonaws.com" or "https://minio.example.com")
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Use path-style URLs (required for MinIO and some providers)
    pub path_style: bool,
}

impl S3Config {
    /// Create MinIO configuration
    pub fn minio(endpoint: &str, bucket: &str, access_key: &str, secret_key: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            bucket: bucket.to_string(),
            region: "us-east-1".to_string(),
            access_key_id: access_key.to_string(),
            secret_access_key: secret_key.to_string(),
            path_style: true,
        }
    }
}

impl From<&ObjectConfig> for S3Config {
    fn from(config: &ObjectConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            access_key_id: config.access_key_id.clone(),
            secret_access_key: config.secret_access_key.clone(),
            path_style: config.path_style,
        }
    }
}

/// S3 REST client
pub struct S3Client {
    config: S3Config,
    http: Client,
}

impl S3Client {
    pub fn new(config: S3Config) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    /// Scheme and authority of every request.
    fn base_url(&self) -> String {
        let endpoint = self.config.endpoint.trim_end_matches('/');
        if self.config.path_style {
            endpoint.to_string()
        } else {
            endpoint.replacen("://", &format!("://{}.", self.config.bucket), 1)
        }
    }

    /// Canonical, percent-encoded request path for `key`.
    fn canonical_path(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        if self.config.path_style {
            format!("/{}/{}", self.config.bucket, encoded.join("/"))
        } else {
            format!("/{}", encoded.join("/"))
        }
    }

    /// Sign request with AWS Signature Version 4
    fn sign_request(
        &self,
        method: &Method,
        url: &reqwest::Url,
        headers: &mut BTreeMap<String, String>,
        payload_hash: &str,
    ) -> RfmResult<String> {
        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        headers.insert("x-amz-date".to_string(), amz_date.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.to_string());

        let mut host = url.host_str().unwrap_or_default().to_string();
        if let Some(port) = url.port() {
            host = format!("{}:{}", host, port);
        }
        headers.insert("host".to_string(), host);

        let signed_headers = headers.keys().map(|s| s.as_str()).collect::<Vec<_>>().join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.as_str(),
            url.path(),
            url.query().unwrap_or(""),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let k_date = hmac_sha256(
            format!("AWS4{}", self.config.secret_access_key).as_bytes(),
            date_stamp.as_bytes(),
        )?;
        let k_region = hmac_sha256(&k_date, self.config.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, b"s3")?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

        Ok(format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.config.access_key_id, credential_scope, signed_headers, signature
        ))
    }

    /// Make a signed request. `query` pairs must already be sorted by name.
    async fn request(
        &self,
        operation: &'static str,
        method: Method,
        key: &str,
        query: &[(&str, &str)],
        mut headers: BTreeMap<String, String>,
        body: Option<Bytes>,
    ) -> RfmResult<reqwest::Response> {
        let query_string = query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let mut raw_url = format!("{}{}", self.base_url(), self.canonical_path(key));
        if !query_string.is_empty() {
            raw_url.push('?');
            raw_url.push_str(&query_string);
        }
        let url = reqwest::Url::parse(&raw_url).map_err(|e| RfmError::backend(operation, key, e))?;

        let payload_hash = sha256_hex(body.as_deref().unwrap_or_default());
        let auth = self.sign_request(&method, &url, &mut headers, &payload_hash)?;

        let mut request = self.http.request(method, url);
        for (k, v) in &headers {
            if k != "host" {
                request = request.header(k, v);
            }
        }
        request = request.header(header::AUTHORIZATION, auth);
        if let Some(data) = body {
            request = request.body(data);
        }

        request
            .send()
            .await
            .map_err(|e| RfmError::backend(operation, key, e))
    }

    async fn expect_success(
        operation: &'static str,
        key: &str,
        response: reqwest::Response,
    ) -> RfmResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(RfmError::not_found(key));
        }
        let text = response.text().await.unwrap_or_default();
        Err(RfmError::backend(operation, key, format!("{}: {}", status, text)))
    }
}

#[async_trait]
impl ObjectClient for S3Client {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    async fn list(&self, prefix: &str) -> RfmResult<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut query = Vec::new();
            if let Some(token) = token.as_deref() {
                query.push(("continuation-token", token));
            }
            query.push(("list-type", "2"));
            query.push(("prefix", prefix));

            let response = self
                .request("list", Method::GET, "", &query, BTreeMap::new(), None)
                .await?;
            let response = Self::expect_success("list", prefix, response).await?;
            let text = response
                .text()
                .await
                .map_err(|e| RfmError::backend("list", prefix, e))?;

            let page = parse_list_objects_v2(&text);
            tracing::debug!(prefix = %prefix, count = page.objects.len(), "listed page");
            objects.extend(page.objects);

            match page.continuation_token {
                Some(next) if page.is_truncated => token = Some(next),
                _ => break,
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn head(&self, key: &str) -> RfmResult<Option<ObjectInfo>> {
        let response = self
            .request("head", Method::HEAD, key, &[], BTreeMap::new(), None)
            .await?;
        // A store cannot tell missing from forbidden here; both read as absent.
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::FORBIDDEN) {
            return Ok(None);
        }
        let response = Self::expect_success("head", key, response).await?;
        let headers = response.headers();
        let text = |name: header::HeaderName| {
            headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
        };

        Ok(Some(ObjectInfo {
            key: key.to_string(),
            size: text(header::CONTENT_LENGTH)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            last_modified: text(header::LAST_MODIFIED)
                .and_then(|v| DateTime::parse_from_rfc2822(&v).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            etag: text(header::ETAG).map(|v| v.trim_matches('"').to_string()),
        }))
    }

    async fn get(&self, key: &str, range: Option<(u64, u64)>) -> RfmResult<Bytes> {
        let mut headers = BTreeMap::new();
        if let Some((start, end)) = range {
            headers.insert("range".to_string(), format!("bytes={}-{}", start, end));
        }
        let response = self.request("get", Method::GET, key, &[], headers, None).await?;
        let response = Self::expect_success("get", key, response).await?;
        response
            .bytes()
            .await
            .map_err(|e| RfmError::backend("get", key, e))
    }

    async fn put(&self, key: &str, data: Bytes) -> RfmResult<()> {
        let response = self
            .request("put", Method::PUT, key, &[], BTreeMap::new(), Some(data))
            .await?;
        Self::expect_success("put", key, response).await?;
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> RfmResult<()> {
        let source = format!(
            "/{}/{}",
            self.config.bucket,
            src.split('/')
                .map(|segment| urlencoding::encode(segment).into_owned())
                .collect::<Vec<_>>()
                .join("/")
        );
        let mut headers = BTreeMap::new();
        headers.insert("x-amz-copy-source".to_string(), source);

        let response = self
            .request("copy", Method::PUT, dst, &[], headers, None)
            .await
            .map_err(|e| relabel(e, src))?;
        let response = Self::expect_success("copy", src, response).await?;
        // S3 can report a failed copy inside a 200 response.
        let body = response
            .text()
            .await
            .map_err(|e| RfmError::backend("copy", src, e))?;
        if body.contains("<Error>") {
            return Err(RfmError::backend("copy", src, body));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> RfmResult<()> {
        let response = self
            .request("delete", Method::DELETE, key, &[], BTreeMap::new(), None)
            .await?;
        match Self::expect_success("delete", key, response).await {
            Err(RfmError::PathNotFound { .. }) | Ok(_) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Report copy failures against the source key.
fn relabel(err: RfmError, src: &str) -> RfmError {
    match err {
        RfmError::BackendOperationFailed { operation, message, .. } => {
            RfmError::BackendOperationFailed {
                operation,
                path: src.to_string(),
                message,
            }
        }
        other => other,
    }
}

/// One page of a ListObjectsV2 response
#[derive(Debug, Default)]
struct ListPage {
    objects: Vec<ObjectInfo>,
    is_truncated: bool,
    continuation_token: Option<String>,
}

/// Parse ListObjectsV2 XML. Element order and line layout are not assumed.
fn parse_list_objects_v2(xml: &str) -> ListPage {
    let mut page = ListPage::default();

    let mut rest = xml;
    while let Some((contents, after)) = next_element(rest, "Contents") {
        let key = next_element(contents, "Key").map(|(v, _)| unescape_xml(v));
        if let Some(key) = key {
            page.objects.push(ObjectInfo {
                key,
                size: next_element(contents, "Size")
                    .and_then(|(v, _)| v.trim().parse().ok())
                    .unwrap_or(0),
                last_modified: next_element(contents, "LastModified")
                    .and_then(|(v, _)| DateTime::parse_from_rfc3339(v.trim()).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
                etag: next_element(contents, "ETag")
                    .map(|(v, _)| unescape_xml(v).trim_matches('"').to_string()),
            });
        }
        rest = after;
    }

    page.is_truncated = next_element(xml, "IsTruncated")
        .map(|(v, _)| v.trim() == "true")
        .unwrap_or(false);
    page.continuation_token = next_element(xml, "NextContinuationToken").map(|(v, _)| unescape_xml(v));
    page
}

/// Inner text of the first `<tag>...</tag>` and the remainder after it.
fn next_element<'a>(xml: &'a str, tag: &str) -> Option<(&'a str, &'a str)> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let len = xml[start..].find(&close)?;
    Some((&xml[start..start + len], &xml[start + len + close.len()..]))
}

fn unescape_xml(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// SHA-256 hash as hex string
fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// HMAC-SHA256
fn hmac_sha256(key: &[u8], data: &[u8]) -> RfmResult<Vec<u8>> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| RfmError::backend("sign", "", e))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
