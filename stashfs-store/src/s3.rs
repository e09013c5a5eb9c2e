//! S3-compatible store.
//!
//! Handles AWS S3 and S3-compatible services (Backblaze B2, MinIO). Uses
//! reqwest with manual AWS Signature V4 signing so no SDK dependency is needed.
//! Requests are path-style: the bucket is part of the endpoint URL.

use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response, StatusCode};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tracing::debug;

use stashfs_common::backend::{ByteReader, ObjectMeta, ObjectStore, StoreError};

type HmacSha256 = Hmac<Sha256>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct S3Config {
    pub bucket: String,
    pub prefix: String,
    pub region: String,
    pub endpoint: Option<String>, // Custom endpoint for S3-compatible APIs
    pub access_key_id: String,
    pub secret_access_key: String,
    pub storage_class: Option<String>,
}

pub struct S3Store {
    config: S3Config,
    client: Client,
}

/// A signed request ready to send.
struct S3Request<'a> {
    method: Method,
    path: String,
    query: String,
    extra_headers: Vec<(&'a str, String)>,
    body: Bytes,
}

impl S3Store {
    pub fn new(config: S3Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        if let Some(ep) = &self.config.endpoint {
            ep.trim_end_matches('/').to_string()
        } else {
            format!(
                "https://s3.{}.amazonaws.com/{}",
                self.config.region, self.config.bucket
            )
        }
    }

    /// Key as stored in the bucket, with the configured prefix applied.
    fn full_key(&self, key: &str) -> String {
        let prefix = self.config.prefix.trim_matches('/');
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", prefix, key)
        }
    }

    fn strip_prefix<'k>(&self, full_key: &'k str) -> &'k str {
        let prefix = self.config.prefix.trim_matches('/');
        if prefix.is_empty() {
            full_key
        } else {
            full_key
                .strip_prefix(prefix)
                .and_then(|k| k.strip_prefix('/'))
                .unwrap_or(full_key)
        }
    }

    /// Absolute request path for an object, already URI-encoded.
    fn object_path(&self, key: &str) -> String {
        format!("{}/{}", url_path(&self.endpoint()), encode_key(&self.full_key(key)))
    }

    fn bucket_path(&self) -> String {
        format!("{}/", url_path(&self.endpoint()))
    }

    /// Compute AWS Signature V4 for a request.
    #[allow(clippy::too_many_arguments)]
    fn sign(
        &self,
        method: &str,
        path: &str,
        query: &str,
        headers: &BTreeMap<String, String>,
        body_hash: &str,
        date_time: &str,
        date: &str,
    ) -> String {
        // Canonical request
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();
        let signed_headers: String = headers.keys().cloned().collect::<Vec<_>>().join(";");

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, query, canonical_headers, signed_headers, body_hash
        );

        // String to sign
        let cr_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let credential_scope = format!("{}/{}/s3/aws4_request", date, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            date_time, credential_scope, cr_hash
        );

        let signing_key = derive_signing_key(
            &self.config.secret_access_key,
            date,
            &self.config.region,
        );
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        format!(
            "AWS4-HMAC-SHA256 Credential={}/{},SignedHeaders={},Signature={}",
            self.config.access_key_id, credential_scope, signed_headers, signature
        )
    }

    async fn send(&self, req: S3Request<'_>) -> Result<Response, StoreError> {
        let now = Utc::now();
        let date_time = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let endpoint = self.endpoint();
        let host = url_host(&endpoint);
        let body_hash_str = body_hash(&req.body);

        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), host);
        headers.insert("x-amz-content-sha256".to_string(), body_hash_str.clone());
        headers.insert("x-amz-date".to_string(), date_time.clone());
        for (name, value) in &req.extra_headers {
            headers.insert(name.to_string(), value.clone());
        }

        let auth = self.sign(
            req.method.as_str(),
            &req.path,
            &req.query,
            &headers,
            &body_hash_str,
            &date_time,
            &date,
        );

        let mut url = format!("{}{}", url_origin(&endpoint), req.path);
        if !req.query.is_empty() {
            url.push('?');
            url.push_str(&req.query);
        }

        let mut builder = self
            .client
            .request(req.method.clone(), &url)
            .header("x-amz-date", &date_time)
            .header("x-amz-content-sha256", &body_hash_str)
            .header("Authorization", &auth);
        for (name, value) in &req.extra_headers {
            builder = builder.header(*name, value);
        }
        if req.method == Method::PUT {
            // Always attach the body so an empty marker still carries Content-Length: 0.
            builder = builder
                .header("Content-Type", "application/octet-stream")
                .body(req.body);
        }

        builder
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("S3 {} request failed: {}", req.method, e)))
    }

    fn simple(&self, method: Method, key: &str) -> S3Request<'static> {
        S3Request {
            method,
            path: self.object_path(key),
            query: String::new(),
            extra_headers: Vec::new(),
            body: Bytes::new(),
        }
    }
}

/// Map a non-success response onto the store error taxonomy.
async fn check(resp: Response, op: &str, key: &str) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status, op, key, body))
}

fn status_error(status: StatusCode, op: &str, key: &str, body: String) -> StoreError {
    if status == StatusCode::NOT_FOUND {
        StoreError::NotFound(key.to_string())
    } else if status.is_server_error() {
        StoreError::Unavailable(format!("S3 {} failed: HTTP {} - {}", op, status, body))
    } else {
        StoreError::Rejected { status: status.as_u16(), message: body }
    }
}

fn derive_signing_key(secret: &str, date: &str, region: &str) -> Vec<u8> {
    let key = format!("AWS4{}", secret);
    let k_date = hmac_sha256(key.as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, b"s3");
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC key length ok");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn body_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// URI-encode each key segment, keeping the separators.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, mut body: ByteReader) -> Result<(), StoreError> {
        // Single PUT: the payload hash is part of the signature, so the body is buffered.
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;

        let mut req = self.simple(Method::PUT, key);
        req.body = Bytes::from(data);
        if let Some(ref sc) = self.config.storage_class {
            req.extra_headers.push(("x-amz-storage-class", sc.clone()));
        }

        let resp = self.send(req).await?;
        check(resp, "PUT", key).await?;
        debug!(key = %key, "S3 put complete");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<ByteReader, StoreError> {
        let resp = self.send(self.simple(Method::GET, key)).await?;
        let resp = check(resp, "GET", key).await?;

        let stream = resp
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        let resp = self.send(self.simple(Method::HEAD, key)).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(resp, "HEAD", key).await?;

        let headers = resp.headers();
        let size = headers
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let last_modified = headers
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Some(ObjectMeta { key: key.to_string(), size, last_modified }))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let resp = self.send(self.simple(Method::DELETE, key)).await?;
        if resp.status() != StatusCode::NOT_FOUND {
            check(resp, "DELETE", key).await?;
        }
        debug!(key = %key, "S3 delete complete");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        let full_prefix = self.full_key(prefix);
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            // Canonical query: parameters sorted by name.
            let mut query = String::new();
            if let Some(ref token) = continuation {
                query.push_str(&format!("continuation-token={}&", urlencoding::encode(token)));
            }
            query.push_str(&format!("list-type=2&prefix={}", urlencoding::encode(&full_prefix)));

            let resp = self
                .send(S3Request {
                    method: Method::GET,
                    path: self.bucket_path(),
                    query,
                    extra_headers: Vec::new(),
                    body: Bytes::new(),
                })
                .await?;
            let resp = check(resp, "LIST", prefix).await?;
            let body = resp
                .text()
                .await
                .map_err(|e| StoreError::Unavailable(format!("Failed to read S3 list response: {}", e)))?;

            let page = parse_list_page(&body);
            for obj in page.objects {
                entries.push(ObjectMeta {
                    key: self.strip_prefix(&obj.key).to_string(),
                    size: obj.size,
                    last_modified: obj.last_modified,
                });
            }

            match page.next_token {
                Some(token) if page.truncated => continuation = Some(token),
                _ => break,
            }
        }

        debug!(prefix = %prefix, count = entries.len(), "S3 list complete");
        Ok(entries)
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), StoreError> {
        let mut req = self.simple(Method::PUT, dst_key);
        req.extra_headers.push((
            "x-amz-copy-source",
            format!("/{}/{}", self.config.bucket, encode_key(&self.full_key(src_key))),
        ));

        let resp = self.send(req).await?;
        let resp = check(resp, "COPY", src_key).await?;

        // CopyObject can report failure inside a 200 response.
        let body = resp.text().await.unwrap_or_default();
        if body.contains("<Error>") {
            return Err(StoreError::Unavailable(format!("S3 COPY failed: {}", body)));
        }
        debug!(src = %src_key, dst = %dst_key, "S3 copy complete");
        Ok(())
    }
}

// ── ListObjectsV2 parsing ──

struct ListedObject {
    key: String,
    size: u64,
    last_modified: DateTime<Utc>,
}

struct ListPage {
    objects: Vec<ListedObject>,
    truncated: bool,
    next_token: Option<String>,
}

/// Extract the text of the first `<tag>…</tag>` in `xml`.
fn tag_value<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(&xml[start..end])
}

/// Decode XML entity and character references in one pass. Unknown
/// references are kept verbatim.
fn xml_unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .and_then(|semi| decode_reference(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let numeric = name.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Minimal ListObjectsV2 parser: `<Contents>` blocks plus paging fields.
fn parse_list_page(xml: &str) -> ListPage {
    let mut objects = Vec::new();
    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        remaining = &remaining[start + "<Contents>".len()..];
        let Some(end) = remaining.find("</Contents>") else {
            break;
        };
        let block = &remaining[..end];
        if let Some(key) = tag_value(block, "Key") {
            objects.push(ListedObject {
                key: xml_unescape(key),
                size: tag_value(block, "Size").and_then(|s| s.parse().ok()).unwrap_or(0),
                last_modified: tag_value(block, "LastModified")
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now),
            });
        }
        remaining = &remaining[end + "</Contents>".len()..];
    }

    ListPage {
        objects,
        truncated: tag_value(xml, "IsTruncated") == Some("true"),
        next_token: tag_value(xml, "NextContinuationToken").map(xml_unescape),
    }
}

/// Extract the host part from a URL for use in signing.
fn url_host(url: &str) -> String {
    // Strip scheme and path, return just host[:port]
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    without_scheme.split('/').next().unwrap_or(without_scheme).to_string()
}

/// Scheme and host of a URL, without any path.
fn url_origin(url: &str) -> String {
    let scheme = if url.starts_with("http://") { "http://" } else { "https://" };
    format!("{}{}", scheme, url_host(url))
}

/// Path part of a URL without a trailing separator; empty when there is none.
fn url_path(url: &str) -> String {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    match without_scheme.find('/') {
        Some(idx) => without_scheme[idx..].trim_end_matches('/').to_string(),
        None => String::new(),
    }
}
