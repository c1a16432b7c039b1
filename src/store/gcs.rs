//! Google Cloud Storage backend over the JSON API.
//!
//! Uploads are spooled to a temporary file while the caller writes and sent
//! as a single resumable-session PUT on commit, so the object metadata is
//! fixed before the first content byte reaches the store.

use crate::store::auth::{AuthMode, Authorizer};
use crate::store::{ObjectStore, ObjectWriter, StoredObject};
use crate::{MirrorError, Result};
use reqwest::blocking::{Body, Client, RequestBuilder};
use reqwest::header::LOCATION;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

#[derive(Debug, Clone)]
pub struct GcsConfig {
    /// Base URL, normally [`DEFAULT_ENDPOINT`]
    pub endpoint: String,
    pub auth: AuthMode,
    pub connect_timeout: Duration,
}

impl GcsConfig {
    /// Honors `STORAGE_EMULATOR_HOST` and `GOOGLE_OAUTH_ACCESS_TOKEN`, and
    /// otherwise authenticates with Application Default Credentials.
    pub fn from_env(connect_timeout: Duration) -> Self {
        let emulator = std::env::var("STORAGE_EMULATOR_HOST").ok().filter(|h| !h.is_empty());
        let endpoint = match &emulator {
            Some(host) => emulator_endpoint(host),
            None => DEFAULT_ENDPOINT.to_string(),
        };
        let auth = AuthMode::select(std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN").ok(), emulator.is_some());
        Self { endpoint, auth, connect_timeout }
    }
}

fn emulator_endpoint(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

pub struct GcsStore {
    client: Client,
    auth: Authorizer,
    bucket: String,
    config: GcsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ObjectResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
    /// uint64 values are sent as strings
    size: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl ObjectResource {
    fn into_stored(self) -> std::result::Result<StoredObject, String> {
        let size = self.size
            .parse()
            .map_err(|_| format!("object {} has invalid size {:?}", self.name, self.size))?;
        Ok(StoredObject { name: self.name, size, metadata: self.metadata })
    }
}

#[derive(Debug, Serialize)]
struct InsertRequest<'a> {
    name: &'a str,
    metadata: &'a HashMap<String, String>,
}

impl GcsStore {
    pub fn new(bucket: &str, config: GcsConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| MirrorError::Connection(format!("HTTP client setup failed: {}", e)))?;
        let auth = Authorizer::new(&config.auth)?;
        Ok(Self { client, auth, bucket: bucket.to_string(), config })
    }

    fn objects_url(&self) -> String {
        format!("{}/storage/v1/b/{}/o", self.config.endpoint, self.bucket)
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/storage/v1/b/{}/o", self.config.endpoint, self.bucket)
    }

    fn authorize(&self, req: RequestBuilder) -> std::result::Result<RequestBuilder, String> {
        match self.auth.token().map_err(|e| e.to_string())? {
            Some(token) => Ok(req.bearer_auth(token)),
            None => Ok(req),
        }
    }

    fn list_page(&self, prefix: &str, page_token: Option<&str>) -> std::result::Result<ListResponse, String> {
        let mut req = self.client
            .get(self.objects_url())
            .query(&[("prefix", prefix), ("fields", "items(name,size,metadata),nextPageToken")]);
        if let Some(token) = page_token {
            req = req.query(&[("pageToken", token)]);
        }
        let resp = self.authorize(req)?.send().map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(format!("HTTP {}: {}", status, body.trim()));
        }
        resp.json().map_err(|e| e.to_string())
    }

    fn upload(&self, key: &str, metadata: &HashMap<String, String>, mut spool: File) -> std::result::Result<(), String> {
        let len = spool.seek(SeekFrom::End(0)).map_err(|e| e.to_string())?;
        spool.seek(SeekFrom::Start(0)).map_err(|e| e.to_string())?;

        let start = self.client
            .post(self.upload_url())
            .query(&[("uploadType", "resumable")])
            .header("X-Upload-Content-Length", len)
            .json(&InsertRequest { name: key, metadata });
        let resp = self.authorize(start)?.send().map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(format!("starting upload: HTTP {}: {}", status, body.trim()));
        }
        let session = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| "starting upload: no session location returned".to_string())?
            .to_string();
        debug!("Upload session for {} ({} bytes)", key, len);

        let put = self.client.put(&session).body(Body::sized(spool, len));
        let resp = self.authorize(put)?.send().map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(format!("HTTP {}: {}", status, body.trim()));
        }
        Ok(())
    }
}

impl ObjectStore for GcsStore {
    fn list_objects(&self, prefix: &str) -> Result<Vec<StoredObject>> {
        collect_pages(|token| self.list_page(prefix, token))
            .map_err(|e| MirrorError::listing(format!("gs://{}/{}", self.bucket, prefix), e))
    }

    fn create_object<'a>(&'a self, key: &str, metadata: HashMap<String, String>) -> Result<Box<dyn ObjectWriter + 'a>> {
        let spool = tempfile::tempfile()
            .map_err(|e| MirrorError::transfer(key, format!("cannot create spool file: {}", e)))?;
        Ok(Box::new(GcsWriter {
            store: self,
            key: key.to_string(),
            metadata,
            spool,
        }))
    }
}

/// Follow `nextPageToken` until the listing is exhausted. The first failing
/// page or malformed item fails the whole listing.
fn collect_pages<F>(mut fetch: F) -> std::result::Result<Vec<StoredObject>, String>
where
    F: FnMut(Option<&str>) -> std::result::Result<ListResponse, String>,
{
    let mut objects = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
        let page = fetch(page_token.as_deref())?;
        for item in page.items {
            objects.push(item.into_stored()?);
        }
        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => return Ok(objects),
        }
    }
}

struct GcsWriter<'a> {
    store: &'a GcsStore,
    key: String,
    metadata: HashMap<String, String>,
    spool: File,
}

impl Write for GcsWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.spool.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.spool.flush()
    }
}

impl ObjectWriter for GcsWriter<'_> {
    fn commit(self: Box<Self>) -> Result<()> {
        let GcsWriter { store, key, metadata, spool } = *self;
        store
            .upload(&key, &metadata, spool)
            .map_err(|e| MirrorError::transfer(format!("gs://{}/{}", store.bucket, key), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emulator_endpoint() {
        assert_eq!(emulator_endpoint("localhost:4443"), "http://localhost:4443");
        assert_eq!(emulator_endpoint("https://gcs.test/"), "https://gcs.test");
    }

    #[test]
    fn test_list_response_decode() {
        let body = r#"{
            "items": [
                {"name": "mirror/a.txt", "size": "10", "metadata": {"goog-reserved-file-mtime": "1560000000"}},
                {"name": "mirror/b.txt", "size": "0"}
            ],
            "nextPageToken": "abc"
        }"#;
        let page: ListResponse = serde_json::from_str(body).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));

        let objects: Vec<StoredObject> = page.items.into_iter().map(|i| i.into_stored().unwrap()).collect();
        assert_eq!(objects[0].size, 10);
        assert_eq!(objects[0].metadata["goog-reserved-file-mtime"], "1560000000");
        assert!(objects[1].metadata.is_empty());
    }

    #[test]
    fn test_list_response_empty_bucket() {
        let page: ListResponse = serde_json::from_str("{}").unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
    }

    fn page(body: &str) -> std::result::Result<ListResponse, String> {
        serde_json::from_str(body).map_err(|e| e.to_string())
    }

    #[test]
    fn test_collect_pages_follows_tokens() {
        let mut requested = Vec::new();
        let objects = collect_pages(|token| {
            requested.push(token.map(str::to_string));
            match token {
                None => page(r#"{"items": [{"name": "a", "size": "1"}], "nextPageToken": "p2"}"#),
                Some("p2") => page(r#"{"items": [{"name": "b", "size": "2"}], "nextPageToken": "p3"}"#),
                Some("p3") => page(r#"{"items": [{"name": "c", "size": "3"}], "nextPageToken": ""}"#),
                Some(other) => Err(format!("unexpected token {}", other)),
            }
        })
        .unwrap();

        let names: Vec<&str> = objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(requested, vec![None, Some("p2".to_string()), Some("p3".to_string())]);
    }

    #[test]
    fn test_collect_pages_fails_on_any_page() {
        let mut calls = 0;
        let err = collect_pages(|token| {
            calls += 1;
            match token {
                None => page(r#"{"items": [{"name": "a", "size": "1"}], "nextPageToken": "p2"}"#),
                Some(_) => Err("HTTP 503 Service Unavailable".to_string()),
            }
        })
        .unwrap_err();

        assert!(err.contains("503"));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_collect_pages_rejects_bad_item() {
        let result = collect_pages(|_| page(r#"{"items": [{"name": "a", "size": "lots"}]}"#));
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_size_is_rejected() {
        let item = ObjectResource { name: "x".into(), size: "ten".into(), metadata: HashMap::new() };
        assert!(item.into_stored().is_err());
    }

    #[test]
    fn test_insert_request_body() {
        let metadata = HashMap::from([("goog-reserved-file-mtime".to_string(), "42".to_string())]);
        let body = serde_json::to_value(InsertRequest { name: "mirror/x", metadata: &metadata }).unwrap();
        assert_eq!(body["name"], "mirror/x");
        assert_eq!(body["metadata"]["goog-reserved-file-mtime"], "42");
    }
}
