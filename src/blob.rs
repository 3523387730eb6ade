use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Read-only object storage holding record photos. Implementations
/// must keep "the key does not exist" distinguishable from transport
/// and server failures; the photo fetcher treats both as a missing
/// photo but logs them differently.
pub trait BlobStore: Send + Sync {
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobError>;
}

#[derive(Debug)]
pub enum BlobError {
    NotFound,
    Other(String),
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobError::NotFound => write!(f, "object not found"),
            BlobError::Other(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for BlobError {}

/// Blob store speaking plain HTTP GET against
/// `{endpoint}/{bucket}/{key}`. One unreachable store must not stall
/// a whole print run, so every request carries a hard timeout.
pub struct HttpBlobStore {
    endpoint: String,
    client: reqwest::blocking::Client,
}

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(8);

impl HttpBlobStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

impl BlobStore for HttpBlobStore {
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobError> {
        let url = format!("{}/{}/{}", self.endpoint, bucket, key);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| BlobError::Other(format!("GET {url}: {err}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound);
        }
        if !response.status().is_success() {
            return Err(BlobError::Other(format!(
                "GET {url}: status {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|err| BlobError::Other(format!("GET {url}: {err}")))?;
        Ok(bytes.to_vec())
    }
}

/// In-memory store for tests and embedded fixtures.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: HashMap<(String, String), Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bucket: &str, key: &str, bytes: Vec<u8>) {
        self.objects
            .insert((bucket.to_string(), key.to_string()), bytes);
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobError> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or(BlobError::NotFound)
    }
}
