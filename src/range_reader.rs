//! Range-based reader interface for COG assets.
//!
//! A unified interface for reading byte ranges from various sources
//! (remote assets over HTTP, local files, in-memory buffers). Partial
//! reads are what make the per-band fetch cheap: only the tiles covering
//! the requested bounding box are ever transferred.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Trait for reading byte ranges from any source.
///
/// This abstraction lets the same COG profile and window code work with:
/// - Remote assets (HTTP Range header)
/// - Local files (seek + read)
/// - In-memory buffers (tests, degraded full-body downloads)
pub trait RangeReader: Send + Sync {
    /// Read a range of bytes from the source.
    fn read_range(&self, offset: u64, length: usize) -> Result<Vec<u8>>;

    /// Total size of the source in bytes (0 when unknown).
    fn size(&self) -> u64;

    /// Human-readable identifier for this source (for logging/errors).
    fn identifier(&self) -> &str;
}

/// Local file range reader.
pub struct LocalRangeReader {
    path: PathBuf,
    size: u64,
}

impl LocalRangeReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path)?;
        Ok(Self {
            path,
            size: metadata.len(),
        })
    }
}

impl RangeReader for LocalRangeReader {
    fn read_range(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; length];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        self.path.to_str().unwrap_or("<invalid path>")
    }
}

/// In-memory range reader, used in tests and as the backing store when a
/// server hands back a full body instead of a range.
pub struct MemoryRangeReader {
    data: Arc<Vec<u8>>,
    identifier: String,
}

impl MemoryRangeReader {
    #[must_use]
    pub fn new(data: Vec<u8>, identifier: impl Into<String>) -> Self {
        Self {
            data: Arc::new(data),
            identifier: identifier.into(),
        }
    }
}

impl RangeReader for MemoryRangeReader {
    fn read_range(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        slice_range(&self.data, offset, length, &self.identifier)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// HTTP range reader for remote COG assets.
///
/// Uses a blocking reqwest client; the whole pipeline is sequential and
/// the bottleneck is catalog/storage latency, not local throughput.
///
/// Servers that ignore the `Range` header answer a ranged GET with
/// `200 OK` and the complete body. That is handled as a degraded mode,
/// not an error: the body is kept and every later read is served from it.
pub struct HttpRangeReader {
    url: String,
    size: u64,
    client: reqwest::blocking::Client,
    /// Full body kept after a server ignored the Range header.
    full_body: Mutex<Option<Arc<Vec<u8>>>>,
}

impl HttpRangeReader {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Self::with_client(url, client)
    }

    /// Build a reader around an existing client (one client per run keeps
    /// connection reuse across bands of the same scene).
    pub fn with_client(url: &str, client: reqwest::blocking::Client) -> Result<Self> {
        // Learn the asset size with a HEAD request
        let response = client.head(url).send()?;
        let size = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        if size == 0 {
            debug!(url, "HEAD request did not report a content length");
        }

        Ok(Self {
            url: url.to_string(),
            size,
            client,
            full_body: Mutex::new(None),
        })
    }
}

impl RangeReader for HttpRangeReader {
    fn read_range(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        if let Some(body) = self.full_body.lock().unwrap().as_ref() {
            return slice_range(body, offset, length, &self.url);
        }

        let range = format!("bytes={}-{}", offset, offset + length as u64 - 1);
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::RANGE, range)
            .send()?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => Ok(response.bytes()?.to_vec()),
            StatusCode::OK => {
                // The server ignored the Range header. Keep the body and
                // serve this and all later reads from memory.
                warn!(
                    url = %self.url,
                    "server ignored range request; falling back to full download"
                );
                let body = Arc::new(response.bytes()?.to_vec());
                let slice = slice_range(&body, offset, length, &self.url)?;
                *self.full_body.lock().unwrap() = Some(body);
                Ok(slice)
            }
            status => Err(Error::Catalog(format!(
                "range request for {} failed: {status}",
                self.url
            ))),
        }
    }

    fn size(&self) -> u64 {
        if let Some(body) = self.full_body.lock().unwrap().as_ref() {
            return body.len() as u64;
        }
        self.size
    }

    fn identifier(&self) -> &str {
        &self.url
    }
}

fn slice_range(data: &[u8], offset: u64, length: usize, identifier: &str) -> Result<Vec<u8>> {
    let start = usize::try_from(offset)
        .map_err(|_| Error::Tiff(format!("offset {offset} out of range for {identifier}")))?;
    let end = start.checked_add(length).filter(|&end| end <= data.len());
    match end {
        Some(end) => Ok(data[start..end].to_vec()),
        None => Err(Error::Tiff(format!(
            "read of {length} bytes at offset {offset} exceeds {} available in {identifier}",
            data.len()
        ))),
    }
}

/// Create a range reader from a path or URL.
pub fn create_range_reader(source: &str) -> Result<Arc<dyn RangeReader>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        Ok(Arc::new(HttpRangeReader::new(source)?))
    } else {
        Ok(Arc::new(LocalRangeReader::new(source)?))
    }
}
