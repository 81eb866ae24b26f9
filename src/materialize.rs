//! Turns an uploaded file, an inline base64 string or a remote URL into a
//! temporary file on local disk.
//!
//! A [`LocalImage`] owns its file. Dropping the handle deletes the file, so
//! every exit path of a handler (success, rejected input, engine failure or
//! panic unwind) releases what it created.

use crate::config::{DEFAULT_EXTENSION, MAX_PAYLOAD_BYTES, TEMP_PREFIX};
use crate::payload::{self, Payload};
use crate::server::body::{RequestBody, UploadedFile};
use crate::server::ApiError;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempPath;
use tracing::*;

/// The three ways a client can hand over one image
#[derive(Debug)]
pub enum ImageReference<'a> {
    UploadedFile(&'a UploadedFile),
    InlineBase64(Vec<u8>),
    RemoteUrl(&'a str),
}

impl<'a> ImageReference<'a> {
    /// Locate the image named `field` in a request body.
    ///
    /// A file part wins over a textual field of the same name.
    pub fn find(body: &'a RequestBody, field: &str) -> Result<Self, ApiError> {
        if let Some(file) = body.file(field) {
            if file.filename.is_empty() {
                return Err(ApiError::invalid_input(format!(
                    "No file uploaded for '{field}'"
                )));
            }
            return Ok(ImageReference::UploadedFile(file));
        }

        let value = body
            .field(field)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::invalid_input(format!("'{field}' not found in request")))?;

        Ok(match payload::parse(value) {
            Payload::Base64(bytes) => ImageReference::InlineBase64(bytes),
            Payload::Url(url) => ImageReference::RemoteUrl(url),
        })
    }
}

/// A request-scoped image file. The file is removed when the handle drops.
#[derive(Debug)]
pub struct LocalImage {
    path: Option<TempPath>,
}

impl LocalImage {
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Delete the file now. A file that is already gone is not an error.
    pub fn release(mut self) -> io::Result<()> {
        match self.path.take() {
            Some(path) => remove(path),
            None => Ok(()),
        }
    }
}

impl Drop for LocalImage {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = remove(path) {
                warn!("failed to remove temporary image: {e}");
            }
        }
    }
}

fn remove(path: TempPath) -> io::Result<()> {
    let removed = path.to_path_buf();
    match path.close() {
        Ok(()) => {
            debug!("removed {}", removed.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Suffix for an uploaded file: its own extension, or the default
pub fn extension_for(filename: &str) -> String {
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!(".{ext}"),
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// Creates [`LocalImage`]s. Holds the HTTP client used for URL inputs.
#[derive(Debug, Clone)]
pub struct Materializer {
    client: reqwest::Client,
    temp_dir: PathBuf,
    /// Largest image accepted from a URL
    max_download_bytes: usize,
}

impl Materializer {
    pub fn new(client: reqwest::Client, temp_dir: PathBuf) -> Self {
        Materializer {
            client,
            temp_dir,
            max_download_bytes: MAX_PAYLOAD_BYTES,
        }
    }

    pub fn with_max_download_bytes(mut self, limit: usize) -> Self {
        self.max_download_bytes = limit;
        self
    }

    /// A materializer writing to `temp_dir` with its own HTTP client
    pub fn with_fetch_timeout(temp_dir: PathBuf, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Materializer::new(client, temp_dir))
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Produce exactly one new local file for the image named `field`
    #[tracing::instrument(skip(self, body))]
    pub async fn materialize(&self, body: &RequestBody, field: &str) -> Result<LocalImage, ApiError> {
        let image = match ImageReference::find(body, field)? {
            ImageReference::UploadedFile(file) => {
                debug!("'{field}' is an uploaded file ({:?})", file.filename);
                self.write(&file.data, &extension_for(&file.filename))?
            }
            ImageReference::InlineBase64(bytes) => {
                debug!("'{field}' is inline base64 ({} bytes)", bytes.len());
                self.write(&bytes, DEFAULT_EXTENSION)?
            }
            ImageReference::RemoteUrl(url) => {
                debug!("'{field}' is a remote reference, fetching");
                let bytes = self.fetch(url).await?;
                self.write(&bytes, DEFAULT_EXTENSION)?
            }
        };

        debug!("materialized '{field}' at {}", image.path().display());
        Ok(image)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let failed = || ApiError::invalid_input("Failed to download image from URL");

        let too_large = || {
            ApiError::invalid_input(format!(
                "Image at URL exceeds {} bytes",
                self.max_download_bytes
            ))
        };

        let mut resp = self.client.get(url).send().await.map_err(|e| {
            warn!("image download failed: {e}");
            failed()
        })?;

        if !resp.status().is_success() {
            warn!("image download returned {}", resp.status());
            return Err(failed());
        }

        if let Some(len) = resp.content_length() {
            if len > self.max_download_bytes as u64 {
                warn!("image download announced {len} bytes");
                return Err(too_large());
            }
        }

        let mut bytes = Vec::new();
        loop {
            let chunk = resp.chunk().await.map_err(|e| {
                warn!("image download interrupted: {e}");
                failed()
            })?;
            let Some(chunk) = chunk else { break };
            if bytes.len() + chunk.len() > self.max_download_bytes {
                warn!("image download exceeded {} bytes", self.max_download_bytes);
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(bytes)
    }

    /// Write `data` verbatim to a fresh uniquely named file
    pub fn write(&self, data: &[u8], suffix: &str) -> io::Result<LocalImage> {
        let mut file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(suffix)
            .tempfile_in(&self.temp_dir)?;
        file.write_all(data)?;
        file.flush()?;

        Ok(LocalImage {
            path: Some(file.into_temp_path()),
        })
    }
}
