//! Reads a request body once and splits it into uploaded files and textual
//! fields, whatever the encoding.
//!
//! `multipart/form-data` bodies are walked part by part. Any other body is
//! tried as a JSON document first, then as a url-encoded form, and treated as
//! empty when neither fits.

use super::ApiError;
use actix_multipart::Multipart;
use actix_web::http::header::CONTENT_TYPE;
use actix_web::web::{self, Bytes, BytesMut};
use actix_web::HttpRequest;
use serde_json::Value;
use std::collections::HashMap;
use tokio_stream::StreamExt;
use tracing::*;

/// A file part of a multipart upload
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Bytes,
}

impl std::fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UploadedFile {{ filename: {:?}, data: <{} bytes> }}",
            self.filename,
            self.data.len()
        )
    }
}

/// Structured fields of a non-multipart body
#[derive(Debug, Default, Clone, PartialEq)]
pub enum Fields {
    Json(serde_json::Map<String, Value>),
    Form(HashMap<String, String>),
    #[default]
    Absent,
}

impl Fields {
    /// Decode a buffered body: JSON object, then url-encoded form, else nothing
    pub fn decode(body: &[u8]) -> Fields {
        if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
            return Fields::Json(map);
        }
        match serde_urlencoded::from_bytes::<Vec<(String, String)>>(body) {
            Ok(pairs) if !pairs.is_empty() => Fields::Form(pairs.into_iter().collect()),
            _ => Fields::Absent,
        }
    }

    /// A field's value. Non-string JSON values count as missing.
    pub fn get(&self, name: &str) -> Option<&str> {
        match self {
            Fields::Json(map) => map.get(name).and_then(Value::as_str),
            Fields::Form(map) => map.get(name).map(String::as_str),
            Fields::Absent => None,
        }
    }
}

/// Everything a handler can pull images out of
#[derive(Debug, Default)]
pub struct RequestBody {
    pub files: HashMap<String, UploadedFile>,
    pub fields: Fields,
}

impl RequestBody {
    /// Consume the request payload
    pub async fn read(
        req: &HttpRequest,
        payload: web::Payload,
        limit: usize,
    ) -> Result<RequestBody, ApiError> {
        if is_multipart(req) {
            Self::read_multipart(req, payload, limit).await
        } else {
            let body = read_to_limit(payload, limit).await?;
            Ok(RequestBody {
                files: HashMap::new(),
                fields: Fields::decode(&body),
            })
        }
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name)
    }

    async fn read_multipart(
        req: &HttpRequest,
        payload: web::Payload,
        limit: usize,
    ) -> Result<RequestBody, ApiError> {
        let mut multipart = Multipart::new(req.headers(), payload);
        let mut files = HashMap::new();
        let mut form = HashMap::new();
        let mut total = 0usize;

        while let Some(field) = multipart.next().await {
            let mut field = field.map_err(malformed)?;

            let (name, filename) = match field.content_disposition() {
                Some(disposition) => (
                    disposition.get_name().map(str::to_string),
                    disposition.get_filename().map(str::to_string),
                ),
                None => (None, None),
            };

            let mut data = BytesMut::new();
            while let Some(chunk) = field.next().await {
                let chunk = chunk.map_err(malformed)?;
                total += chunk.len();
                if total > limit {
                    return Err(too_large(limit));
                }
                data.extend_from_slice(&chunk);
            }

            let Some(name) = name else {
                debug!("skipping unnamed multipart part");
                continue;
            };

            match filename {
                Some(filename) => {
                    debug!("received file part '{name}' ({} bytes)", data.len());
                    files.insert(
                        name,
                        UploadedFile {
                            filename,
                            data: data.freeze(),
                        },
                    );
                }
                None => {
                    let value = String::from_utf8(data.to_vec()).map_err(|_| {
                        ApiError::invalid_input(format!("Field '{name}' is not valid UTF-8"))
                    })?;
                    form.insert(name, value);
                }
            }
        }

        let fields = if form.is_empty() {
            Fields::Absent
        } else {
            Fields::Form(form)
        };

        Ok(RequestBody { files, fields })
    }
}

fn is_multipart(req: &HttpRequest) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

async fn read_to_limit(mut payload: web::Payload, limit: usize) -> Result<Bytes, ApiError> {
    let mut body = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(malformed)?;
        if body.len() + chunk.len() > limit {
            return Err(too_large(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

fn malformed(err: impl std::fmt::Display) -> ApiError {
    ApiError::invalid_input(format!("Malformed request body: {err}"))
}

fn too_large(limit: usize) -> ApiError {
    ApiError::invalid_input(format!("Request body exceeds {limit} bytes"))
}
