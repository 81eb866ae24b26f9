use crate::engine::{EngineError, FaceEngine};
use crate::materialize::Materializer;
use actix_web::error::QueryPayloadError;
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

pub mod body;
pub mod protocol;
pub mod routes;

/// Errors surfaced to HTTP clients. Every variant renders as a JSON body with
/// a `detail` key and never includes local paths.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or unusable image input (400)
    #[error("{0}")]
    InvalidInput(String),

    /// The engine flagged the image as a presentation attack (422)
    #[error("{message}")]
    Spoofed { message: String },

    /// Anything else that went wrong while serving the request (500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        ApiError::InvalidInput(msg.into())
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl actix_web::error::ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Spoofed { message } => {
                let spoofed = protocol::SpoofedResponse {
                    message: message.as_str(),
                };
                json!({ "detail": spoofed })
            }
            other => json!({ "detail": other.to_string() }),
        };

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Spoofed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> ApiError {
        ApiError::internal(err)
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(err: actix_web::error::BlockingError) -> ApiError {
        ApiError::internal(err)
    }
}

/// Decides from an engine failure message whether the engine rejected the
/// image as spoofed
pub type SpoofClassifier = fn(&str) -> bool;

/// The engine's current way of reporting a liveness failure
pub fn message_signals_spoof(message: &str) -> bool {
    message.to_lowercase().contains("spoof detected")
}

/// Shared per-process state handed to every handler
pub struct AppState {
    pub engine: Arc<dyn FaceEngine>,
    pub materializer: Materializer,
    pub spoof_classifier: SpoofClassifier,
    /// Upper bound on a buffered request body
    pub max_payload_bytes: usize,
}

impl AppState {
    pub fn new(engine: Arc<dyn FaceEngine>, materializer: Materializer) -> Self {
        AppState {
            engine,
            materializer,
            spoof_classifier: message_signals_spoof,
            max_payload_bytes: crate::config::MAX_PAYLOAD_BYTES,
        }
    }

    pub fn with_spoof_classifier(mut self, classifier: SpoofClassifier) -> Self {
        self.spoof_classifier = classifier;
        self
    }

    /// Cap request bodies and URL downloads at `limit` bytes
    pub fn with_max_payload_bytes(mut self, limit: usize) -> Self {
        self.max_payload_bytes = limit;
        self.materializer = self.materializer.with_max_download_bytes(limit);
        self
    }

    /// Map an engine failure to the client-facing error. When `check_spoof`
    /// is set, failures the classifier recognizes become
    /// [`ApiError::Spoofed`]; everything else is internal.
    pub fn engine_failure(
        &self,
        err: EngineError,
        check_spoof: bool,
        stage: &str,
    ) -> ApiError {
        let message = err.to_string();
        if check_spoof && (self.spoof_classifier)(&message) {
            ApiError::Spoofed {
                message: format!(
                    "Spoofed image detected during {stage}. you can disable anti spoofing by setting `anti_spoofing=false`"
                ),
            }
        } else {
            ApiError::Internal(message)
        }
    }
}

fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::invalid_input(format!("Invalid query parameters: {err}")).into()
}

/// Register the face routes and their extractor settings
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::QueryConfig::default().error_handler(query_error))
        .service(routes::represent)
        .service(routes::analyze)
        .service(routes::verify);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::MessageBody;
    use actix_web::ResponseError;

    fn body_json(err: &ApiError) -> serde_json::Value {
        let bytes = err.error_response().into_body().try_into_bytes().unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_spoof_classifier() {
        assert!(message_signals_spoof("Spoof detected in the given image."));
        assert!(message_signals_spoof("ERROR: SPOOF DETECTED"));
        assert!(!message_signals_spoof("Face could not be detected"));
        assert!(!message_signals_spoof("spoofing check failed"));
    }

    #[test]
    fn test_invalid_input_response() {
        let err = ApiError::invalid_input("'img' not found in request");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&err), json!({"detail": "'img' not found in request"}));
    }

    #[test]
    fn test_spoofed_response() {
        let err = ApiError::Spoofed {
            message: "Spoofed image detected".into(),
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(&err),
            json!({"detail": {"spoofed": true, "message": "Spoofed image detected"}})
        );
    }

    #[test]
    fn test_internal_response() {
        let err = ApiError::internal("boom");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(&err), json!({"detail": "Internal error: boom"}));
    }
}
