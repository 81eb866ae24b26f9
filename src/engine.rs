//! The face engine: detection, alignment, embeddings, attribute analysis and
//! anti-spoofing live behind [`FaceEngine`]. The server only ever hands it a
//! local file path and a parameter bag.

use crate::normalize::FaceValue;
use crate::server::protocol::{AnalyzeParams, RepresentParams, VerifyParams};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::*;

/// Failures reported by a face engine. The display string is the engine's own
/// message, which callers may inspect.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Failed(String),

    #[error("failed to run face engine: {0}")]
    Launch(#[from] std::io::Error),

    #[error("malformed face engine response: {0}")]
    Response(#[from] serde_json::Error),
}

/// Outcome of comparing two faces
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verification {
    pub verified: bool,

    /// Distance, threshold, model and whatever else the engine reports
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// A face-capability provider. Calls may block for the duration of model
/// inference; implementations must be safe to share across server workers.
pub trait FaceEngine: Send + Sync {
    /// One embedding record per detected face
    fn extract_embeddings(
        &self,
        img_path: &Path,
        params: &RepresentParams,
    ) -> Result<Vec<Value>, EngineError>;

    /// Attribute predictions (age, gender, race, emotion, ...) per face
    fn analyze_attributes(
        &self,
        img_path: &Path,
        params: &AnalyzeParams,
    ) -> Result<FaceValue, EngineError>;

    /// Decide whether two images show the same person
    fn verify_pair(
        &self,
        img1_path: &Path,
        img2_path: &Path,
        params: &VerifyParams,
    ) -> Result<Verification, EngineError>;
}

/// The single JSON document written to the engine program's stdin
#[derive(Debug, Serialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum EngineRequest<'a> {
    Represent {
        img_path: &'a Path,
        #[serde(flatten)]
        params: &'a RepresentParams,
    },
    Analyze {
        img_path: &'a Path,
        #[serde(flatten)]
        params: &'a AnalyzeParams,
    },
    Verify {
        img1_path: &'a Path,
        img2_path: &'a Path,
        #[serde(flatten)]
        params: &'a VerifyParams,
    },
}

/// Runs an external face-capability program once per call.
///
/// The request goes to the program's stdin as JSON and the result is read
/// from its stdout. A non-zero exit status is a failure whose message is the
/// program's stderr.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: String, args: Vec<String>) -> Self {
        CommandEngine { program, args }
    }

    /// Build from a whitespace-separated command line
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(CommandEngine::new(program, words.collect()))
    }

    fn call(&self, request: &EngineRequest<'_>) -> Result<Value, EngineError> {
        let input = serde_json::to_vec(request)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        debug!("started face engine (pid = {})", child.id());

        // An engine may exit before reading its request; its status and
        // stderr still decide the outcome.
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&input) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!("face engine closed stdin early");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let output = child.wait_with_output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match stderr.trim() {
                "" => format!("face engine exited with {}", output.status),
                msg => msg.to_string(),
            };
            return Err(EngineError::Failed(message));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

impl FaceEngine for CommandEngine {
    fn extract_embeddings(
        &self,
        img_path: &Path,
        params: &RepresentParams,
    ) -> Result<Vec<Value>, EngineError> {
        let out = self.call(&EngineRequest::Represent { img_path, params })?;
        Ok(serde_json::from_value(out)?)
    }

    fn analyze_attributes(
        &self,
        img_path: &Path,
        params: &AnalyzeParams,
    ) -> Result<FaceValue, EngineError> {
        let out = self.call(&EngineRequest::Analyze { img_path, params })?;
        Ok(out.into())
    }

    fn verify_pair(
        &self,
        img1_path: &Path,
        img2_path: &Path,
        params: &VerifyParams,
    ) -> Result<Verification, EngineError> {
        let out = self.call(&EngineRequest::Verify {
            img1_path,
            img2_path,
            params,
        })?;
        Ok(serde_json::from_value(out)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn represent_params() -> RepresentParams {
        RepresentParams {
            model_name: "SFace".into(),
            detector_backend: "yunet".into(),
            enforce_detection: true,
            align: true,
            anti_spoofing: false,
            max_faces: Some(2),
        }
    }

    #[test]
    fn test_request_wire_format() {
        let params = represent_params();
        let req = EngineRequest::Represent {
            img_path: Path::new("/tmp/face-api-1.jpg"),
            params: &params,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "operation": "represent",
                "img_path": "/tmp/face-api-1.jpg",
                "model_name": "SFace",
                "detector_backend": "yunet",
                "enforce_detection": true,
                "align": true,
                "anti_spoofing": false,
                "max_faces": 2
            })
        );
    }

    #[test]
    fn test_verification_keeps_details() {
        let v: Verification = serde_json::from_value(json!({
            "verified": false,
            "distance": 0.71,
            "threshold": 0.593
        }))
        .unwrap();
        assert!(!v.verified);
        assert_eq!(v.details["distance"], json!(0.71));
        assert_eq!(serde_json::to_value(&v).unwrap()["threshold"], json!(0.593));
    }

    #[test]
    fn test_command_line() {
        let engine = CommandEngine::from_command_line("python3 bridge.py --cpu").unwrap();
        assert_eq!(engine.program, "python3");
        assert_eq!(engine.args, vec!["bridge.py", "--cpu"]);
        assert!(CommandEngine::from_command_line("   ").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_success() {
        let engine = CommandEngine::new(
            "sh".into(),
            vec![
                "-c".into(),
                r#"cat > /dev/null; echo '[{"embedding": [0.1, 0.2], "face_confidence": 0.9}]'"#
                    .into(),
            ],
        );
        let out = engine
            .extract_embeddings(Path::new("/tmp/x.jpg"), &represent_params())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["embedding"], json!([0.1, 0.2]));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_failure_carries_stderr() {
        let engine = CommandEngine::new(
            "sh".into(),
            vec![
                "-c".into(),
                "cat > /dev/null; echo 'Spoof detected in the given image.' >&2; exit 1".into(),
            ],
        );
        let err = engine
            .extract_embeddings(Path::new("/tmp/x.jpg"), &represent_params())
            .unwrap_err();
        assert_eq!(err.to_string(), "Spoof detected in the given image.");
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_without_reading_stdin() {
        let engine = CommandEngine::new(
            "sh".into(),
            vec![
                "-c".into(),
                "echo 'Spoof detected in the given image.' >&2; exit 1".into(),
            ],
        );
        for _ in 0..50 {
            let err = engine
                .extract_embeddings(Path::new("/tmp/x.jpg"), &represent_params())
                .unwrap_err();
            assert_eq!(err.to_string(), "Spoof detected in the given image.");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_command_garbage_output() {
        let engine = CommandEngine::new(
            "sh".into(),
            vec!["-c".into(), "cat > /dev/null; echo not json".into()],
        );
        let err = engine
            .extract_embeddings(Path::new("/tmp/x.jpg"), &represent_params())
            .unwrap_err();
        assert!(matches!(err, EngineError::Response(_)));
    }

    #[test]
    fn test_missing_program() {
        let engine = CommandEngine::new("/nonexistent/face-engine".into(), vec![]);
        let err = engine
            .extract_embeddings(Path::new("/tmp/x.jpg"), &represent_params())
            .unwrap_err();
        assert!(matches!(err, EngineError::Launch(_)));
    }
}
