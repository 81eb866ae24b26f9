use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;

/// Spoofing rejection, rendered as `{"spoofed": true, "message": ...}`
pub struct SpoofedResponse<'a> {
    pub message: &'a str,
}

impl Serialize for SpoofedResponse<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("spoofed", &true)?;
        map.serialize_entry("message", self.message)?;
        map.end()
    }
}

/// Permissive boolean query parameter: "true", "1" and "yes" (any case) are
/// true, anything else present is false, and absence means `default`.
pub fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value {
        None => default,
        Some(v) => ["true", "1", "yes"]
            .iter()
            .any(|t| v.eq_ignore_ascii_case(t)),
    }
}

/// Split a comma separated action list into trimmed, non-empty tokens,
/// keeping order and duplicates.
pub fn parse_actions(actions: &str) -> Vec<String> {
    actions
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

/// Query string of `/represent`
#[derive(Debug, Deserialize)]
pub struct RepresentQuery {
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_detector")]
    pub detector_backend: String,
    pub enforce_detection: Option<String>,
    pub align: Option<String>,
    pub anti_spoofing: Option<String>,
    pub max_faces: Option<u32>,
}

/// Query string of `/analyze`
#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    #[serde(default = "default_actions")]
    pub actions: String,
    #[serde(default = "default_analyze_detector")]
    pub detector_backend: String,
    pub enforce_detection: Option<String>,
    pub align: Option<String>,
    pub anti_spoofing: Option<String>,
}

/// Query string of `/verify`
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_detector")]
    pub detector_backend: String,
    #[serde(default = "default_distance_metric")]
    pub distance_metric: String,
    pub enforce_detection: Option<String>,
    pub align: Option<String>,
    pub anti_spoofing: Option<String>,
}

fn default_model_name() -> String {
    "SFace".into()
}

fn default_detector() -> String {
    "yunet".into()
}

fn default_analyze_detector() -> String {
    "opencv".into()
}

fn default_actions() -> String {
    "age,gender,race,emotion".into()
}

fn default_distance_metric() -> String {
    "cosine".into()
}

/// Settings for one embedding extraction. Built once per request.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RepresentParams {
    pub model_name: String,
    pub detector_backend: String,
    pub enforce_detection: bool,
    pub align: bool,
    pub anti_spoofing: bool,
    pub max_faces: Option<u32>,
}

/// Settings for one attribute analysis
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AnalyzeParams {
    pub actions: Vec<String>,
    pub detector_backend: String,
    pub enforce_detection: bool,
    pub align: bool,
    pub anti_spoofing: bool,
}

/// Settings for one pairwise verification
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VerifyParams {
    pub model_name: String,
    pub detector_backend: String,
    pub distance_metric: String,
    pub enforce_detection: bool,
    pub align: bool,
    pub anti_spoofing: bool,
}

impl From<RepresentQuery> for RepresentParams {
    fn from(q: RepresentQuery) -> Self {
        RepresentParams {
            model_name: q.model_name,
            detector_backend: q.detector_backend,
            enforce_detection: parse_bool(q.enforce_detection.as_deref(), true),
            align: parse_bool(q.align.as_deref(), true),
            anti_spoofing: parse_bool(q.anti_spoofing.as_deref(), true),
            max_faces: q.max_faces,
        }
    }
}

impl From<AnalyzeQuery> for AnalyzeParams {
    fn from(q: AnalyzeQuery) -> Self {
        AnalyzeParams {
            actions: parse_actions(&q.actions),
            detector_backend: q.detector_backend,
            enforce_detection: parse_bool(q.enforce_detection.as_deref(), true),
            align: parse_bool(q.align.as_deref(), true),
            anti_spoofing: parse_bool(q.anti_spoofing.as_deref(), true),
        }
    }
}

impl From<VerifyQuery> for VerifyParams {
    fn from(q: VerifyQuery) -> Self {
        VerifyParams {
            model_name: q.model_name,
            detector_backend: q.detector_backend,
            distance_metric: q.distance_metric,
            enforce_detection: parse_bool(q.enforce_detection.as_deref(), true),
            align: parse_bool(q.align.as_deref(), true),
            anti_spoofing: parse_bool(q.anti_spoofing.as_deref(), true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        for v in ["true", "TRUE", "True", "1", "yes", "YeS"] {
            assert!(parse_bool(Some(v), false), "{v}");
        }
        for v in ["false", "no", "0", "", "on", "y", " true"] {
            assert!(!parse_bool(Some(v), true), "{v}");
        }
        assert!(parse_bool(None, true));
        assert!(!parse_bool(None, false));
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!(
            parse_actions(" age, ,gender,,age ,emotion"),
            vec!["age", "gender", "age", "emotion"]
        );
        assert!(parse_actions(" , ").is_empty());
    }

    #[test]
    fn test_represent_defaults() {
        let q: RepresentQuery = serde_urlencoded::from_str("").unwrap();
        assert_eq!(
            RepresentParams::from(q),
            RepresentParams {
                model_name: "SFace".into(),
                detector_backend: "yunet".into(),
                enforce_detection: true,
                align: true,
                anti_spoofing: true,
                max_faces: None,
            }
        );
    }

    #[test]
    fn test_analyze_query() {
        let q: AnalyzeQuery =
            serde_urlencoded::from_str("actions=age,emotion&anti_spoofing=no").unwrap();
        let params = AnalyzeParams::from(q);
        assert_eq!(params.actions, vec!["age", "emotion"]);
        assert_eq!(params.detector_backend, "opencv");
        assert!(!params.anti_spoofing);
        assert!(params.align);
    }

    #[test]
    fn test_verify_query() {
        let q: VerifyQuery = serde_urlencoded::from_str(
            "model_name=ArcFace&distance_metric=euclidean_l2&enforce_detection=0",
        )
        .unwrap();
        let params = VerifyParams::from(q);
        assert_eq!(params.model_name, "ArcFace");
        assert_eq!(params.distance_metric, "euclidean_l2");
        assert!(!params.enforce_detection);
    }

    #[test]
    fn test_spoofed_body() {
        let body = serde_json::to_value(SpoofedResponse { message: "nope" }).unwrap();
        assert_eq!(body, serde_json::json!({"spoofed": true, "message": "nope"}));
    }
}
