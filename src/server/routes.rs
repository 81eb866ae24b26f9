//! The user-facing face endpoints. Each handler reads the body, materializes
//! its images, runs the engine on the blocking pool and maps failures.
//!
//! Temporary images are [`LocalImage`](crate::materialize::LocalImage)s
//! owned by the handler's stack frame, so they are deleted on every return
//! path, including an early `?`.

use super::body::RequestBody;
use super::protocol::{
    AnalyzeParams, AnalyzeQuery, RepresentParams, RepresentQuery, VerifyParams, VerifyQuery,
};
use super::{ApiError, AppState};
use crate::normalize::normalize;
use actix_web::{post, web, HttpRequest, Responder};
use serde_json::Value;
use tracing::*;

type Result<T> = std::result::Result<T, ApiError>;

/// Extract face embeddings from one image
#[post("/represent")]
pub async fn represent(
    req: HttpRequest,
    payload: web::Payload,
    query: web::Query<RepresentQuery>,
    state: web::Data<AppState>,
) -> Result<impl Responder> {
    let params = RepresentParams::from(query.into_inner());
    let body = RequestBody::read(&req, payload, state.max_payload_bytes).await?;

    let image = state.materializer.materialize(&body, "img").await?;

    let engine = state.engine.clone();
    let path = image.path().to_path_buf();
    info!(model = %params.model_name, detector = %params.detector_backend, "represent");

    let result = web::block(move || engine.extract_embeddings(&path, &params)).await?;
    let records = result.map_err(|e| {
        warn!("represent failed: {e}");
        state.engine_failure(e, true, "representation extraction")
    })?;

    info!("represent found {} face(s)", records.len());
    Ok(web::Json(records))
}

/// Predict facial attributes for one image
#[post("/analyze")]
pub async fn analyze(
    req: HttpRequest,
    payload: web::Payload,
    query: web::Query<AnalyzeQuery>,
    state: web::Data<AppState>,
) -> Result<impl Responder> {
    let params = AnalyzeParams::from(query.into_inner());
    let body = RequestBody::read(&req, payload, state.max_payload_bytes).await?;

    let image = state.materializer.materialize(&body, "img").await?;

    let engine = state.engine.clone();
    let path = image.path().to_path_buf();
    info!(actions = ?params.actions, detector = %params.detector_backend, "analyze");

    let result = web::block(move || engine.analyze_attributes(&path, &params)).await?;
    let analysis = result.map_err(|e| {
        warn!("analyze failed: {e}");
        state.engine_failure(e, true, "facial attribute analysis")
    })?;

    Ok(web::Json(Value::from(normalize(analysis))))
}

/// Decide whether two images show the same person.
///
/// The engine does not report spoofing distinctly for this operation, so
/// every engine failure here is internal.
#[post("/verify")]
pub async fn verify(
    req: HttpRequest,
    payload: web::Payload,
    query: web::Query<VerifyQuery>,
    state: web::Data<AppState>,
) -> Result<impl Responder> {
    let params = VerifyParams::from(query.into_inner());
    let body = RequestBody::read(&req, payload, state.max_payload_bytes).await?;

    let image1 = state.materializer.materialize(&body, "img1").await?;
    let image2 = state.materializer.materialize(&body, "img2").await?;

    let engine = state.engine.clone();
    let path1 = image1.path().to_path_buf();
    let path2 = image2.path().to_path_buf();
    info!(
        model = %params.model_name,
        metric = %params.distance_metric,
        "verify"
    );

    let result = web::block(move || engine.verify_pair(&path1, &path2, &params)).await?;
    let verification = result.map_err(|e| {
        warn!("verify failed: {e}");
        state.engine_failure(e, false, "verification")
    })?;

    info!("verify: verified = {}", verification.verified);
    Ok(web::Json(verification))
}
