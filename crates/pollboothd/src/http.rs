//! HTTP routes: `POST /verify` and `GET /health`.

use crate::engine::EngineHandle;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use pollbooth_core::{Verification, VerificationRequest, VerifyConfig};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Shared, read-only state for every worker.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub verify: Arc<VerifyConfig>,
    pub models_loaded: bool,
}

/// Register the routes and cap request bodies at `body_limit` bytes.
///
/// Oversized bodies are refused with 413 before the handler runs.
pub fn configure(cfg: &mut web::ServiceConfig, body_limit: usize) {
    cfg.app_data(web::PayloadConfig::new(body_limit))
        .route("/verify", web::post().to(verify_face))
        .route("/health", web::get().to(health));
}

/// Compare the two images in the body and answer 200 / 401 / 400 / 500.
async fn verify_face(body: web::Bytes, state: web::Data<AppState>) -> HttpResponse {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("verify", %request_id);

    async move {
        tracing::debug!(bytes = body.len(), "verification requested");
        let request = VerificationRequest::from_body(&body);
        let verification = match pollbooth_core::require_images(&request) {
            Err(rejected) => rejected,
            Ok((img1, img2)) => {
                let outcome = state
                    .engine
                    .compare(img1, img2, &state.verify.compare_spec())
                    .await;
                pollbooth_core::conclude(outcome, &state.verify)
            }
        };
        respond(verification)
    }
    .instrument(span)
    .await
}

fn respond(verification: Verification) -> HttpResponse {
    let status = StatusCode::from_u16(verification.status.http_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status).json(&verification.result)
}

/// Liveness plus model state. Always 200 so a degraded process can be probed.
async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.verify.model,
        "detector": state.verify.detector,
        "threshold": state.verify.threshold,
        "models_loaded": state.models_loaded,
    }))
}
