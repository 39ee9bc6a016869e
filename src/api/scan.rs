use crate::config::Config;
use crate::engine::encoder::HttpFaceEncoder;
use crate::engine::pipeline::{self, ScanRejection, ScanRequest, SubmitError};
use crate::model::scan::ScanType;
use actix_web::{HttpResponse, web};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct ScanPayload {
    #[schema(example = 1)]
    pub kiosk_id: u64,
    /// Device identifier token issued to this kiosk at registration
    pub device_token: String,
    #[schema(example = 42)]
    /// Claimed member identity; omit to identify by face alone
    pub member_id: Option<u64>,
    /// base64-encoded probe image captured by the kiosk camera
    pub image: String,
    #[schema(example = 23.7806)]
    pub latitude: Option<f64>,
    #[schema(example = 90.2794)]
    pub longitude: Option<f64>,
}

/// Kiosk check-in endpoint
#[utoipa::path(
    post,
    path = "/kiosk/check-in",
    request_body = ScanPayload,
    responses(
        (status = 200, description = "Checked in successfully", body = Object, example = json!({
            "message": "Checked in successfully"
        })),
        (status = 400, description = "Scan rejected", body = Object, example = json!({
            "message": "Location Does Not Match"
        })),
        (status = 401, description = "Device token rejected", body = Object, example = json!({
            "message": "Device Identifier Token Expired"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Kiosk"
)]
pub async fn check_in(
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    encoder: web::Data<HttpFaceEncoder>,
    payload: web::Json<ScanPayload>,
) -> actix_web::Result<HttpResponse> {
    handle_scan(pool, config, encoder, payload, ScanType::CheckIn).await
}

/// Kiosk check-out endpoint
#[utoipa::path(
    post,
    path = "/kiosk/check-out",
    request_body = ScanPayload,
    responses(
        (status = 200, description = "Checked out successfully", body = Object, example = json!({
            "message": "Checked out successfully"
        })),
        (status = 400, description = "Scan rejected"),
        (status = 401, description = "Device token rejected"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Kiosk"
)]
pub async fn check_out(
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    encoder: web::Data<HttpFaceEncoder>,
    payload: web::Json<ScanPayload>,
) -> actix_web::Result<HttpResponse> {
    handle_scan(pool, config, encoder, payload, ScanType::CheckOut).await
}

async fn handle_scan(
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    encoder: web::Data<HttpFaceEncoder>,
    payload: web::Json<ScanPayload>,
    scan_type: ScanType,
) -> actix_web::Result<HttpResponse> {
    let image = match STANDARD.decode(&payload.image) {
        Ok(bytes) => bytes,
        Err(_) => {
            return Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "message": "Image could not be decoded"
            })));
        }
    };

    let req = ScanRequest {
        kiosk_id: payload.kiosk_id,
        device_token: payload.device_token.clone(),
        member_id: payload.member_id,
        image,
        latitude: payload.latitude,
        longitude: payload.longitude,
        scan_type,
        at: chrono::Local::now().naive_local(),
    };

    match pipeline::submit_scan(pool.get_ref(), config.get_ref(), encoder.get_ref(), &req).await {
        Ok(scan) => {
            let message = match scan_type {
                ScanType::CheckIn => "Checked in successfully",
                ScanType::CheckOut => "Checked out successfully",
            };
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "message": message,
                "scan": scan
            })))
        }
        Err(SubmitError::Rejected(rejection)) => {
            tracing::warn!(
                member_id = ?payload.member_id,
                kiosk_id = payload.kiosk_id,
                reason = %rejection,
                "scan rejected"
            );
            let body = serde_json::json!({ "message": rejection.to_string() });
            let response = match rejection {
                ScanRejection::TokenMissing
                | ScanRejection::TokenExpired
                | ScanRejection::TokenMismatch => HttpResponse::Unauthorized().json(body),
                _ => HttpResponse::BadRequest().json(body),
            };
            Ok(response)
        }
        Err(SubmitError::Internal(e)) => {
            tracing::error!(error = %e, member_id = ?payload.member_id, "scan submission failed");
            Err(actix_web::error::ErrorInternalServerError(
                "Internal Server Error",
            ))
        }
    }
}
