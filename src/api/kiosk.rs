use crate::auth::auth::AuthUser;
use crate::auth::device::mint_device_token;
use crate::config::Config;
use actix_web::{HttpResponse, Responder, web};
use chrono::Duration;
use serde::Serialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct DeviceTokenResponse {
    /// Device identifier token the kiosk must present with every scan
    pub device_token: String,
    #[schema(example = "2026-09-02T09:00:00", value_type = String, format = "date-time")]
    pub expires_at: chrono::NaiveDateTime,
}

/* =========================
Issue a device token
========================= */
/// Re-issuing replaces the stored token; any previously handed-out token
/// stops verifying immediately.
#[utoipa::path(
    post,
    path = "/api/v1/kiosks/{kiosk_id}/token",
    params(("kiosk_id" = u64, Path, description = "Kiosk to issue a token for")),
    responses(
        (status = 200, description = "Device token issued", body = DeviceTokenResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Kiosk not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Kiosk"
)]
pub async fn issue_token(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let kiosk_id = path.into_inner();

    let organization_id: Option<u64> = sqlx::query_scalar(
        "SELECT organization_id FROM kiosks WHERE id = ? AND status = 'active'",
    )
    .bind(kiosk_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| {
        tracing::error!(error = %e, kiosk_id, "Failed to fetch kiosk");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    let Some(organization_id) = organization_id else {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({
            "message": "Kiosk not found"
        })));
    };

    let (token, _claims) = mint_device_token(
        kiosk_id,
        organization_id,
        &config.jwt_secret,
        config.device_token_ttl,
    );
    let expires_at = chrono::Local::now().naive_local()
        + Duration::seconds(config.device_token_ttl as i64);

    sqlx::query("UPDATE kiosks SET dit = ?, dit_expiry = ? WHERE id = ?")
        .bind(&token)
        .bind(expires_at)
        .bind(kiosk_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, kiosk_id, "Failed to store device token");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    tracing::info!(kiosk_id, organization_id, "device token issued");

    Ok(HttpResponse::Ok().json(DeviceTokenResponse {
        device_token: token,
        expires_at,
    }))
}
