use crate::auth::auth::AuthUser;
use crate::engine::encoder::{FaceEncoder, HttpFaceEncoder};
use crate::engine::face::FaceMatchError;
use crate::utils::{enrollment_filter, gallery_cache};
use actix_web::{HttpResponse, Responder, web};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Deserialize, ToSchema)]
pub struct EnrollPayload {
    /// base64-encoded face image
    pub image: String,
    /// Storage path of the original image; generated when absent
    pub image_path: Option<String>,
}

/* =========================
Enroll a face image
========================= */
/// The encoding is computed once here; matching never re-derives it.
#[utoipa::path(
    post,
    path = "/api/v1/members/{member_id}/images",
    params(("member_id" = u64, Path, description = "Member to enroll")),
    request_body = EnrollPayload,
    responses(
        (status = 200, description = "Face image enrolled", body = Object, example = json!({
            "message": "Face image enrolled"
        })),
        (status = 400, description = "Image rejected", body = Object, example = json!({
            "message": "No face detected in the submitted image"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Member not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Enrollment"
)]
pub async fn enroll_image(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    encoder: web::Data<HttpFaceEncoder>,
    path: web::Path<u64>,
    payload: web::Json<EnrollPayload>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let member_id = path.into_inner();

    let organization_id: Option<u64> = sqlx::query_scalar(
        "SELECT organization_id FROM members WHERE id = ? AND status = 'active'",
    )
    .bind(member_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| {
        tracing::error!(error = %e, member_id, "Failed to fetch member for enrollment");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    let Some(organization_id) = organization_id else {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({
            "message": "Member not found"
        })));
    };

    let image = match STANDARD.decode(&payload.image) {
        Ok(bytes) => bytes,
        Err(_) => {
            return Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "message": "Image could not be decoded"
            })));
        }
    };

    let encoding = match encoder.encode(&image).await {
        Ok(encoding) => encoding,
        Err(e @ (FaceMatchError::InvalidImage | FaceMatchError::NoFaceDetected)) => {
            return Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "message": e.to_string()
            })));
        }
        Err(e) => {
            tracing::error!(error = %e, member_id, "Face encoder failed during enrollment");
            return Err(actix_web::error::ErrorInternalServerError(
                "Internal Server Error",
            ));
        }
    };

    let image_path = payload
        .image_path
        .clone()
        .unwrap_or_else(|| format!("enrollments/{}/{}.jpg", member_id, Uuid::new_v4()));

    let encoding_json = serde_json::to_string(&encoding).map_err(|e| {
        tracing::error!(error = %e, member_id, "Failed to serialize encoding");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    let image_id = sqlx::query(
        r#"
        INSERT INTO member_images (member_id, organization_id, image_path, encoding)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(member_id)
    .bind(organization_id)
    .bind(&image_path)
    .bind(&encoding_json)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        tracing::error!(error = %e, member_id, "Failed to insert member image");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?
    .last_insert_id();

    enrollment_filter::insert(member_id);
    gallery_cache::invalidate(member_id).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Face image enrolled",
        "image_id": image_id,
        "image_path": image_path
    })))
}

/* =========================
Remove an enrolled image
========================= */
#[utoipa::path(
    delete,
    path = "/api/v1/members/{member_id}/images/{image_id}",
    params(
        ("member_id" = u64, Path, description = "Member the image belongs to"),
        ("image_id" = u64, Path, description = "Image to remove")
    ),
    responses(
        (status = 200, description = "Image removed", body = Object, example = json!({
            "message": "Face image removed"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Image not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Enrollment"
)]
pub async fn remove_image(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(u64, u64)>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let (member_id, image_id) = path.into_inner();

    let deleted = sqlx::query("DELETE FROM member_images WHERE id = ? AND member_id = ?")
        .bind(image_id)
        .bind(member_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, member_id, image_id, "Failed to delete member image");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?
        .rows_affected();

    if deleted == 0 {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({
            "message": "Image not found"
        })));
    }

    let remaining: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM member_images WHERE member_id = ?")
            .bind(member_id)
            .fetch_one(pool.get_ref())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, member_id, "Failed to count member images");
                actix_web::error::ErrorInternalServerError("Internal Server Error")
            })?;

    if remaining == 0 {
        enrollment_filter::remove(member_id);
    }
    gallery_cache::invalidate(member_id).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Face image removed"
    })))
}
