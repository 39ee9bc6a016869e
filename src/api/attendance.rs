use crate::auth::auth::AuthUser;
use crate::engine::aggregator;
use crate::model::attendance::{Attendance, AttendanceComputationHistory, OtStatus};
use crate::model::scan::MemberScan;
use crate::model::shift::Shift;
use crate::utils::db_utils::{FilterClause, SqlValue};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct AttendanceFilter {
    #[schema(example = 42)]
    /// Filter by member ID
    pub member_id: Option<u64>,
    #[schema(example = 7)]
    /// Filter by organization ID
    pub organization_id: Option<u64>,
    #[schema(example = "present")]
    /// Filter by day status
    pub status: Option<String>,
    #[schema(example = "2026-08-01", format = "date", value_type = String)]
    /// Start of the date range (inclusive)
    pub from: Option<NaiveDate>,
    #[schema(example = "2026-08-31", format = "date", value_type = String)]
    /// End of the date range (inclusive)
    pub to: Option<NaiveDate>,
    #[schema(example = 1)]
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    #[schema(example = 10)]
    /// Pagination per page number
    pub per_page: Option<u64>,
}

impl AttendanceFilter {
    // The one place attendance filter fields map to SQL predicates.
    fn clause(&self) -> FilterClause {
        let mut clause = FilterClause::new();
        if let Some(member_id) = self.member_id {
            clause.push("member_id = ?", SqlValue::U64(member_id));
        }
        if let Some(organization_id) = self.organization_id {
            clause.push("organization_id = ?", SqlValue::U64(organization_id));
        }
        if let Some(status) = &self.status {
            clause.push("status = ?", SqlValue::String(status.clone()));
        }
        if let Some(from) = self.from {
            clause.push("date >= ?", SqlValue::Date(from));
        }
        if let Some(to) = self.to {
            clause.push("date <= ?", SqlValue::Date(to));
        }
        clause
    }
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub data: Vec<Attendance>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceDetailResponse {
    pub attendance: Attendance,
    /// Scans consumed into this rollup
    pub scans: Vec<MemberScan>,
}

#[derive(Deserialize, ToSchema)]
pub struct ComputePayload {
    #[schema(example = 7)]
    pub organization_id: u64,
    #[schema(example = "2026-08-03", format = "date", value_type = String)]
    /// Defaults to each shift's most recently ended window
    pub date: Option<NaiveDate>,
}

/* =========================
List attendance
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/attendance",
    params(AttendanceFilter),
    responses(
        (status = 200, description = "Paginated attendance list", body = AttendanceListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    // -------------------------
    // Pagination
    // -------------------------
    let per_page = query.per_page.unwrap_or(10).min(100);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * per_page;

    let clause = query.clause();

    // -------------------------
    // COUNT query
    // -------------------------
    let count_sql = format!("SELECT COUNT(*) FROM attendance{}", clause.where_sql());

    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for value in clause.values() {
        count_q = match value {
            SqlValue::String(v) => count_q.bind(v.clone()),
            SqlValue::U64(v) => count_q.bind(*v),
            SqlValue::F64(v) => count_q.bind(*v),
            SqlValue::Bool(v) => count_q.bind(*v),
            SqlValue::Date(v) => count_q.bind(*v),
            SqlValue::DateTime(v) => count_q.bind(*v),
        };
    }

    let total = count_q.fetch_one(pool.get_ref()).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to count attendance rows");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    // -------------------------
    // DATA query
    // -------------------------
    let data_sql = format!(
        r#"
        SELECT id, member_id, organization_id, date, status, status_details,
               duration, late_check_in, early_check_out, late_check_out,
               overtime, ot_status, ot_approved_by, shift_id, remarks
        FROM attendance
        {}
        ORDER BY date DESC, member_id ASC
        LIMIT ? OFFSET ?
        "#,
        clause.where_sql()
    );

    let mut data_q = sqlx::query_as::<_, Attendance>(&data_sql);
    for value in clause.values() {
        data_q = match value {
            SqlValue::String(v) => data_q.bind(v.clone()),
            SqlValue::U64(v) => data_q.bind(*v),
            SqlValue::F64(v) => data_q.bind(*v),
            SqlValue::Bool(v) => data_q.bind(*v),
            SqlValue::Date(v) => data_q.bind(*v),
            SqlValue::DateTime(v) => data_q.bind(*v),
        };
    }

    let rows = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch attendance list");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        data: rows,
        page: page as u32,
        per_page: per_page as u32,
        total,
    }))
}

/* =========================
Attendance details
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/attendance/{attendance_id}",
    params(("attendance_id" = u64, Path, description = "Attendance row ID")),
    responses(
        (status = 200, description = "Attendance row with consumed scans", body = AttendanceDetailResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Attendance not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn get_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let attendance_id = path.into_inner();

    let attendance = fetch_attendance(pool.get_ref(), attendance_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, attendance_id, "Failed to fetch attendance");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    let Some(attendance) = attendance else {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({
            "message": "Attendance not found"
        })));
    };

    let scans = sqlx::query_as::<_, MemberScan>(
        r#"
        SELECT ms.id, ms.member_id, ms.organization_id, ms.system_location_id,
               ms.kiosk_id, ms.date_time, ms.scan_type, ms.latitude, ms.longitude,
               ms.is_computed, ms.status, ms.metadata
        FROM member_scans ms
        JOIN attendance_scans ats ON ats.scan_id = ms.id
        WHERE ats.attendance_id = ?
        ORDER BY ms.date_time ASC
        "#,
    )
    .bind(attendance_id)
    .fetch_all(pool.get_ref())
    .await
    .map_err(|e| {
        tracing::error!(error = %e, attendance_id, "Failed to fetch attendance scans");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(HttpResponse::Ok().json(AttendanceDetailResponse { attendance, scans }))
}

/* =========================
Delete attendance
========================= */
/// Deleting a rollup resets its scans to pending so the next computation
/// run picks them up again.
#[utoipa::path(
    delete,
    path = "/api/v1/attendance/{attendance_id}",
    params(("attendance_id" = u64, Path, description = "Attendance row ID")),
    responses(
        (status = 200, description = "Attendance deleted, scans reset", body = Object, example = json!({
            "message": "Attendance deleted"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Attendance not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn delete_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let attendance_id = path.into_inner();

    let result = async {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE member_scans ms
            JOIN attendance_scans ats ON ats.scan_id = ms.id
            SET ms.is_computed = 0, ms.status = 'pending'
            WHERE ats.attendance_id = ?
            "#,
        )
        .bind(attendance_id)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM attendance WHERE id = ?")
            .bind(attendance_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok::<u64, sqlx::Error>(deleted)
    }
    .await
    .map_err(|e| {
        tracing::error!(error = %e, attendance_id, "Failed to delete attendance");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    if result == 0 {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({
            "message": "Attendance not found"
        })));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Attendance deleted"
    })))
}

/* =========================
OT request / approve / reject
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/attendance/{attendance_id}/ot/request",
    params(("attendance_id" = u64, Path, description = "Attendance row ID")),
    responses(
        (status = 200, description = "OT requested", body = Object, example = json!({
            "message": "Overtime requested"
        })),
        (status = 400, description = "Transition not permitted"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Attendance not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn ot_request(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let attendance_id = path.into_inner();
    transition_ot(pool.get_ref(), attendance_id, None, OtAction::Request).await
}

#[utoipa::path(
    put,
    path = "/api/v1/attendance/{attendance_id}/ot/approve",
    params(("attendance_id" = u64, Path, description = "Attendance row ID")),
    responses(
        (status = 200, description = "OT approved, overtime added to duration", body = Object, example = json!({
            "message": "Overtime approved"
        })),
        (status = 400, description = "Transition not permitted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Attendance not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn ot_approve(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let attendance_id = path.into_inner();
    transition_ot(
        pool.get_ref(),
        attendance_id,
        auth.member_id,
        OtAction::Approve,
    )
    .await
}

#[utoipa::path(
    put,
    path = "/api/v1/attendance/{attendance_id}/ot/reject",
    params(("attendance_id" = u64, Path, description = "Attendance row ID")),
    responses(
        (status = 200, description = "OT rejected", body = Object, example = json!({
            "message": "Overtime rejected"
        })),
        (status = 400, description = "Transition not permitted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Attendance not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn ot_reject(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let attendance_id = path.into_inner();
    transition_ot(pool.get_ref(), attendance_id, None, OtAction::Reject).await
}

enum OtAction {
    Request,
    Approve,
    Reject,
}

enum OtOutcome {
    Done(&'static str),
    NotFound,
    Refused(String),
}

async fn transition_ot(
    pool: &MySqlPool,
    attendance_id: u64,
    approver: Option<u64>,
    action: OtAction,
) -> actix_web::Result<HttpResponse> {
    let outcome = async {
        let mut tx = pool.begin().await?;

        let row: Option<(String, f64)> = sqlx::query_as(
            "SELECT ot_status, overtime FROM attendance WHERE id = ? FOR UPDATE",
        )
        .bind(attendance_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((raw_status, overtime)) = row else {
            return Ok::<OtOutcome, sqlx::Error>(OtOutcome::NotFound);
        };

        let current: OtStatus = match raw_status.parse() {
            Ok(status) => status,
            Err(_) => {
                return Ok(OtOutcome::Refused(format!(
                    "Unknown OT state '{}'",
                    raw_status
                )));
            }
        };

        match action {
            OtAction::Request => {
                if overtime <= 0.0 {
                    return Ok(OtOutcome::Refused(
                        "No overtime available to request".to_string(),
                    ));
                }
                let next = match current.request() {
                    Ok(next) => next,
                    Err(e) => return Ok(OtOutcome::Refused(e.to_string())),
                };
                sqlx::query("UPDATE attendance SET ot_status = ? WHERE id = ?")
                    .bind(next.to_string())
                    .bind(attendance_id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                Ok(OtOutcome::Done("Overtime requested"))
            }
            OtAction::Approve => {
                let next = match current.approve() {
                    Ok(next) => next,
                    Err(e) => return Ok(OtOutcome::Refused(e.to_string())),
                };
                // overtime folds into duration exactly once, on this
                // transition only
                sqlx::query(
                    r#"
                    UPDATE attendance
                    SET ot_status = ?, duration = duration + overtime, ot_approved_by = ?
                    WHERE id = ?
                    "#,
                )
                .bind(next.to_string())
                .bind(approver)
                .bind(attendance_id)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok(OtOutcome::Done("Overtime approved"))
            }
            OtAction::Reject => {
                let next = match current.reject() {
                    Ok(next) => next,
                    Err(e) => return Ok(OtOutcome::Refused(e.to_string())),
                };
                sqlx::query("UPDATE attendance SET ot_status = ? WHERE id = ?")
                    .bind(next.to_string())
                    .bind(attendance_id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                Ok(OtOutcome::Done("Overtime rejected"))
            }
        }
    }
    .await
    .map_err(|e: sqlx::Error| {
        tracing::error!(error = %e, attendance_id, "OT transition failed");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(match outcome {
        OtOutcome::Done(message) => {
            HttpResponse::Ok().json(serde_json::json!({ "message": message }))
        }
        OtOutcome::NotFound => HttpResponse::NotFound().json(serde_json::json!({
            "message": "Attendance not found"
        })),
        OtOutcome::Refused(message) => {
            HttpResponse::BadRequest().json(serde_json::json!({ "message": message }))
        }
    })
}

/* =========================
Manual computation trigger
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/attendance/compute",
    request_body = ComputePayload,
    responses(
        (status = 202, description = "Computation started", body = Object, example = json!({
            "message": "Attendance computation started"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn compute_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<crate::config::Config>,
    payload: web::Json<ComputePayload>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let shifts = sqlx::query_as::<_, Shift>(
        r#"
        SELECT id, organization_id, name, start_time, end_time, computation_time,
               overtime_threshold, enable_geo_fencing, system_location_id, settings, status
        FROM shifts
        WHERE organization_id = ? AND status = 'active'
        "#,
    )
    .bind(payload.organization_id)
    .fetch_all(pool.get_ref())
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to fetch shifts for manual computation");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    let pool = pool.get_ref().clone();
    let config = config.get_ref().clone();
    let date_override = payload.date;

    actix_web::rt::spawn(async move {
        let as_of = chrono::Local::now().naive_local();
        for shift in shifts {
            let date =
                date_override.unwrap_or_else(|| aggregator::computation_date(&shift.band(), as_of));
            if let Err(e) = aggregator::run_for_shift(&pool, &config, &shift, date, as_of).await {
                tracing::error!(shift_id = shift.id, error = %e, "manual computation failed");
            }
        }
    });

    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "message": "Attendance computation started"
    })))
}

/* =========================
Computation history
========================= */
#[derive(Deserialize, IntoParams, ToSchema)]
pub struct HistoryFilter {
    #[schema(example = 7)]
    /// Filter by organization ID
    pub organization_id: Option<u64>,
    #[schema(example = 3)]
    /// Filter by shift ID
    pub shift_id: Option<u64>,
    #[schema(example = "2026-08-03", format = "date", value_type = String)]
    /// Filter by computed date
    pub date: Option<NaiveDate>,
}

impl HistoryFilter {
    fn clause(&self) -> FilterClause {
        let mut clause = FilterClause::new();
        if let Some(organization_id) = self.organization_id {
            clause.push("organization_id = ?", SqlValue::U64(organization_id));
        }
        if let Some(shift_id) = self.shift_id {
            clause.push("shift_id = ?", SqlValue::U64(shift_id));
        }
        if let Some(date) = self.date {
            clause.push("date = ?", SqlValue::Date(date));
        }
        clause
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/attendance/history",
    params(HistoryFilter),
    responses(
        (status = 200, description = "Recent computation runs, newest first"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<HistoryFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let clause = query.clause();
    let sql = format!(
        r#"
        SELECT id, organization_id, shift_id, date, status, employee_count,
               reason, started_at, ended_at
        FROM attendance_computation_history
        {}
        ORDER BY started_at DESC
        LIMIT 100
        "#,
        clause.where_sql()
    );

    let mut q = sqlx::query_as::<_, AttendanceComputationHistory>(&sql);
    for value in clause.values() {
        q = match value {
            SqlValue::String(v) => q.bind(v.clone()),
            SqlValue::U64(v) => q.bind(*v),
            SqlValue::F64(v) => q.bind(*v),
            SqlValue::Bool(v) => q.bind(*v),
            SqlValue::Date(v) => q.bind(*v),
            SqlValue::DateTime(v) => q.bind(*v),
        };
    }

    let rows = q.fetch_all(pool.get_ref()).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to fetch computation history");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(HttpResponse::Ok().json(rows))
}

async fn fetch_attendance(
    pool: &MySqlPool,
    attendance_id: u64,
) -> Result<Option<Attendance>, sqlx::Error> {
    sqlx::query_as::<_, Attendance>(
        r#"
        SELECT id, member_id, organization_id, date, status, status_details,
               duration, late_check_in, early_check_out, late_check_out,
               overtime, ot_status, ot_approved_by, shift_id, remarks
        FROM attendance
        WHERE id = ?
        "#,
    )
    .bind(attendance_id)
    .fetch_optional(pool)
    .await
}
