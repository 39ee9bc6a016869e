use crate::api::attendance::{
    AttendanceDetailResponse, AttendanceFilter, AttendanceListResponse, ComputePayload,
    HistoryFilter,
};
use crate::api::enrollment::EnrollPayload;
use crate::api::kiosk::DeviceTokenResponse;
use crate::api::scan::ScanPayload;
use crate::model::attendance::{Attendance, OtStatus};
use crate::model::scan::{MemberScan, ScanType};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance Engine API",
        version = "1.0.0",
        description = r#"
## Attendance Computation & Validation Engine

This API powers the attendance core of a workforce-management platform.

### 🔹 Key Features
- **Kiosk Scans**
  - Device-token gated check-in / check-out with geofencing and face verification
- **Attendance Rollups**
  - Scheduled pairing of raw scans into per-day records with lateness, early-exit and overtime minutes
- **Overtime Workflow**
  - Request / approve / reject cycle on computed overtime
- **Face Enrollment**
  - Enroll and remove face samples; encodings are extracted once at enrollment

### 🔐 Security
Staff endpoints are protected using **JWT Bearer authentication**; kiosk scan
endpoints authenticate with the kiosk's **device identifier token**.
Only **Admin** or **HR** roles can approve overtime or delete rollups.

### 📦 Response Format
- JSON-based RESTful responses
- Pagination supported for list endpoints

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::scan::check_in,
        crate::api::scan::check_out,

        crate::api::attendance::list_attendance,
        crate::api::attendance::get_attendance,
        crate::api::attendance::delete_attendance,
        crate::api::attendance::ot_request,
        crate::api::attendance::ot_approve,
        crate::api::attendance::ot_reject,
        crate::api::attendance::compute_attendance,
        crate::api::attendance::list_history,

        crate::api::enrollment::enroll_image,
        crate::api::enrollment::remove_image,

        crate::api::kiosk::issue_token
    ),
    components(
        schemas(
            ScanPayload,
            ScanType,
            MemberScan,
            Attendance,
            OtStatus,
            AttendanceFilter,
            AttendanceListResponse,
            AttendanceDetailResponse,
            ComputePayload,
            HistoryFilter,
            EnrollPayload,
            DeviceTokenResponse
        )
    ),
    tags(
        (name = "Kiosk", description = "Kiosk scan submission and device-token APIs"),
        (name = "Attendance", description = "Attendance rollup APIs"),
        (name = "Overtime", description = "Overtime approval workflow APIs"),
        (name = "Enrollment", description = "Face enrollment APIs"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
