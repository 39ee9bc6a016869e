use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

/// Metadata marker on close-out scans the aggregator materializes itself.
pub const SYSTEM_CREATED: &str = r#"{"created_by":"system","reason":"missing check-out"}"#;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    CheckIn,
    CheckOut,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Computed,
    Expired,
}

/// One raw check-in/check-out event. Created only by the validated scan
/// pipeline, or synthetically by the aggregator; mutated only by the
/// aggregator (is_computed, status).
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct MemberScan {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 42)]
    pub member_id: u64,
    #[schema(example = 7)]
    pub organization_id: u64,
    pub system_location_id: Option<String>,
    pub kiosk_id: Option<u64>,
    #[schema(example = "2026-08-03T09:05:00", value_type = String, format = "date-time")]
    pub date_time: NaiveDateTime,
    #[schema(example = "check_in")]
    pub scan_type: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_computed: bool,
    #[schema(example = "pending")]
    pub status: String,
    pub metadata: Option<String>,
}
