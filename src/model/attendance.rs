use chrono::{NaiveDate, NaiveDateTime};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};
use utoipa::ToSchema;

/// Day classification stored on the attendance row. Leave days carry the
/// leave-type name itself (e.g. "sick"), so the column is a free string and
/// this enum owns the conversion.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum AttendanceStatus {
    Present,
    Partial,
    Absent,
    Weekend,
    Holiday,
    Leave(String),
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Partial => "partial",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Weekend => "weekend",
            AttendanceStatus::Holiday => "holiday",
            AttendanceStatus::Leave(name) => name,
        }
    }
}

#[derive(Debug, Display)]
#[display(fmt = "OT transition not permitted from '{}'", from)]
pub struct OtTransitionError {
    pub from: OtStatus,
}

/// Overtime approval state machine:
/// ot_available -> ot_requested -> { ot_approved | ot_rejected }.
/// Rejected is terminal; only a fresh computation cycle resets to available.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, StrumDisplay, EnumString, Serialize, Deserialize, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OtStatus {
    OtAvailable,
    OtRequested,
    OtApproved,
    OtRejected,
}

impl OtStatus {
    pub fn request(self) -> Result<OtStatus, OtTransitionError> {
        match self {
            OtStatus::OtAvailable => Ok(OtStatus::OtRequested),
            from => Err(OtTransitionError { from }),
        }
    }

    pub fn approve(self) -> Result<OtStatus, OtTransitionError> {
        match self {
            OtStatus::OtRequested => Ok(OtStatus::OtApproved),
            from => Err(OtTransitionError { from }),
        }
    }

    pub fn reject(self) -> Result<OtStatus, OtTransitionError> {
        match self {
            OtStatus::OtRequested => Ok(OtStatus::OtRejected),
            from => Err(OtTransitionError { from }),
        }
    }
}

/// Per-member-per-date rollup. One row per (member_id, date), enforced by a
/// UNIQUE key. Durations are minutes.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "member_id": 42,
    "organization_id": 7,
    "date": "2026-08-03",
    "status": "present",
    "duration": 485.0,
    "late_check_in": 5.0,
    "early_check_out": 0.0,
    "late_check_out": 10.0,
    "overtime": 0.0,
    "ot_status": "ot_available",
    "shift_id": 3
}))]
pub struct Attendance {
    pub id: u64,
    pub member_id: u64,
    pub organization_id: u64,
    #[schema(example = "2026-08-03", value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(example = "present")]
    pub status: String,
    pub status_details: Option<String>,
    pub duration: f64,
    pub late_check_in: f64,
    pub early_check_out: f64,
    pub late_check_out: f64,
    pub overtime: f64,
    #[schema(example = "ot_available")]
    pub ot_status: String,
    pub ot_approved_by: Option<u64>,
    pub shift_id: Option<u64>,
    pub remarks: Option<String>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, StrumDisplay, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ComputationStatus {
    Started,
    Completed,
    Failed,
}

/// Audit row per (organization, shift, date) aggregator run. One row created
/// at run start, updated at run end.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceComputationHistory {
    pub id: u64,
    pub organization_id: u64,
    pub shift_id: u64,
    pub date: NaiveDate,
    pub status: String,
    pub employee_count: u32,
    pub reason: Option<String>,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ot_happy_path_approve() {
        let s = OtStatus::OtAvailable.request().unwrap();
        assert_eq!(s, OtStatus::OtRequested);
        assert_eq!(s.approve().unwrap(), OtStatus::OtApproved);
    }

    #[test]
    fn ot_happy_path_reject() {
        let s = OtStatus::OtAvailable.request().unwrap();
        assert_eq!(s.reject().unwrap(), OtStatus::OtRejected);
    }

    #[test]
    fn ot_rejected_is_terminal() {
        assert!(OtStatus::OtRejected.request().is_err());
        assert!(OtStatus::OtRejected.approve().is_err());
        assert!(OtStatus::OtRejected.reject().is_err());
    }

    #[test]
    fn ot_cannot_approve_without_request() {
        assert!(OtStatus::OtAvailable.approve().is_err());
        assert!(OtStatus::OtApproved.approve().is_err());
    }

    #[test]
    fn ot_status_round_trips_db_strings() {
        assert_eq!(OtStatus::OtRequested.to_string(), "ot_requested");
        assert_eq!("ot_approved".parse::<OtStatus>().unwrap(), OtStatus::OtApproved);
    }

    #[test]
    fn leave_status_keeps_leave_type_name() {
        assert_eq!(AttendanceStatus::Leave("sick".into()).as_str(), "sick");
        assert_eq!(AttendanceStatus::Present.as_str(), "present");
    }
}
