use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaveRequest {
    pub id: u64,
    pub member_id: u64,
    pub organization_id: u64,
    pub leave_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Holiday {
    pub id: u64,
    pub organization_id: u64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
}

/// Members marked present without scans for a date range (e.g. field staff).
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct PresentByDefault {
    pub id: u64,
    pub member_id: u64,
    pub organization_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
}
