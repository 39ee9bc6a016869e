use crate::engine::timeband::TimeBand;
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Where a member's shift assignment can come from when no schedule log
/// covers the date. The organization stores these as an ordered priority
/// list; the highest-priority non-null source wins.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShiftSource {
    Member,
    Designation,
    Department,
    OrgLocation,
}

fn default_weekdays() -> Vec<u8> {
    vec![1, 2, 3, 4, 5]
}

/// Typed view of the shifts.settings JSON blob. Parsed once per use, never
/// read field-by-field out of raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftSettings {
    /// Minutes of paired scan time needed for a `present` day. Falls back
    /// to the shift band duration when absent.
    #[serde(default)]
    pub required_minutes: Option<f64>,
    /// ISO weekday numbers (1 = Monday .. 7 = Sunday) the shift works.
    #[serde(default = "default_weekdays")]
    pub active_weekdays: Vec<u8>,
    /// When true, check-in is refused once start_time has passed.
    #[serde(default)]
    pub restrict_check_in_after_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Shift {
    pub id: u64,
    pub organization_id: u64,
    pub name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Time of day the aggregator runs for this shift.
    pub computation_time: NaiveTime,
    /// Minutes beyond which worked time counts as overtime. Must exceed the
    /// shift duration when set (validated by the shift CRUD collaborator).
    pub overtime_threshold: Option<f64>,
    pub enable_geo_fencing: bool,
    pub system_location_id: Option<String>,
    pub settings: String,
    pub status: String,
}

impl Shift {
    pub fn band(&self) -> TimeBand {
        TimeBand::new(self.start_time, self.end_time)
    }

    pub fn parsed_settings(&self) -> Result<ShiftSettings> {
        serde_json::from_str(&self.settings)
            .with_context(|| format!("malformed settings for shift {}", self.id))
    }

    pub fn required_minutes(&self, settings: &ShiftSettings) -> f64 {
        settings
            .required_minutes
            .unwrap_or_else(|| self.band().duration_minutes())
    }
}

/// Time-bounded, location-scoped override attached to a schedule log period.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocationSettings {
    pub id: u64,
    pub shift_schedule_log_id: u64,
    pub system_location_id: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub applicable_start_date: NaiveDate,
    pub applicable_end_date: NaiveDate,
}

impl LocationSettings {
    pub fn band(&self) -> TimeBand {
        TimeBand::new(self.start_time, self.end_time)
    }
}

/// Date-ranged assignment of a member to a shift. At most one active log
/// covers any given date for a member.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShiftScheduleLog {
    pub id: u64,
    pub member_id: u64,
    pub shift_id: u64,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: String,
}
