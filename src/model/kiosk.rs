use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Kiosk {
    pub id: u64,
    pub organization_id: u64,
    pub name: String,
    /// Device identifier token issued by the kiosk registration collaborator.
    pub dit: Option<String>,
    pub dit_expiry: Option<NaiveDateTime>,
    pub status: String,
}
