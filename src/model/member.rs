use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Member {
    pub id: u64,
    pub organization_id: u64,
    pub user_id: u64,
    pub role_id: u8,
    pub department_id: Option<u64>,
    pub designation_id: Option<u64>,
    pub org_location_id: Option<u64>,
    pub manager_id: Option<u64>,
    /// Personally assigned shift, highest-priority source in the default
    /// precedence chain.
    pub shift_id: Option<u64>,
    pub employee_code: Option<String>,
    pub status: String,
}

/// One enrolled face sample. The encoding column holds the 128-dim float
/// array as JSON, written once at enrollment time.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberImage {
    pub id: u64,
    pub member_id: u64,
    pub organization_id: u64,
    pub image_path: String,
    pub encoding: String,
}
