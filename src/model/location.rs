use crate::engine::geo::Candidate;
use serde::{Deserialize, Serialize};

/// Maximum configurable geofence radius in meters.
pub const MAX_RADIUS_M: f64 = 5000.0;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SystemLocation {
    pub id: String,
    pub organization_id: u64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    pub status: String,
}

impl SystemLocation {
    pub fn as_candidate(&self) -> Candidate {
        Candidate {
            location_id: self.id.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            // radius is bounded at write time; clamp again in case old rows
            // predate the bound
            radius: self.radius.clamp(0.0, MAX_RADIUS_M),
        }
    }
}
