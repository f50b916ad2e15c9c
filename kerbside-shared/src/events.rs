use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::OccupancyStatus;

/// Wire payload of the remote occupancy feed, one channel per facility id.
/// Consumers get a push on any write by any writer.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OccupancyUpdate {
    pub facility_id: Uuid,
    pub available_spots: i32,
    pub last_updated: DateTime<Utc>,
}

impl From<&OccupancyStatus> for OccupancyUpdate {
    fn from(status: &OccupancyStatus) -> Self {
        Self {
            facility_id: status.facility_id,
            available_spots: status.available_spots,
            last_updated: status.last_updated,
        }
    }
}

impl OccupancyUpdate {
    /// Local record carrying the remote's own timestamp, version left for
    /// the store to assign
    pub fn into_status(self) -> OccupancyStatus {
        OccupancyStatus {
            facility_id: self.facility_id,
            available_spots: self.available_spots,
            last_updated: self.last_updated,
            version: 0,
        }
    }
}
