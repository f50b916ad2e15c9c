use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::BoxStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use kerbside_core::repository::{OccupancyRepository, SessionRepository};
use kerbside_core::{CoreError, CoreResult};
use kerbside_occupancy::SyncBridge;
use kerbside_shared::models::{OccupancyStatus, Session};

/// Bounded retries for the read-modify-write against occupancy; each retry
/// re-reads before writing
const CAS_ATTEMPTS: u32 = 3;

enum SpotAdjustment {
    /// Session started: one spot taken, clamped at a floor of zero
    Take,
    /// Session ended: one spot freed, no ceiling
    Free,
}

/// Owns the start/end transitions of a parking session and the
/// occupancy-decrement/increment side effects.
///
/// A session is `Active` while its exit timestamp is absent and `Ended`
/// forever after; ended sessions remain queryable indefinitely.
pub struct SessionManager {
    sessions: Arc<dyn SessionRepository>,
    occupancy: Arc<dyn OccupancyRepository>,
    bridge: Arc<SyncBridge>,
}

impl SessionManager {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        occupancy: Arc<dyn OccupancyRepository>,
        bridge: Arc<SyncBridge>,
    ) -> Self {
        Self {
            sessions,
            occupancy,
            bridge,
        }
    }

    /// Create an active session (entry = now, payment pending) and take one
    /// spot from the facility's occupancy.
    ///
    /// Zero or absent availability does not reject the start; admission
    /// control is the caller's decision. When no occupancy record exists the
    /// adjustment is skipped without creating one.
    pub async fn start_session(
        &self,
        user_id: Uuid,
        facility_id: Uuid,
        spot_label: Option<String>,
    ) -> CoreResult<Session> {
        let session = Session::start(user_id, facility_id, spot_label);
        self.sessions.create(&session).await?;
        info!(session_id = %session.id, %facility_id, "parking session started");

        self.adjust_available_spots(facility_id, SpotAdjustment::Take)
            .await?;

        Ok(session)
    }

    /// Stamp the exit timestamp and free one spot. Fails with `NotFound`
    /// when the session does not exist.
    pub async fn end_session(&self, session_id: Uuid) -> CoreResult<Session> {
        let session = self.sessions.set_exit_time(session_id, Utc::now()).await?;
        info!(%session_id, facility_id = %session.facility_id, "parking session ended");

        self.adjust_available_spots(session.facility_id, SpotAdjustment::Free)
            .await?;

        Ok(session)
    }

    pub async fn get_session(&self, session_id: Uuid) -> CoreResult<Session> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("session", session_id))
    }

    pub async fn active_sessions(&self, user_id: Uuid) -> CoreResult<Vec<Session>> {
        self.sessions.list_active_by_user(user_id).await
    }

    pub async fn session_history(&self, user_id: Uuid) -> CoreResult<Vec<Session>> {
        self.sessions.list_by_user(user_id).await
    }

    pub async fn observe_active_sessions(&self, user_id: Uuid) -> BoxStream<'static, Vec<Session>> {
        self.sessions.observe_active_by_user(user_id).await
    }

    /// Read-modify-write on the facility's occupancy through the bridge's
    /// versioned publish. A conflict means another writer (local or remote)
    /// got between our read and write; re-read and retry a bounded number of
    /// times before giving up.
    async fn adjust_available_spots(
        &self,
        facility_id: Uuid,
        adjustment: SpotAdjustment,
    ) -> CoreResult<()> {
        let mut last_conflict = String::new();

        for attempt in 1..=CAS_ATTEMPTS {
            let Some(current) = self.occupancy.get(facility_id).await? else {
                // No occupancy record yet: skip silently, never create one.
                debug!(%facility_id, "no occupancy record, skipping spot adjustment");
                return Ok(());
            };

            let available_spots = match adjustment {
                SpotAdjustment::Take => (current.available_spots - 1).max(0),
                SpotAdjustment::Free => current.available_spots + 1,
            };

            let next = OccupancyStatus {
                facility_id,
                available_spots,
                last_updated: Utc::now(),
                version: current.version,
            };

            match self.bridge.publish(&next, Some(current.version)).await {
                Ok(_) => return Ok(()),
                Err(CoreError::Conflict(reason)) => {
                    warn!(%facility_id, attempt, %reason, "occupancy write conflicted, retrying");
                    last_conflict = reason;
                }
                Err(e) => return Err(e),
            }
        }

        Err(CoreError::Conflict(last_conflict))
    }
}
