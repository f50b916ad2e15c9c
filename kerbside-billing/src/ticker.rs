use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use kerbside_core::CoreResult;

use crate::fees::FeeEngine;

/// Live reading for an active session being viewed: elapsed time and the
/// fee it currently implies, recomputed from wall clock
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeQuote {
    pub session_id: Uuid,
    pub elapsed_ms: i64,
    pub amount: f64,
}

impl FeeQuote {
    /// HH:MM:SS rendering of the elapsed time
    pub fn elapsed_display(&self) -> String {
        let total_seconds = self.elapsed_ms / 1000;
        format!(
            "{:02}:{:02}:{:02}",
            total_seconds / 3600,
            (total_seconds / 60) % 60,
            total_seconds % 60
        )
    }
}

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// One-second recompute loop for the live fee display. No timer state is
/// persisted; every tick derives from wall clock minus the entry timestamp.
/// Dropping the ticker aborts the loop, which must happen when the viewing
/// context is torn down.
pub struct FeeTicker {
    rx: watch::Receiver<FeeQuote>,
    task: JoinHandle<()>,
}

impl FeeTicker {
    /// Start ticking for a session. The first quote is computed before this
    /// returns, so the receiver never sees a placeholder.
    pub async fn start(engine: FeeEngine, session_id: Uuid) -> CoreResult<Self> {
        let session = engine.session(session_id).await?;

        let initial = quote(&engine, &session, session_id).await?;
        let (tx, rx) = watch::channel(initial);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match quote(&engine, &session, session_id).await {
                    Ok(next) => {
                        if tx.send(next).is_err() {
                            // Every receiver is gone; nothing to tick for.
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(%session_id, error = %e, "live fee recompute failed");
                    }
                }
            }
        });

        Ok(Self { rx, task })
    }

    pub fn subscribe(&self) -> watch::Receiver<FeeQuote> {
        self.rx.clone()
    }

    pub fn latest(&self) -> FeeQuote {
        self.rx.borrow().clone()
    }
}

impl Drop for FeeTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn quote(
    engine: &FeeEngine,
    session: &kerbside_shared::models::Session,
    session_id: Uuid,
) -> CoreResult<FeeQuote> {
    let now = Utc::now();
    let amount = engine.fee_for_session(session, None, now).await?;
    let elapsed_ms = (session.exit_time.unwrap_or(now) - session.entry_time).num_milliseconds();
    Ok(FeeQuote {
        session_id,
        elapsed_ms,
        amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use kerbside_core::repository::{FacilityRepository, SessionRepository};
    use kerbside_shared::models::{Facility, FacilityCategory, PaymentStatus, Session};
    use kerbside_store::Store;

    #[tokio::test]
    async fn test_ticker_quotes_elapsed_fee() {
        let store = Store::in_memory().await.unwrap();
        let engine = FeeEngine::new(
            store.sessions.clone(),
            store.facilities.clone(),
            store.coupons.clone(),
        );

        let facility = Facility::new(
            "Central".to_string(),
            FacilityCategory::Other,
            "9 High Street".to_string(),
            40,
            10.0,
            0.0,
            0.0,
        );
        store.facilities.create(&facility).await.unwrap();

        let session = Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            facility_id: facility.id,
            entry_time: Utc::now() - ChronoDuration::hours(1),
            exit_time: None,
            payment_status: PaymentStatus::Pending,
            applied_coupon_id: None,
            spot_label: None,
        };
        store.sessions.create(&session).await.unwrap();

        let ticker = FeeTicker::start(engine, session.id).await.unwrap();
        let quote = ticker.latest();

        // One hour at 10.0/h, with a little slack for test scheduling.
        assert!(quote.amount > 9.9 && quote.amount < 10.2, "amount {}", quote.amount);
        assert!(quote.elapsed_display().starts_with("01:00"));
    }

    #[tokio::test]
    async fn test_dropping_ticker_stops_the_loop() {
        let store = Store::in_memory().await.unwrap();
        let engine = FeeEngine::new(
            store.sessions.clone(),
            store.facilities.clone(),
            store.coupons.clone(),
        );

        let facility = Facility::new(
            "Central".to_string(),
            FacilityCategory::Other,
            "9 High Street".to_string(),
            40,
            10.0,
            0.0,
            0.0,
        );
        store.facilities.create(&facility).await.unwrap();

        let session = Session::start(Uuid::new_v4(), facility.id, None);
        store.sessions.create(&session).await.unwrap();

        let ticker = FeeTicker::start(engine, session.id).await.unwrap();
        let mut rx = ticker.subscribe();
        drop(ticker);

        // The sender side is aborted; the watch channel reports closure.
        assert!(rx.changed().await.is_err() || rx.changed().await.is_err());
    }
}
