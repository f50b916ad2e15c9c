use std::sync::Arc;

use kerbside_billing::{CouponEngine, FeeEngine, PaymentRecorder};
use kerbside_core::identity::IdentityProvider;
use kerbside_occupancy::{LiveOccupancyMap, SyncBridge};
use kerbside_session::SessionManager;
use kerbside_store::Store;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub bridge: Arc<SyncBridge>,
    pub live_occupancy: Arc<LiveOccupancyMap>,
    pub sessions: Arc<SessionManager>,
    pub fees: FeeEngine,
    pub coupons: CouponEngine,
    pub recorder: Arc<PaymentRecorder>,
    pub identity: Arc<dyn IdentityProvider>,
    pub auth: AuthConfig,
}
