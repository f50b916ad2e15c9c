use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kerbside_api::{
    app,
    state::{AppState, AuthConfig},
};
use kerbside_billing::{CouponEngine, FeeEngine, PaymentRecorder};
use kerbside_occupancy::{
    InProcessFeed, OccupancyFeed, OutboxReplayer, RedisFeed, RetryPolicy, SyncBridge,
};
use kerbside_session::SessionManager;
use kerbside_store::{DbClient, Store, StoreIdentityProvider};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kerbside_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = kerbside_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Kerbside API on port {}", config.server.port);

    // Local durable store
    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to open database");
    db.migrate().await.expect("Failed to run migrations");
    let store = Store::new(&db);

    // Remote occupancy feed
    let feed: Arc<dyn OccupancyFeed> = match config.feed.mode.as_str() {
        "redis" => {
            let url = config
                .feed
                .redis_url
                .as_deref()
                .expect("feed.redis_url is required when feed.mode = \"redis\"");
            Arc::new(RedisFeed::new(url).expect("Failed to create Redis feed"))
        }
        _ => Arc::new(InProcessFeed::new()),
    };

    let retry = RetryPolicy {
        attempts: config.sync.publish_retry_attempts,
        backoff: Duration::from_millis(config.sync.publish_retry_backoff_ms),
    };
    let bridge = Arc::new(SyncBridge::new(
        store.occupancy.clone(),
        store.outbox.clone(),
        feed.clone(),
        retry,
    ));

    // Replay pushes that never acked
    let _replayer = OutboxReplayer::new(
        store.outbox.clone(),
        feed,
        Duration::from_secs(config.sync.outbox_replay_interval_secs),
    )
    .start();

    let live_occupancy = Arc::new(
        bridge
            .subscribe_all()
            .await
            .expect("Failed to subscribe to occupancy feed"),
    );

    let sessions = Arc::new(SessionManager::new(
        store.sessions.clone(),
        store.occupancy.clone(),
        bridge.clone(),
    ));
    let fees = FeeEngine::new(
        store.sessions.clone(),
        store.facilities.clone(),
        store.coupons.clone(),
    );
    let coupons = CouponEngine::new(store.coupons.clone(), store.sessions.clone());
    let recorder = Arc::new(PaymentRecorder::new(
        store.payments.clone(),
        store.sessions.clone(),
    ));
    let identity = Arc::new(StoreIdentityProvider::new(store.users.clone()));

    let app_state = AppState {
        store,
        bridge,
        live_occupancy,
        sessions,
        fees,
        coupons,
        recorder,
        identity,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
