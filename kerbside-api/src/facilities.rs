use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::WatchStream;
use uuid::Uuid;

use kerbside_core::repository::{FacilityRepository, OccupancyRepository};
use kerbside_shared::models::{Facility, FacilityCategory, OccupancyStatus};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct FacilityFilter {
    category: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/facilities", get(list_facilities))
        .route("/v1/facilities/{id}", get(get_facility))
        .route("/v1/facilities/{id}/occupancy", get(get_occupancy))
        .route(
            "/v1/facilities/{id}/occupancy/stream",
            get(stream_occupancy),
        )
        .route("/v1/occupancy/stream", get(stream_all_occupancy))
}

async fn list_facilities(
    State(state): State<AppState>,
    Query(filter): Query<FacilityFilter>,
) -> Result<Json<Vec<Facility>>, AppError> {
    let facilities = match filter.category.as_deref() {
        Some(raw) => {
            let category = FacilityCategory::parse(raw)
                .ok_or_else(|| AppError::ValidationError(format!("unknown category: {raw}")))?;
            state.store.facilities.list_by_category(category).await?
        }
        None => state.store.facilities.list().await?,
    };
    Ok(Json(facilities))
}

async fn get_facility(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Facility>, AppError> {
    let facility = state
        .store
        .facilities
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("facility not found: {id}")))?;
    Ok(Json(facility))
}

async fn get_occupancy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OccupancyStatus>, AppError> {
    let status = state
        .store
        .occupancy
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("no occupancy for facility: {id}")))?;
    Ok(Json(status))
}

/// Per-facility live occupancy over SSE, fed by the store's continuous read
/// (which the sync bridge keeps aligned with the remote feed)
async fn stream_occupancy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state.store.occupancy.observe(id).await.map(|status| {
        Ok::<_, Infallible>(
            Event::default()
                .event("occupancy")
                .data(serde_json::to_string(&status).unwrap_or_default()),
        )
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Every facility's occupancy as one SSE stream of full snapshots, backed by
/// the bridge's live map of the remote feed
async fn stream_all_occupancy(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(state.live_occupancy.receiver()).map(|snapshot| {
        Ok::<_, Infallible>(
            Event::default()
                .event("occupancy_snapshot")
                .data(serde_json::to_string(&snapshot).unwrap_or_default()),
        )
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
