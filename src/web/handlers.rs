use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, AppState, HttpError};
use crate::models::VesselRecord;
use crate::orchestrator::{CycleOutcome, Trigger, UpdateResponse, UpdateState};
use crate::scheduler::TickInfo;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub mmsi: u64,
    pub state: UpdateState,
    pub updating: bool,
    pub update_interval_secs: i64,
    pub publisher: String,
    pub scheduler: Option<TickInfo>,
    pub last_outcome: Option<CycleOutcome>,
    pub latest_record: Option<VesselRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionTestResponse {
    pub publisher: String,
    pub reachable: bool,
}

/// Run a cycle now. The cycle runs on its own task so a dropped client
/// connection does not cancel it halfway.
pub async fn trigger_update(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<CycleOutcome>>, HttpError> {
    let orchestrator = state.orchestrator.clone();
    let handle = tokio::spawn(async move { orchestrator.trigger(Trigger::OnDemand).await });

    match handle.await {
        Ok(UpdateResponse::Completed(outcome)) => {
            tracing::info!("On-demand update finished with {}", outcome.kind.as_str());
            Ok(Json(ApiResponse::success(*outcome)))
        }
        Ok(UpdateResponse::AlreadyUpdating) => Err(HttpError::AlreadyUpdating),
        Err(e) => {
            tracing::error!("On-demand update task failed: {}", e);
            Err(HttpError::internal("Update task failed"))
        }
    }
}

pub async fn get_status(State(state): State<AppState>) -> Result<Json<ApiResponse<StatusResponse>>, HttpError> {
    let orchestrator = &state.orchestrator;

    let scheduler = match &state.scheduler {
        Some(scheduler) => Some(scheduler.lock().await.info().await),
        None => None,
    };

    let latest_record = orchestrator.latest_record().await.unwrap_or_else(|e| {
        tracing::warn!("Failed to read latest record: {}", e);
        None
    });

    Ok(Json(ApiResponse::success(StatusResponse {
        mmsi: orchestrator.mmsi(),
        state: orchestrator.state().await,
        updating: orchestrator.is_updating(),
        update_interval_secs: orchestrator.update_interval().num_seconds(),
        publisher: orchestrator.publisher_name().to_string(),
        scheduler,
        last_outcome: orchestrator.last_outcome().await,
        latest_record,
    })))
}

pub async fn get_history(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<VesselRecord>>>, HttpError> {
    match state.orchestrator.history().await {
        Ok(records) => Ok(Json(ApiResponse::success(records))),
        Err(e) => {
            tracing::error!("Failed to read history: {}", e);
            Err(HttpError::internal("Failed to read history"))
        }
    }
}

pub async fn test_connection(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ConnectionTestResponse>>, HttpError> {
    let publisher = state.orchestrator.publisher_name().to_string();

    match state.orchestrator.test_publisher().await {
        Ok(reachable) => Ok(Json(ApiResponse::success(ConnectionTestResponse { publisher, reachable }))),
        Err(e) => {
            tracing::warn!("Publisher connection test failed: {}", e);
            Err(HttpError::unavailable(format!("{} is unreachable: {}", publisher, e)))
        }
    }
}

pub async fn not_found() -> HttpError {
    HttpError::not_found("Route")
}
