use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use guardian_core::{DecisionKind, DeviceId, LogLevel, MotionReport};
use jiff::Timestamp;
use tracing::error;

use crate::AppState;
use crate::store::{STATUS_HISTORY_RETAIN, Store};

use super::error::ApiError;
use super::models::{
    AckResponse, CommandRequest, CommandResponse, DecisionsResponse, DeviceStatusView,
    DevicesResponse, FullStatusResponse, HistoryQuery, HistoryResponse, LogView, LogsResponse,
    StatusReportRequest, StatusResponse, epoch,
};

const DEFAULT_LOG_LIMIT: usize = 20;
const DEFAULT_DECISION_LIMIT: usize = 10;
const MAX_LIMIT: usize = 500;
const FULL_STATUS_INFO_LOGS: usize = 100;

// `limit=0` is honored and returns nothing.
fn clamp_limit(limit: Option<usize>, default: usize, max: usize) -> usize {
    limit.unwrap_or(default).min(max)
}

// Device report: POST /status
pub async fn report_status<S: Store>(
    State(state): State<AppState<S>>,
    payload: Result<Json<StatusReportRequest>, JsonRejection>,
) -> Result<Json<AckResponse>, ApiError> {
    let Json(request) = payload?;
    let coordinator = &state.coordinator;

    let device_id = request
        .device_id
        .filter(|id| !id.is_empty())
        .map(DeviceId::from)
        .unwrap_or_else(|| coordinator.device_id().clone());

    let report = request
        .situation
        .and_then(MotionReport::from_situation)
        .unwrap_or(MotionReport {
            motion: request.motion,
            relay: request.relay,
        });

    coordinator
        .report_motion(device_id, report, Timestamp::now())
        .await;

    Ok(Json(AckResponse::ok("status updated")))
}

// Operator view: GET /status
pub async fn get_status<S: Store>(State(state): State<AppState<S>>) -> Json<StatusResponse> {
    let now = Timestamp::now();
    let status = state.coordinator.snapshot(now).await;

    Json(StatusResponse {
        device_id: state.coordinator.device_id().to_string(),
        status: DeviceStatusView::new(&status, now),
        timestamp: epoch(now),
    })
}

// Device poll: GET /command
pub async fn poll_command<S: Store>(State(state): State<AppState<S>>) -> Json<CommandResponse> {
    let now = Timestamp::now();
    let command = state.coordinator.poll_command(now).await;

    Json(CommandResponse {
        device_id: state.coordinator.device_id().to_string(),
        command,
        timestamp: epoch(now),
    })
}

// Operator decision: POST /command
pub async fn post_command<S: Store>(
    State(state): State<AppState<S>>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Json<AckResponse>, ApiError> {
    let Json(request) = payload?;

    let Some(command) = request.command.filter(|c| !c.is_empty()) else {
        return Err(ApiError::BadRequest("missing command parameter".to_string()));
    };

    let kind = DecisionKind::from(command);
    let note = request.note.unwrap_or_default();

    match state
        .coordinator
        .apply_decision(kind.clone(), note, Timestamp::now())
        .await
    {
        Some(_) => Ok(Json(AckResponse::ok(format!("command executed: {kind}")))),
        None => Err(ApiError::BadRequest(format!("unknown command: {kind}"))),
    }
}

// GET /logs?device_id=&limit=
pub async fn list_logs<S: Store>(
    State(state): State<AppState<S>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<LogsResponse>, ApiError> {
    let Query(query) = query?;
    let device_id = query.device_id.map(DeviceId::from);
    let limit = clamp_limit(query.limit, DEFAULT_LOG_LIMIT, MAX_LIMIT);

    let logs = state
        .coordinator
        .store()
        .recent_logs(device_id.as_ref(), limit)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to read logs");
            ApiError::InternalServerError("failed to read logs".to_string())
        })?;

    Ok(Json(LogsResponse {
        logs: logs.into_iter().map(Into::into).collect(),
    }))
}

// GET /decisions?device_id=&limit=
pub async fn list_decisions<S: Store>(
    State(state): State<AppState<S>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<DecisionsResponse>, ApiError> {
    let Query(query) = query?;
    let device_id = query.device_id.map(DeviceId::from);
    let limit = clamp_limit(query.limit, DEFAULT_DECISION_LIMIT, MAX_LIMIT);

    let decisions = state
        .coordinator
        .store()
        .recent_decisions(device_id.as_ref(), limit)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to read decisions");
            ApiError::InternalServerError("failed to read decisions".to_string())
        })?;

    Ok(Json(DecisionsResponse {
        decisions: decisions.into_iter().map(Into::into).collect(),
    }))
}

// GET /devices
pub async fn list_devices<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<Json<DevicesResponse>, ApiError> {
    let devices = state.coordinator.store().devices().await.map_err(|e| {
        error!(error = %e, "failed to read devices");
        ApiError::InternalServerError("failed to read devices".to_string())
    })?;

    Ok(Json(DevicesResponse {
        devices: devices.into_iter().map(Into::into).collect(),
    }))
}

// GET /history?limit=
pub async fn status_history<S: Store>(
    State(state): State<AppState<S>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(query) = query?;
    let limit = clamp_limit(query.limit, STATUS_HISTORY_RETAIN, STATUS_HISTORY_RETAIN);

    let history = state
        .coordinator
        .store()
        .status_history(limit)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to read status history");
            ApiError::InternalServerError("failed to read status history".to_string())
        })?;

    Ok(Json(HistoryResponse {
        history: history.into_iter().map(Into::into).collect(),
    }))
}

// Dashboard in one round trip: GET /full_status
//
// Live state always comes back; a failing store only empties the history
// sections.
pub async fn full_status<S: Store>(State(state): State<AppState<S>>) -> Json<FullStatusResponse> {
    let now = Timestamp::now();
    let status = state.coordinator.snapshot(now).await;
    let store = state.coordinator.store();

    let devices = store.devices().await.unwrap_or_else(|e| {
        error!(error = %e, "failed to read devices");
        Vec::new()
    });
    let logs: Vec<LogView> = store
        .recent_logs(None, MAX_LIMIT)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "failed to read logs");
            Vec::new()
        })
        .into_iter()
        .map(Into::into)
        .collect();
    let history = store
        .status_history(STATUS_HISTORY_RETAIN)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "failed to read status history");
            Vec::new()
        });

    let debug = LogLevel::Debug.as_str();
    let info_logs = logs
        .iter()
        .filter(|log| log.level != debug)
        .take(FULL_STATUS_INFO_LOGS)
        .cloned()
        .collect();

    let view = DeviceStatusView::new(&status, now);
    Json(FullStatusResponse {
        device_id: state.coordinator.device_id().to_string(),
        remaining_time: view.remaining_time,
        status: view,
        devices: devices.into_iter().map(Into::into).collect(),
        logs,
        info_logs,
        history: history.into_iter().map(Into::into).collect(),
        timestamp: epoch(now),
    })
}

// Plain-text relay state for firmware without a JSON parser: GET /relay_state
pub async fn relay_state<S: Store>(State(state): State<AppState<S>>) -> &'static str {
    let status = state.coordinator.snapshot(Timestamp::now()).await;
    if status.relay_active { "1" } else { "0" }
}

pub async fn health() -> &'static str {
    "OK"
}
