pub mod error;
pub mod handlers;
pub mod models;

use axum::{Router, routing::get};

use crate::AppState;
use crate::store::Store;

/// Device protocol and operator views under `/api/v1`, plus `/health`.
pub fn router<S: Store>() -> Router<AppState<S>> {
    let v1 = Router::new()
        .route(
            "/status",
            get(handlers::get_status::<S>).post(handlers::report_status::<S>),
        )
        .route(
            "/command",
            get(handlers::poll_command::<S>).post(handlers::post_command::<S>),
        )
        .route("/logs", get(handlers::list_logs::<S>))
        .route("/decisions", get(handlers::list_decisions::<S>))
        .route("/devices", get(handlers::list_devices::<S>))
        .route("/history", get(handlers::status_history::<S>))
        .route("/full_status", get(handlers::full_status::<S>))
        .route("/relay_state", get(handlers::relay_state::<S>));

    Router::new()
        .nest("/api/v1", v1)
        .route("/health", get(handlers::health))
}
