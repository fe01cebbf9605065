// Management API handlers (model selection)

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::db::{ActiveSelection, SelectionError};
use crate::registry::ServiceType;

#[derive(Debug, Deserialize)]
pub struct SelectModelRequest {
    pub service_type: ServiceType,
    pub model_id: String,
}

pub async fn select_model(
    State(state): State<AppState>,
    Json(body): Json<SelectModelRequest>,
) -> impl IntoResponse {
    let dispatcher = state.chat.dispatcher();
    let selection = ActiveSelection::new(dispatcher.store(), dispatcher.registry());

    match selection.select(body.service_type, &body.model_id) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "service_type": body.service_type,
                "active": body.model_id,
            })),
        ),
        Err(e) => {
            let status = match e {
                SelectionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            };
            tracing::warn!("Model selection rejected: {}", e);
            (status, Json(json!({ "error": { "message": e.to_string() } })))
        }
    }
}
