// API request handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::dispatch::{Attachment, InboundRequest};
use crate::registry::ServiceType;

// Root endpoint
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Leshiy-AI dispatcher",
        "endpoints": [
            "POST /v1/chat",
            "POST /v1/dispatch/{service_type}",
            "GET /v1/models",
            "PUT /management/models"
        ]
    }))
}

#[derive(Debug, Deserialize)]
pub struct AttachmentPayload {
    pub mime_type: String,
    /// base64, bare or as a `data:` URI
    pub data: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
}

impl From<ChatRequestBody> for InboundRequest {
    fn from(body: ChatRequestBody) -> Self {
        let attachments = body
            .attachments
            .into_iter()
            .map(|a| {
                let att = Attachment::from_base64(a.mime_type, a.data);
                match a.file_name {
                    Some(name) => att.with_file_name(name),
                    None => att,
                }
            })
            .collect();
        InboundRequest {
            text: body.text,
            attachments,
        }
    }
}

pub async fn chat(State(state): State<AppState>, Json(body): Json<ChatRequestBody>) -> impl IntoResponse {
    let request = InboundRequest::from(body);
    Json(state.chat.handle_turn(&request).await)
}

pub async fn dispatch_as(
    State(state): State<AppState>,
    Path(service_type): Path<String>,
    Json(body): Json<ChatRequestBody>,
) -> impl IntoResponse {
    let service_type = match service_type.parse::<ServiceType>() {
        Ok(st) => st,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": { "message": e } }))).into_response();
        }
    };

    let request = InboundRequest::from(body);
    let result = state.chat.dispatcher().dispatch_as(service_type, &request).await;
    Json(result).into_response()
}

pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
    let dispatcher = state.chat.dispatcher();
    let resolver = dispatcher.resolver();

    let services: Vec<Value> = dispatcher
        .registry()
        .menu_config()
        .into_iter()
        .map(|section| {
            let active = resolver.resolve(section.service_type).map(|r| r.id.to_string());
            json!({
                "service_type": section.service_type,
                "name": section.name,
                "kv_key": section.kv_key,
                "models": section.models,
                "active": active,
            })
        })
        .collect();

    Json(json!({ "services": services }))
}
