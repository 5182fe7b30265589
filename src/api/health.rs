use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary; no credentials.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    let upstreams: Vec<Value> = state
        .upstreams()
        .iter()
        .map(|upstream| {
            json!({
                "name": upstream.config.name,
                "provider": upstream.provider.as_str(),
                "models": upstream.config.models.len(),
                "text_only": upstream.config.text_only,
                "is_default": upstream.config.is_default,
            })
        })
        .collect();
    Json(json!({
        "status": "chatbridge-rs is running",
        "config": {
            "upstream_services_count": config.upstream_services.len(),
            "known_models": state.model_router.model_names(),
            "upstreams": upstreams,
            "features": {
                "log_level": config.features.log_level,
                "default_thinking": config.features.default_thinking.is_some(),
            }
        }
    }))
}
