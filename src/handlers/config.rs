use crate::{
    error::{AppError, AppResult},
    state::AppState,
};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Read-only view of the running configuration.
///
/// The upstream credential is redacted: the response reports whether one is
/// configured, never the key itself.
pub async fn get_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let config = state.get_config();

    let mut value =
        serde_json::to_value(&config).map_err(|e| AppError::Internal(e.to_string()))?;

    if let Some(upstream) = value.get_mut("upstream").and_then(|u| u.as_object_mut()) {
        let configured = upstream
            .get("api_key")
            .and_then(|k| k.as_str())
            .map(|k| !k.is_empty())
            .unwrap_or(false);
        upstream.remove("api_key");
        upstream.insert(
            "api_key_configured".to_string(),
            serde_json::Value::Bool(configured),
        );
    }

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": value
    })))
}
