//! HTTP server

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use wizard_core::ServerConfig;
use wizard_engine::{WizardAction, WizardSummary};

use crate::app::AppState;
use crate::error::ApiError;

pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub async fn run(self) -> Result<()> {
        let addr = self.config.address();
        let app = build_router(self.state);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;
        info!(address = %addr, "HTTP server listening");

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        Ok(())
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/v1/wizards", get(list_wizards))
        .route("/api/v1/wizard", post(dispatch))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

// Route handlers

async fn root() -> Json<Value> {
    Json(json!({
        "service": "wizard-server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn list_wizards(State(state): State<AppState>) -> Json<Vec<WizardSummary>> {
    Json(state.registry.describe())
}

/// Execute one `WizardAction`; success is wrapped as `{"data": ...}`
async fn dispatch(
    State(state): State<AppState>,
    body: std::result::Result<Json<WizardAction>, JsonRejection>,
) -> std::result::Result<Json<Value>, ApiError> {
    let Json(action) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let data = state.registry.dispatch(action).await?;
    Ok(Json(json!({ "data": data })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use wizard_core::WizardConfig;

    async fn router() -> Router {
        let config = WizardConfig {
            storage: Default::default(),
            timeouts: Default::default(),
            server: Default::default(),
        };
        build_router(AppState::new(&config).await.unwrap())
    }

    async fn call(app: &Router, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/wizard")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health_check_handler() {
        assert_eq!(health_check().await, StatusCode::OK);
        assert_eq!(root().await.0["service"], "wizard-server");
    }

    #[tokio::test]
    async fn test_wizard_listing() {
        let app = router().await;
        let response = app
            .oneshot(Request::builder().uri("/api/v1/wizards").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let listed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(listed.as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_order_flow_over_http() {
        let app = router().await;
        let wizard = json!({"wizardId": "order-intake", "tenantId": "acme", "userId": "ada"});
        let with = |action: &str, extra: Value| {
            let mut body = wizard.clone();
            body["action"] = json!(action);
            if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
                body.extend(extra);
            }
            body
        };

        let (status, init) = call(&app, with("init", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(init["data"]["currentStep"], "customer");

        let (status, rejected) = call(&app, with("next", json!({}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(rejected["code"], "validation_rejected");
        assert_eq!(rejected["details"]["step"], "customer");
        assert!(rejected["details"]["fields"]["email"].is_string());

        let patch = json!({"patch": {"customerName": "Ada", "email": "ada@example.com"}});
        let (status, saved) = call(&app, with("save", patch)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["data"]["context"]["state"]["email"], "ada@example.com");

        let (status, moved) = call(&app, with("next", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(moved["data"]["currentStep"], "items");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let app = router().await;

        let (status, body) = call(&app, json!({"action": "load", "wizardId": "missing"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "unknown_wizard");

        let (status, body) = call(&app, json!({"action": "prev", "wizardId": "company-setup"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "no_draft");

        let (status, body) = call(&app, json!({"action": "explode"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "bad_request");
    }
}
