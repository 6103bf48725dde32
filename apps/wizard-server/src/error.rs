//! Mapping of engine errors onto HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use wizard_core::StorageError;
use wizard_engine::WizardError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// Error returned by HTTP handlers
#[derive(Debug)]
pub enum ApiError {
    Wizard(WizardError),
    /// Request body could not be read as an action
    BadRequest(String),
}

impl From<WizardError> for ApiError {
    fn from(err: WizardError) -> Self {
        ApiError::Wizard(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        let ApiError::Wizard(err) = self else {
            return StatusCode::BAD_REQUEST;
        };
        match err {
            WizardError::ValidationRejected { .. }
            | WizardError::GuardRejected { .. }
            | WizardError::InvalidPatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WizardError::UnknownWizard(_) | WizardError::NoDraft(_) => StatusCode::NOT_FOUND,
            WizardError::Queue(wizard_core::QueueError::NotFound(_)) => StatusCode::NOT_FOUND,
            WizardError::Storage(StorageError::Conflict { .. })
            | WizardError::Queue(wizard_core::QueueError::Duplicate(_)) => StatusCode::CONFLICT,
            WizardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::BadRequest(message) => ErrorBody {
                error: message.clone(),
                code: "bad_request",
                details: None,
            },
            ApiError::Wizard(err) => ErrorBody {
                error: err.to_string(),
                code: err.code(),
                details: details(err),
            },
        }
    }
}

fn details(err: &WizardError) -> Option<Value> {
    match err {
        WizardError::ValidationRejected { step, errors } => {
            Some(serde_json::json!({ "step": step, "fields": errors }))
        }
        WizardError::GuardRejected { step } | WizardError::UnknownStep { step } => {
            Some(serde_json::json!({ "step": step }))
        }
        WizardError::Storage(StorageError::Conflict { expected, found, .. }) => {
            Some(serde_json::json!({ "expectedRevision": expected, "storedRevision": found }))
        }
        _ => None,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();

        if status.is_server_error() {
            error!(status = %status, code = body.code, error = %body.error, "Request failed");
        } else {
            warn!(status = %status, code = body.code, error = %body.error, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}
