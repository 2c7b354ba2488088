use {
    agentdesk_cron::Error,
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    tracing::error,
};

/// A scheduler error rendered as `{"error": "..."}` with a matching status.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::ScheduleFormat(_) | Error::InvalidTask { .. } | Error::UnknownTimezone { .. } => {
                StatusCode::BAD_REQUEST
            },
            Error::TaskNotFound { .. } => StatusCode::NOT_FOUND,
            Error::AlreadyRunning { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "admin request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}
