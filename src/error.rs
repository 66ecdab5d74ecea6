use thiserror::Error;

/// Application-wide error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parent post not found: {0}")]
    InvalidParent(String),

    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Secret has expired: {0}")]
    Expired(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Host unavailable: {0}")]
    HostUnavailable(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convert AppError to HTTP status codes for web responses
impl AppError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::InvalidParent(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            // Reserved for plain REST consumers; the integration endpoints
            // answer expiry with a 200 payload instead (see web::routes).
            Self::Expired(_) => StatusCode::GONE,
            Self::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::HostUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::AuthRequired => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16()
        });
        (status, axum::Json(body)).into_response()
    }
}
