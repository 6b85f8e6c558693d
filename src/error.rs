use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tokio join error: {0}")]
    Join(#[from] JoinError),

    #[error("Upload error: {0}")]
    Multipart(String),

    #[error("Failed to download image: {0}")]
    Download(String),

    #[error("Timed out downloading image: {0}")]
    Timeout(String),

    #[error("External tool error: {0}")]
    Tool(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

// MultipartError holds a boxed non-Send payload, so only its message is kept.
impl From<actix_multipart::MultipartError> for AppError {
    fn from(e: actix_multipart::MultipartError) -> Self {
        AppError::Multipart(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout(e.to_string())
        } else {
            AppError::Download(e.to_string())
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_server_error() {
            log::error!("Request failed: {}", self);
            "Metadata extraction failed".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(serde_json::json!({
            "error": message,
        }))
    }

    fn status_code(&self) -> StatusCode {
        match *self {
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Multipart(_) => StatusCode::BAD_REQUEST,
            AppError::Download(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout(_) => StatusCode::BAD_REQUEST,
            AppError::Tool(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}
