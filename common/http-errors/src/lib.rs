use axum::{http::{StatusCode, HeaderValue}, response::{IntoResponse, Response}, Json};
use serde::Serialize;

pub const ERROR_CODE_HEADER: &str = "X-Error-Code";

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")] pub message: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized { code: &'static str },
    BadRequest { code: &'static str, message: Option<String> },
    NotFound { code: &'static str, message: Option<String> },
    /// An upstream dependency (identity provider, document store) failed.
    BadGateway { code: &'static str, message: Option<String> },
    Internal { message: Option<String> },
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(e: E) -> Self { Self::Internal { message: Some(e.to_string()) } }
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self { Self::BadRequest { code, message: Some(message.into()) } }
    pub fn bad_gateway<E: std::fmt::Display>(code: &'static str, e: E) -> Self { Self::BadGateway { code, message: Some(e.to_string()) } }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized { code }
            | ApiError::BadRequest { code, .. }
            | ApiError::NotFound { code, .. }
            | ApiError::BadGateway { code, .. } => *code,
            ApiError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_code = self.code();
        let message = match self {
            ApiError::Unauthorized { .. } => None,
            ApiError::BadRequest { message, .. }
            | ApiError::NotFound { message, .. }
            | ApiError::BadGateway { message, .. }
            | ApiError::Internal { message } => message,
        };
        let body = ErrorBody { code: error_code.into(), message };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert(ERROR_CODE_HEADER, val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
