use application::{ApplicationError, ErrorCode};
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, message)
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidPayload, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidPayload => StatusCode::BAD_REQUEST,
        ErrorCode::RecipientNotFound | ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        let code = error.code();
        if code == ErrorCode::ServerError {
            tracing::error!(error = %error, "request failed");
        }
        ApiError::new(status_for(code), code, error.public_message())
    }
}

// 提取器的拒绝信息包含 serde 细节，只写日志，不回给调用方
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "request body rejected");
        ApiError::invalid_payload("invalid request body")
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!(error = %rejection, "query string rejected");
        ApiError::invalid_payload("invalid query parameters")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{DomainError, RepositoryError};

    #[test]
    fn application_errors_map_to_status_codes() {
        let cases = [
            (
                ApplicationError::from(DomainError::invalid_argument("to", "bad")),
                StatusCode::BAD_REQUEST,
            ),
            (ApplicationError::from(DomainError::UserNotFound), StatusCode::NOT_FOUND),
            (
                ApplicationError::from(DomainError::OperationNotAllowed),
                StatusCode::FORBIDDEN,
            ),
            (ApplicationError::Authentication, StatusCode::UNAUTHORIZED),
            (
                ApplicationError::from(RepositoryError::storage("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn storage_details_are_not_exposed() {
        let error = ApiError::from(ApplicationError::from(RepositoryError::storage(
            "password authentication failed for user postgres",
        )));
        assert_eq!(error.body.message, "server error");
        assert_eq!(error.body.code, ErrorCode::ServerError);
    }
}
