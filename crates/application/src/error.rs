use domain::{DomainError, RepositoryError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("infrastructure error: {message}")]
    Infrastructure {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    #[error("authentication failed")]
    Authentication,
}

impl ApplicationError {
    pub fn infrastructure_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ApplicationError::Infrastructure {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// 面向调用方的稳定错误码
    pub fn code(&self) -> ErrorCode {
        match self {
            ApplicationError::Domain(DomainError::InvalidArgument { .. }) => {
                ErrorCode::InvalidPayload
            }
            ApplicationError::Domain(DomainError::UserNotFound) => ErrorCode::RecipientNotFound,
            ApplicationError::Domain(DomainError::MessageNotFound) => ErrorCode::NotFound,
            ApplicationError::Domain(DomainError::OperationNotAllowed) => ErrorCode::Forbidden,
            ApplicationError::Repository(RepositoryError::NotFound) => ErrorCode::NotFound,
            ApplicationError::Repository(_) | ApplicationError::Infrastructure { .. } => {
                ErrorCode::ServerError
            }
            ApplicationError::Authentication => ErrorCode::Unauthorized,
        }
    }

    /// 面向调用方的说明文字，不包含存储层细节
    pub fn public_message(&self) -> String {
        match self {
            ApplicationError::Domain(DomainError::InvalidArgument { field, reason }) => {
                format!("{field}: {reason}")
            }
            ApplicationError::Domain(DomainError::UserNotFound) => {
                "recipient not found".to_string()
            }
            ApplicationError::Domain(DomainError::MessageNotFound)
            | ApplicationError::Repository(RepositoryError::NotFound) => {
                "message not found".to_string()
            }
            ApplicationError::Domain(DomainError::OperationNotAllowed) => "forbidden".to_string(),
            ApplicationError::Repository(_) | ApplicationError::Infrastructure { .. } => {
                "server error".to_string()
            }
            ApplicationError::Authentication => "authentication required".to_string(),
        }
    }
}

/// 机器可读的错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidPayload,
    RecipientNotFound,
    NotFound,
    Forbidden,
    Unauthorized,
    ServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidPayload => "INVALID_PAYLOAD",
            ErrorCode::RecipientNotFound => "RECIPIENT_NOT_FOUND",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::ServerError => "SERVER_ERROR",
        }
    }
}
