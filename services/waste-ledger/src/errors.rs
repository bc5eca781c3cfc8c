use actix_web::{error::ResponseError, http::header, http::StatusCode, HttpResponse};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerServiceError>;

#[derive(Error, Debug)]
pub enum LedgerServiceError {
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Recyclable item not found: {0}")]
    ItemNotFound(i64),

    #[error("Collector not found: {0}")]
    CollectorNotFound(i64),

    #[error("{0}")]
    NotFound(String),

    #[error("Username already registered: {0}")]
    DuplicateUsername(String),

    #[error("Item already exists: {0}")]
    DuplicateItem(String),

    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Could not validate credentials")]
    Unauthenticated,

    #[error("Operation requires the {required} role")]
    Forbidden { required: String },

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Decimal, available: Decimal },

    #[error("Cannot delete item {0} with existing collections")]
    ItemInUse(i64),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for LedgerServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        LedgerServiceError::Validation(err.to_string())
    }
}

impl From<rust_decimal::Error> for LedgerServiceError {
    fn from(err: rust_decimal::Error) -> Self {
        LedgerServiceError::Validation(format!("Decimal error: {}", err))
    }
}

impl ResponseError for LedgerServiceError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        // Storage details stay in the logs
        let error_message = match self {
            LedgerServiceError::Storage(_)
            | LedgerServiceError::Migration(_)
            | LedgerServiceError::Internal(_) => {
                tracing::error!("Request failed: {}", self);
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let mut builder = HttpResponse::build(status_code);
        if status_code == StatusCode::UNAUTHORIZED {
            builder.insert_header((header::WWW_AUTHENTICATE, "Bearer"));
        }

        builder.json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": error_message,
                "type": self.error_type()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            LedgerServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LedgerServiceError::Migration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LedgerServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerServiceError::ItemNotFound(_) => StatusCode::NOT_FOUND,
            LedgerServiceError::CollectorNotFound(_) => StatusCode::NOT_FOUND,
            LedgerServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerServiceError::DuplicateUsername(_) => StatusCode::BAD_REQUEST,
            LedgerServiceError::DuplicateItem(_) => StatusCode::BAD_REQUEST,
            LedgerServiceError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            LedgerServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            LedgerServiceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            LedgerServiceError::AccountDisabled => StatusCode::FORBIDDEN,
            LedgerServiceError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
            LedgerServiceError::ItemInUse(_) => StatusCode::CONFLICT,
            LedgerServiceError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            LedgerServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl LedgerServiceError {
    pub fn error_type(&self) -> &'static str {
        match self {
            LedgerServiceError::Storage(_) => "storage_error",
            LedgerServiceError::Migration(_) => "storage_error",
            LedgerServiceError::Validation(_) => "validation_error",
            LedgerServiceError::ItemNotFound(_) => "not_found",
            LedgerServiceError::CollectorNotFound(_) => "not_found",
            LedgerServiceError::NotFound(_) => "not_found",
            LedgerServiceError::DuplicateUsername(_) => "duplicate_username",
            LedgerServiceError::DuplicateItem(_) => "duplicate_item",
            LedgerServiceError::InvalidCredentials => "invalid_credentials",
            LedgerServiceError::Unauthenticated => "unauthenticated",
            LedgerServiceError::Forbidden { .. } => "forbidden",
            LedgerServiceError::AccountDisabled => "account_disabled",
            LedgerServiceError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerServiceError::ItemInUse(_) => "item_in_use",
            LedgerServiceError::RateLimitExceeded => "rate_limit",
            LedgerServiceError::Internal(_) => "internal_error",
        }
    }
}
