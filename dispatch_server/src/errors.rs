use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use dispatch_engine::{DeliveryError, LedgerError, PaymentFlowError, SettlementError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The request could not be authenticated. {0}")]
    Unauthorized(String),
    #[error("Access denied. {0}")]
    Forbidden(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The request conflicts with the current state. {0}")]
    Conflict(String),
    #[error("An upstream service failed. {0}")]
    UpstreamError(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<LedgerError> for ServerError {
    fn from(e: LedgerError) -> Self {
        Self::BackendError(e.to_string())
    }
}

impl From<PaymentFlowError> for ServerError {
    fn from(e: PaymentFlowError) -> Self {
        match e {
            PaymentFlowError::InvalidSignature | PaymentFlowError::MalformedPayload(_) => {
                Self::InvalidRequestBody(e.to_string())
            },
            // A 5xx makes the gateway retry, which is what we want when our side failed
            PaymentFlowError::IdempotencyError(_) | PaymentFlowError::Ledger(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<SettlementError> for ServerError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::NotFound(_) | SettlementError::PayoutNotFound(_) => Self::NoRecordFound(e.to_string()),
            SettlementError::AlreadyReleased(_) | SettlementError::PayoutNotPending(_) => Self::Conflict(e.to_string()),
            SettlementError::Gateway(_) => Self::UpstreamError(e.to_string()),
            SettlementError::Ledger(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<DeliveryError> for ServerError {
    fn from(e: DeliveryError) -> Self {
        match e {
            DeliveryError::NotFound(_) | DeliveryError::OrderNotFound(_) | DeliveryError::RiderNotFound(_) => {
                Self::NoRecordFound(e.to_string())
            },
            DeliveryError::NotAssignedRider { .. } | DeliveryError::RiderNotApproved(_) => Self::Forbidden(e.to_string()),
            DeliveryError::OrderNotPaid(_) |
            DeliveryError::DeliveryExists(_) |
            DeliveryError::NoPickupLocation(_) |
            DeliveryError::IllegalTransition { .. } |
            DeliveryError::NotDelivered(_) |
            DeliveryError::RiderBusy(_) => Self::Conflict(e.to_string()),
            DeliveryError::Settlement(inner) => inner.into(),
            DeliveryError::Ledger(_) => Self::BackendError(e.to_string()),
        }
    }
}
