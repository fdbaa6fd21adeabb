use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use beanpay_engine::{traits::OrderStoreError, OrderFlowError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("{0}")]
    PaymentDeclined(String),
    #[error("The payment provider could not complete the request. {0}")]
    ProviderUnavailable(String),
    #[error("The order could not be cancelled. {0}")]
    CannotCancel(String),
    #[error("The payment could not be captured. {0}")]
    CannotCapture(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::CannotCancel(_) => StatusCode::CONFLICT,
            Self::CannotCapture(_) | Self::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) | Self::BackendError(_) | Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) | Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<OrderFlowError> for ServerError {
    fn from(e: OrderFlowError) -> Self {
        match e {
            OrderFlowError::AuthorizationDeclined(reason) => Self::PaymentDeclined(reason.to_string()),
            OrderFlowError::ProviderUnavailable(detail) => Self::ProviderUnavailable(detail),
            OrderFlowError::OrderNotFound(txid) => Self::NoRecordFound(format!("Order {txid}")),
            OrderFlowError::CancellationFailed(detail) => Self::CannotCancel(detail),
            OrderFlowError::CaptureFailed(detail) => Self::CannotCapture(detail),
            OrderFlowError::StoreError(OrderStoreError::NotFound(txid)) => Self::NoRecordFound(format!("Order {txid}")),
            OrderFlowError::StoreError(e) => Self::BackendError(e.to_string()),
        }
    }
}
