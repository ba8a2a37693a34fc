use thiserror::Error;

use crate::domain::price_update::PriceUpdateJobId;
use crate::domain::product::ProductId;

/// Field-level rejections. The messages are shown to API clients verbatim.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Product name cannot contain numbers.")]
    InvalidName,
    #[error("Stock quantity and price must be greater than zero.")]
    NonPositiveStockOrPrice,
    #[error("Price must be greater than zero.")]
    NonPositivePrice,
    #[error("Query parameter `{field}` is not a valid number.")]
    MalformedNumber { field: &'static str },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("unsupported overlap policy `{0}` (expected last_fire_wins|last_scheduled_wins)")]
    UnknownOverlapPolicy(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("product {0} was not found")]
    ProductNotFound(ProductId),
    #[error("price update {0} is not pending for product {1}")]
    PriceUpdateNotFound(PriceUpdateJobId, ProductId),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("scheduler failure: {0}")]
    Scheduling(String),
}

impl From<ValidationError> for ApplicationError {
    fn from(value: ValidationError) -> Self {
        Self::Domain(DomainError::Validation(value))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found")]
    NotFound { correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Text safe to return to a client. Bad requests echo the validation
    /// message; everything else gets a fixed sentence.
    pub fn user_message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. } => message,
            Self::NotFound { .. } => "The requested resource was not found.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::Validation(error)) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::Domain(error @ DomainError::UnknownOverlapPolicy(_)) => {
                Self::Internal { message: error.to_string(), correlation_id }
            }
            ApplicationError::ProductNotFound(_) | ApplicationError::PriceUpdateNotFound(..) => {
                Self::NotFound { correlation_id }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Scheduling(message) => {
                Self::Internal { message, correlation_id }
            }
        }
    }
}
