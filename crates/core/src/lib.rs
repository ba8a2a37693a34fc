pub mod config;
pub mod domain;
pub mod errors;

pub use domain::price_update::{
    OverlapPolicy, PriceUpdateEvent, PriceUpdateEventId, PriceUpdateJob, PriceUpdateJobId,
    PriceUpdateOutcome,
};
pub use domain::product::{NewProduct, Product, ProductFilter, ProductId};
pub use errors::{ApplicationError, DomainError, InterfaceError, ValidationError};
