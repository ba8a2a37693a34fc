use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use stockinfo_core::domain::price_update::PriceUpdateEvent;
use stockinfo_core::domain::product::{NewProduct, Product, ProductFilter, ProductId};

pub mod memory;
pub mod price_update;
pub mod product;

pub use memory::{InMemoryPriceUpdateEventRepository, InMemoryProductRepository};
pub use price_update::SqlPriceUpdateEventRepository;
pub use product::SqlProductRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Stores the product and returns it with its store-assigned id.
    async fn insert(&self, product: NewProduct) -> Result<Product, RepositoryError>;

    /// All products ordered by id.
    async fn list(&self) -> Result<Vec<Product>, RepositoryError>;

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    async fn filter(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError>;

    /// Returns `false` when no product had that id.
    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError>;

    /// Overwrites the price in a single statement. Returns `false` when the
    /// product no longer exists.
    async fn update_price(&self, id: ProductId, price: Decimal) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait PriceUpdateEventRepository: Send + Sync {
    async fn append(&self, event: PriceUpdateEvent) -> Result<(), RepositoryError>;

    /// Events for one product, oldest first.
    async fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<PriceUpdateEvent>, RepositoryError>;
}
