use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tokio::sync::RwLock;

use stockinfo_core::domain::price_update::PriceUpdateEvent;
use stockinfo_core::domain::product::{NewProduct, Product, ProductFilter, ProductId};

use super::{PriceUpdateEventRepository, ProductRepository, RepositoryError};

#[derive(Default)]
struct ProductTable {
    last_id: i64,
    rows: BTreeMap<ProductId, Product>,
}

/// Process-local store with the same id semantics as the SQL table: ids grow
/// monotonically and are never handed out twice.
#[derive(Default)]
pub struct InMemoryProductRepository {
    table: RwLock<ProductTable>,
}

#[async_trait::async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn insert(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let mut table = self.table.write().await;
        table.last_id += 1;
        let product = product.into_product(ProductId(table.last_id));
        table.rows.insert(product.id, product.clone());
        Ok(product)
    }

    async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        let table = self.table.read().await;
        Ok(table.rows.values().cloned().collect())
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let table = self.table.read().await;
        Ok(table.rows.get(&id).cloned())
    }

    async fn filter(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let table = self.table.read().await;
        Ok(table.rows.values().filter(|product| filter.matches(product)).cloned().collect())
    }

    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let mut table = self.table.write().await;
        Ok(table.rows.remove(&id).is_some())
    }

    async fn update_price(&self, id: ProductId, price: Decimal) -> Result<bool, RepositoryError> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&id) {
            Some(product) => {
                product.price = price;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryPriceUpdateEventRepository {
    events: RwLock<Vec<PriceUpdateEvent>>,
}

#[async_trait::async_trait]
impl PriceUpdateEventRepository for InMemoryPriceUpdateEventRepository {
    async fn append(&self, event: PriceUpdateEvent) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        events.push(event);
        Ok(())
    }

    async fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<PriceUpdateEvent>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events.iter().filter(|event| event.product_id == product_id).cloned().collect())
    }
}
