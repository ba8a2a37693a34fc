use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use stockinfo_core::config::PriceUpdateConfig;
use stockinfo_core::domain::price_update::{PriceUpdateEvent, PriceUpdateJob, PriceUpdateJobId};
use stockinfo_core::domain::product::{
    validate_price, NewProduct, Product, ProductFilter, ProductId,
};
use stockinfo_core::errors::ApplicationError;
use stockinfo_db::repositories::{
    PriceUpdateEventRepository, ProductRepository, RepositoryError,
};
use tracing::info;

use crate::scheduler::{PriceUpdateScheduler, SchedulerError};

/// Reply to a scheduling request. The price itself changes later.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdateAcknowledgment {
    pub message: String,
    pub job_id: PriceUpdateJobId,
    pub product_id: ProductId,
    pub new_price: Decimal,
    pub delay_minutes: u64,
    pub fires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PriceUpdateHistory {
    pub pending: Vec<PriceUpdateJob>,
    pub history: Vec<PriceUpdateEvent>,
}

#[derive(Clone)]
pub struct ProductService {
    products: Arc<dyn ProductRepository>,
    events: Arc<dyn PriceUpdateEventRepository>,
    scheduler: PriceUpdateScheduler,
    delay_minutes: u64,
    delay: Duration,
}

impl ProductService {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        events: Arc<dyn PriceUpdateEventRepository>,
        scheduler: PriceUpdateScheduler,
        price_update: &PriceUpdateConfig,
    ) -> Self {
        Self {
            products,
            events,
            scheduler,
            delay_minutes: price_update.delay_minutes,
            delay: price_update.delay(),
        }
    }

    pub async fn create(
        &self,
        name: String,
        stock_quantity: i32,
        price: Decimal,
    ) -> Result<Product, ApplicationError> {
        let candidate = NewProduct::try_new(name, stock_quantity, price)?;
        let product = self.products.insert(candidate).await.map_err(persistence)?;

        info!(
            event_name = "product.created",
            product_id = %product.id,
            stock_quantity = product.stock_quantity,
            price = %product.price,
            "product created"
        );
        Ok(product)
    }

    pub async fn list(&self) -> Result<Vec<Product>, ApplicationError> {
        self.products.list().await.map_err(persistence)
    }

    pub async fn get(&self, id: ProductId) -> Result<Product, ApplicationError> {
        self.products
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or(ApplicationError::ProductNotFound(id))
    }

    pub async fn delete(&self, id: ProductId) -> Result<(), ApplicationError> {
        if !self.products.delete(id).await.map_err(persistence)? {
            return Err(ApplicationError::ProductNotFound(id));
        }

        info!(event_name = "product.deleted", product_id = %id, "product deleted");
        Ok(())
    }

    /// An unbounded filter returns the whole catalogue.
    pub async fn filter(&self, filter: &ProductFilter) -> Result<Vec<Product>, ApplicationError> {
        if filter.is_unbounded() {
            return self.list().await;
        }
        self.products.filter(filter).await.map_err(persistence)
    }

    /// Validates the price, then confirms the product exists, then arms a job
    /// with the configured delay. Existence is checked again when the job fires.
    pub async fn schedule_price_update(
        &self,
        id: ProductId,
        new_price: Decimal,
    ) -> Result<PriceUpdateAcknowledgment, ApplicationError> {
        validate_price(new_price)?;
        self.get(id).await?;

        let job = self.scheduler.schedule(id, new_price, self.delay).await.map_err(scheduling)?;

        info!(
            event_name = "product.price_update_scheduled",
            product_id = %id,
            job_id = %job.id,
            new_price = %new_price,
            delay_minutes = self.delay_minutes,
            "price update scheduled"
        );

        Ok(PriceUpdateAcknowledgment {
            message: format!("Price update scheduled in {} minutes.", self.delay_minutes),
            job_id: job.id,
            product_id: id,
            new_price,
            delay_minutes: self.delay_minutes,
            fires_at: job.fires_at,
        })
    }

    /// Armed jobs plus the recorded history for one product. History outlives
    /// the product, so the lookup only fails when nothing at all is known.
    pub async fn price_updates(&self, id: ProductId) -> Result<PriceUpdateHistory, ApplicationError> {
        let pending = self.scheduler.pending(Some(id)).await.map_err(scheduling)?;
        let history = self.events.list_for_product(id).await.map_err(persistence)?;

        if pending.is_empty() && history.is_empty() {
            self.get(id).await?;
        }
        Ok(PriceUpdateHistory { pending, history })
    }

    pub async fn cancel_price_update(
        &self,
        id: ProductId,
        job_id: PriceUpdateJobId,
    ) -> Result<PriceUpdateJob, ApplicationError> {
        self.scheduler
            .cancel(id, &job_id)
            .await
            .map_err(scheduling)?
            .ok_or(ApplicationError::PriceUpdateNotFound(job_id, id))
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn scheduling(error: SchedulerError) -> ApplicationError {
    ApplicationError::Scheduling(error.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal::Decimal;
    use stockinfo_core::config::PriceUpdateConfig;
    use stockinfo_core::domain::price_update::{OverlapPolicy, PriceUpdateJobId, PriceUpdateOutcome};
    use stockinfo_core::domain::product::{ProductFilter, ProductId};
    use stockinfo_core::errors::{ApplicationError, ValidationError};
    use stockinfo_db::repositories::{InMemoryPriceUpdateEventRepository, InMemoryProductRepository};

    use super::ProductService;
    use crate::scheduler::PriceUpdateScheduler;

    fn service(delay_minutes: u64) -> ProductService {
        let products = Arc::new(InMemoryProductRepository::default());
        let events = Arc::new(InMemoryPriceUpdateEventRepository::default());
        let config = PriceUpdateConfig {
            delay_minutes,
            overlap_policy: OverlapPolicy::LastFireWins,
            queue_capacity: 8,
        };
        let scheduler = PriceUpdateScheduler::spawn(
            products.clone(),
            events.clone(),
            config.overlap_policy,
            config.queue_capacity,
        );
        ProductService::new(products, events, scheduler, &config)
    }

    #[tokio::test]
    async fn create_checks_name_before_quantities() {
        let service = service(5);

        let error = service.create("R2D2".to_string(), 0, Decimal::ZERO).await.unwrap_err();
        assert_eq!(error, ApplicationError::from(ValidationError::InvalidName));

        let error = service.create("Widget".to_string(), 0, Decimal::ONE).await.unwrap_err();
        assert_eq!(error, ApplicationError::from(ValidationError::NonPositiveStockOrPrice));

        assert!(service.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn create_get_delete_lifecycle() {
        let service = service(5);
        let created =
            service.create("Gadget".to_string(), 3, Decimal::new(999, 2)).await.expect("create");

        assert_eq!(service.get(created.id).await.expect("get"), created);
        service.delete(created.id).await.expect("delete");
        assert_eq!(
            service.get(created.id).await.unwrap_err(),
            ApplicationError::ProductNotFound(created.id)
        );
        assert_eq!(
            service.delete(created.id).await.unwrap_err(),
            ApplicationError::ProductNotFound(created.id)
        );
    }

    #[tokio::test]
    async fn unbounded_filter_matches_list() {
        let service = service(5);
        service.create("Alpha".to_string(), 1, Decimal::ONE).await.expect("create");
        service.create("Beta".to_string(), 9, Decimal::TEN).await.expect("create");

        let all = service.filter(&ProductFilter::default()).await.expect("filter");
        assert_eq!(all, service.list().await.expect("list"));

        let stocked = service
            .filter(&ProductFilter { min_stock_quantity: Some(5), min_price: None })
            .await
            .expect("filter");
        assert_eq!(stocked.len(), 1);
        assert_eq!(stocked[0].name, "Beta");
    }

    #[tokio::test]
    async fn price_is_validated_before_existence() {
        let service = service(5);

        let error = service.schedule_price_update(ProductId(77), Decimal::ZERO).await.unwrap_err();
        assert_eq!(error, ApplicationError::from(ValidationError::NonPositivePrice));

        let error = service.schedule_price_update(ProductId(77), Decimal::ONE).await.unwrap_err();
        assert_eq!(error, ApplicationError::ProductNotFound(ProductId(77)));
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_update_applies_after_configured_delay() {
        let service = service(2);
        let product =
            service.create("Lamp".to_string(), 4, Decimal::new(2000, 2)).await.expect("create");

        let ack = service
            .schedule_price_update(product.id, Decimal::new(1800, 2))
            .await
            .expect("schedule");
        assert_eq!(ack.message, "Price update scheduled in 2 minutes.");
        assert_eq!(ack.delay_minutes, 2);
        assert_eq!(service.get(product.id).await.expect("get").price, Decimal::new(2000, 2));

        let updates = service.price_updates(product.id).await.expect("updates");
        assert_eq!(updates.pending.len(), 1);
        assert_eq!(updates.pending[0].id, ack.job_id);

        tokio::time::sleep(Duration::from_secs(121)).await;

        assert_eq!(service.get(product.id).await.expect("get").price, Decimal::new(1800, 2));
        let updates = service.price_updates(product.id).await.expect("updates");
        assert!(updates.pending.is_empty());
        let outcomes: Vec<_> = updates.history.iter().map(|event| event.outcome).collect();
        assert_eq!(outcomes, vec![PriceUpdateOutcome::Armed, PriceUpdateOutcome::Applied]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_applies_on_next_worker_turn() {
        let service = service(0);
        let product = service.create("Fan".to_string(), 1, Decimal::ONE).await.expect("create");

        let ack = service.schedule_price_update(product.id, Decimal::TWO).await.expect("schedule");
        assert_eq!(ack.message, "Price update scheduled in 0 minutes.");

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(service.get(product.id).await.expect("get").price, Decimal::TWO);
    }

    #[tokio::test(start_paused = true)]
    async fn history_outlives_the_product() {
        let service = service(1);
        assert_eq!(
            service.price_updates(ProductId(5)).await.unwrap_err(),
            ApplicationError::ProductNotFound(ProductId(5))
        );

        let product = service.create("Rug".to_string(), 1, Decimal::TEN).await.expect("create");
        assert!(service.price_updates(product.id).await.expect("empty").history.is_empty());

        service.schedule_price_update(product.id, Decimal::ONE).await.expect("schedule");
        service.delete(product.id).await.expect("delete");
        tokio::time::sleep(Duration::from_secs(61)).await;

        let updates = service.price_updates(product.id).await.expect("history");
        let outcomes: Vec<_> = updates.history.iter().map(|event| event.outcome).collect();
        assert_eq!(outcomes, vec![PriceUpdateOutcome::Armed, PriceUpdateOutcome::ProductMissing]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_requires_matching_pending_job() {
        let service = service(5);
        let product = service.create("Desk".to_string(), 2, Decimal::TEN).await.expect("create");
        let ack = service.schedule_price_update(product.id, Decimal::ONE).await.expect("schedule");

        let unknown = PriceUpdateJobId("nope".to_string());
        assert_eq!(
            service.cancel_price_update(product.id, unknown.clone()).await.unwrap_err(),
            ApplicationError::PriceUpdateNotFound(unknown, product.id)
        );

        let cancelled =
            service.cancel_price_update(product.id, ack.job_id.clone()).await.expect("cancel");
        assert_eq!(cancelled.id, ack.job_id);

        tokio::time::sleep(Duration::from_secs(6 * 60)).await;
        assert_eq!(service.get(product.id).await.expect("get").price, Decimal::TEN);
    }
}
