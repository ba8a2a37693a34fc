use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use stockinfo_core::domain::product::{NewProduct, Product, ProductFilter, ProductId};

use super::{ProductRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProductRepository for SqlProductRepository {
    async fn insert(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO product (name, stock_quantity, price, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(product.name())
        .bind(product.stock_quantity())
        .bind(product.price().to_string())
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(product.into_product(ProductId(id)))
    }

    async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, stock_quantity, price FROM product ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(product_from_row).collect()
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, stock_quantity, price FROM product WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(product_from_row).transpose()
    }

    async fn filter(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT id, name, stock_quantity, price FROM product");
        if let Some(minimum) = filter.min_stock_quantity {
            query.push(" WHERE stock_quantity >= ").push_bind(minimum);
        }
        query.push(" ORDER BY id");

        let rows = query.build().fetch_all(&self.pool).await?;

        // Prices are stored as decimal text, so the price bound is applied after
        // decoding instead of comparing strings in SQL.
        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            let product = product_from_row(row)?;
            if filter.matches(&product) {
                products.push(product);
            }
        }
        Ok(products)
    }

    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM product WHERE id = ?").bind(id.0).execute(&self.pool).await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_price(&self, id: ProductId, price: Decimal) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE product SET price = ?, updated_at = ? WHERE id = ?")
            .bind(price.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn product_from_row(row: SqliteRow) -> Result<Product, RepositoryError> {
    let price_raw = row.try_get::<String, _>("price")?;
    let price = Decimal::from_str(&price_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid price `{price_raw}`: {error}")))?;

    Ok(Product {
        id: ProductId(row.try_get("id")?),
        name: row.try_get("name")?,
        stock_quantity: row.try_get("stock_quantity")?,
        price,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use stockinfo_core::domain::product::{NewProduct, ProductFilter, ProductId};

    use super::SqlProductRepository;
    use crate::migrations;
    use crate::repositories::ProductRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn new_product(name: &str, stock_quantity: i32, price: Decimal) -> NewProduct {
        NewProduct::try_new(name, stock_quantity, price).expect("valid fixture")
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids_and_preserves_decimal_scale() {
        let pool = setup_pool().await;
        let repo = SqlProductRepository::new(pool.clone());

        let first = repo.insert(new_product("Hammer", 4, Decimal::new(1250, 2))).await.expect("insert");
        let second = repo.insert(new_product("Saw", 2, Decimal::new(30, 0))).await.expect("insert");

        assert!(second.id > first.id);
        let found = repo.find_by_id(first.id).await.expect("find").expect("present");
        assert_eq!(found, first);
        assert_eq!(found.price.to_string(), "12.50");

        pool.close().await;
    }

    #[tokio::test]
    async fn find_missing_product_returns_none() {
        let pool = setup_pool().await;
        let repo = SqlProductRepository::new(pool.clone());

        assert_eq!(repo.find_by_id(ProductId(404)).await.expect("find"), None);

        pool.close().await;
    }

    #[tokio::test]
    async fn filter_combines_stock_and_price_bounds() {
        let pool = setup_pool().await;
        let repo = SqlProductRepository::new(pool.clone());

        let cheap_plenty = repo.insert(new_product("Nails", 500, Decimal::new(5, 2))).await.expect("insert");
        let pricey_plenty = repo.insert(new_product("Drill", 10, Decimal::new(9999, 2))).await.expect("insert");
        let pricey_scarce = repo.insert(new_product("Lathe", 1, Decimal::new(150_000, 2))).await.expect("insert");

        let by_stock = repo
            .filter(&ProductFilter { min_stock_quantity: Some(5), min_price: None })
            .await
            .expect("filter by stock");
        assert_eq!(by_stock, vec![cheap_plenty.clone(), pricey_plenty.clone()]);

        // As text "1500.00" sorts before "9.00"; the bound must compare numerically.
        let by_price = repo
            .filter(&ProductFilter { min_stock_quantity: None, min_price: Some(Decimal::new(900, 2)) })
            .await
            .expect("filter by price");
        assert_eq!(by_price, vec![pricey_plenty.clone(), pricey_scarce.clone()]);

        let both = repo
            .filter(&ProductFilter { min_stock_quantity: Some(5), min_price: Some(Decimal::TEN) })
            .await
            .expect("filter by both");
        assert_eq!(both, vec![pricey_plenty.clone()]);

        let all = repo.filter(&ProductFilter::default()).await.expect("unbounded filter");
        assert_eq!(all, repo.list().await.expect("list"));
        assert_eq!(all.len(), 3);

        pool.close().await;
    }

    #[tokio::test]
    async fn update_price_reports_missing_rows() {
        let pool = setup_pool().await;
        let repo = SqlProductRepository::new(pool.clone());
        let product = repo.insert(new_product("Clamp", 3, Decimal::ONE)).await.expect("insert");

        assert!(repo.update_price(product.id, Decimal::new(275, 2)).await.expect("update"));
        let updated = repo.find_by_id(product.id).await.expect("find").expect("present");
        assert_eq!(updated.price, Decimal::new(275, 2));
        assert_eq!(updated.stock_quantity, 3);

        assert!(repo.delete(product.id).await.expect("delete"));
        assert!(!repo.update_price(product.id, Decimal::TEN).await.expect("update missing"));
        assert_eq!(repo.find_by_id(product.id).await.expect("find"), None);

        pool.close().await;
    }

    #[tokio::test]
    async fn delete_is_permanent_and_ids_are_not_reused() {
        let pool = setup_pool().await;
        let repo = SqlProductRepository::new(pool.clone());
        let product = repo.insert(new_product("Level", 1, Decimal::ONE)).await.expect("insert");

        assert!(repo.delete(product.id).await.expect("delete"));
        assert!(!repo.delete(product.id).await.expect("second delete"));

        let replacement = repo.insert(new_product("Level", 1, Decimal::ONE)).await.expect("insert");
        assert_ne!(replacement.id, product.id);

        pool.close().await;
    }
}
