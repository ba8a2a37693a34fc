use std::str::FromStr;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stockinfo_core::domain::price_update::PriceUpdateJobId;
use stockinfo_core::domain::product::{Product, ProductFilter, ProductId};
use stockinfo_core::errors::{ApplicationError, InterfaceError, ValidationError};
use tracing::{error, warn};
use uuid::Uuid;

use crate::service::{PriceUpdateAcknowledgment, PriceUpdateHistory, ProductService};

#[derive(Clone)]
pub struct ProductsState {
    service: ProductService,
}

/// Absent fields default to empty/zero so they surface as validation
/// messages instead of deserialization errors.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateProductRequest {
    pub name: String,
    pub stock_quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterQuery {
    pub min_stock_quantity: Option<String>,
    pub min_price: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePriceQuery {
    pub new_price: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: new_correlation_id(),
        })
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        Self(error.into_interface(new_correlation_id()))
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::from(ApplicationError::from(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let correlation_id = self.0.correlation_id();
        let status = match &self.0 {
            InterfaceError::BadRequest { message, .. } => {
                let body = ErrorBody { error: message.clone(), correlation_id: None };
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
            InterfaceError::NotFound { .. } => return StatusCode::NOT_FOUND.into_response(),
            InterfaceError::ServiceUnavailable { message, .. } => {
                warn!(
                    event_name = "http.store_unavailable",
                    correlation_id = %correlation_id,
                    error = %message,
                    "request failed on the product store"
                );
                StatusCode::SERVICE_UNAVAILABLE
            }
            InterfaceError::Internal { message, .. } => {
                error!(
                    event_name = "http.internal_error",
                    correlation_id = %correlation_id,
                    error = %message,
                    "request failed with an internal error"
                );
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorBody {
            error: self.0.user_message().to_string(),
            correlation_id: Some(correlation_id.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(service: ProductService) -> Router {
    Router::new()
        .route("/api/products", get(list_products).post(create_product))
        .route("/api/products/filter", get(filter_products))
        .route("/api/products/{id}", get(get_product).delete(delete_product))
        .route("/api/products/{id}/update-price", put(update_price))
        .route("/api/products/{id}/price-updates", get(list_price_updates))
        .route("/api/products/{id}/price-updates/{job_id}", delete(cancel_price_update))
        .with_state(ProductsState { service })
}

async fn create_product(
    State(state): State<ProductsState>,
    payload: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let product =
        state.service.create(request.name, request.stock_quantity, request.price).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn list_products(State(state): State<ProductsState>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.service.list().await?))
}

async fn filter_products(
    State(state): State<ProductsState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let filter = ProductFilter {
        min_stock_quantity: parse_optional(query.min_stock_quantity, "minStockQuantity")?,
        min_price: parse_optional(query.min_price, "minPrice")?,
    };
    Ok(Json(state.service.filter(&filter).await?))
}

async fn get_product(
    State(state): State<ProductsState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Product>, ApiError> {
    let id = product_id(id)?;
    Ok(Json(state.service.get(id).await?))
}

async fn delete_product(
    State(state): State<ProductsState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = product_id(id)?;
    state.service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// A missing `newPrice` is treated as zero and rejected as non-positive.
async fn update_price(
    State(state): State<ProductsState>,
    id: Result<Path<i64>, PathRejection>,
    Query(query): Query<UpdatePriceQuery>,
) -> Result<Json<PriceUpdateAcknowledgment>, ApiError> {
    let id = product_id(id)?;
    let new_price = parse_optional(query.new_price, "newPrice")?.unwrap_or(Decimal::ZERO);
    Ok(Json(state.service.schedule_price_update(id, new_price).await?))
}

async fn list_price_updates(
    State(state): State<ProductsState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<PriceUpdateHistory>, ApiError> {
    let id = product_id(id)?;
    Ok(Json(state.service.price_updates(id).await?))
}

async fn cancel_price_update(
    State(state): State<ProductsState>,
    path: Result<Path<(i64, String)>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path((id, job_id)) = path.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    state.service.cancel_price_update(ProductId(id), PriceUpdateJobId(job_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn product_id(path: Result<Path<i64>, PathRejection>) -> Result<ProductId, ApiError> {
    let Path(id) = path.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    Ok(ProductId(id))
}

/// Empty values count as absent.
fn parse_optional<T: FromStr>(
    raw: Option<String>,
    field: &'static str,
) -> Result<Option<T>, ValidationError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => {
            value.parse().map(Some).map_err(|_| ValidationError::MalformedNumber { field })
        }
    }
}

fn new_correlation_id() -> String {
    format!("req-{}", Uuid::new_v4().simple())
}
