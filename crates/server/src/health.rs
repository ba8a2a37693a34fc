use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use stockinfo_db::DbPool;

use crate::scheduler::PriceUpdateScheduler;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    scheduler: PriceUpdateScheduler,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub scheduler: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, scheduler: PriceUpdateScheduler) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, scheduler })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let scheduler = scheduler_check(&state.scheduler).await;
    let ready = database.status == "ready" && scheduler.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "stockinfo-server runtime initialized".to_string(),
        },
        database,
        scheduler,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn scheduler_check(scheduler: &PriceUpdateScheduler) -> HealthCheck {
    match scheduler.pending_count().await {
        Ok(armed) => HealthCheck {
            status: "ready",
            detail: format!("price update worker running with {armed} armed job(s)"),
        },
        Err(error) => HealthCheck { status: "degraded", detail: error.to_string() },
    }
}
