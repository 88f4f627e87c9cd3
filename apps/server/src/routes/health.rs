use actix_web::{http::StatusCode, web, HttpResponse};
use serde::Serialize;

use crate::db::{self, DbPool};
use crate::queue::PgJobQueue;

#[derive(Serialize)]
pub struct LivenessResponse {
    status: &'static str,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    status: &'static str,
    checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    database: &'static str,
    /// Merge jobs waiting in the queue, when the database answered
    pending_jobs: Option<i64>,
}

/// Liveness check - is the process running?
/// Returns 200 if the server is alive.
pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().json(LivenessResponse { status: "ok" })
}

/// Readiness check - can the worker reach its database?
/// Returns 200 with the queue backlog when it can, 503 otherwise.
pub async fn readiness(pool: web::Data<DbPool>) -> HttpResponse {
    let pool = pool.get_ref();

    let pending_jobs = if db::health_check(pool).await {
        PgJobQueue::new(pool.clone()).pending_count().await.ok()
    } else {
        None
    };

    let (status, db_status, http_status) = match pending_jobs {
        Some(_) => ("ready", "ok", StatusCode::OK),
        None => ("not_ready", "error", StatusCode::SERVICE_UNAVAILABLE),
    };

    let response = ReadinessResponse {
        status,
        checks: ReadinessChecks {
            database: db_status,
            pending_jobs,
        },
    };

    HttpResponse::build(http_status).json(response)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/health")
            .route("", web::get().to(liveness))
            .route("/ready", web::get().to(readiness)),
    );
}
