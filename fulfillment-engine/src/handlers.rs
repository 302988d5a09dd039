use actix_web::{web, HttpResponse, Responder};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;

// ===== Health Check =====
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "fulfillment-engine",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ===== Prometheus =====
pub async fn prometheus_metrics() -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(format!("Failed to encode metrics: {}", e));
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(prometheus_metrics));
}
