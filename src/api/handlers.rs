use actix_web::{web, HttpResponse, Responder};
use prometheus::{Encoder, TextEncoder};

use crate::domain::order::Order;

use super::AppState;

pub(super) async fn list_orders(state: web::Data<AppState>) -> HttpResponse {
    let response = match state.orders.get_all_orders().await {
        Ok(orders) => {
            let orders: Vec<&Order> = orders.iter().map(|o| o.as_ref()).collect();
            HttpResponse::Ok().json(orders)
        }
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    };

    state.metrics.record_http("/orders", response.status().as_u16());
    response
}

pub(super) async fn get_order(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let order_uid = path.into_inner();

    let response = match state.orders.get_order(&order_uid).await {
        Ok(Some(order)) => HttpResponse::Ok().json(order.as_ref()),
        Ok(None) => HttpResponse::NotFound().body("Order not found"),
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    };

    state.metrics.record_http("/orders/{id}", response.status().as_u16());
    response
}

pub(super) async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "order-ingest"
    }))
}

pub(super) async fn metrics(state: web::Data<AppState>) -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().body(e.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
