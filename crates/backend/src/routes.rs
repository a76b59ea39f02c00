use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;

/// Конфигурация всех роутов приложения
pub fn configure_routes() -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        // ========================================
        // A001 Tour handlers
        // ========================================
        .route(
            "/api/tours",
            get(handlers::a001_tour::list_all).post(handlers::a001_tour::create),
        )
        .route("/api/tours/top-5", get(handlers::a001_tour::top_tours))
        .route("/api/tours/stats", get(handlers::a001_tour::stats))
        .route(
            "/api/tours/testdata",
            post(handlers::a001_tour::insert_test_data),
        )
        .route(
            "/api/tours/:id",
            get(handlers::a001_tour::get_by_id)
                .patch(handlers::a001_tour::update)
                .delete(handlers::a001_tour::delete),
        )
}
