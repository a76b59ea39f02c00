use axum::extract::{Path, RawQuery};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use contracts::domain::a001_tour::aggregate::{TourDto, TourPatch};
use contracts::shared::api_response::ApiResponse;

use crate::domain::a001_tour::{service, TourError};
use crate::shared::api_features::parse_query_string;

fn failure(err: TourError) -> (StatusCode, Json<ApiResponse>) {
    match err {
        TourError::Validation(e) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::fail(e.to_string())),
        ),
        TourError::Storage(e) => {
            tracing::error!("Tour storage error: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Internal server error")),
            )
        }
    }
}

fn parse_id(id: &str) -> Result<Uuid, (StatusCode, Json<ApiResponse>)> {
    Uuid::parse_str(id)
        .map_err(|_| (StatusCode::BAD_REQUEST, Json(ApiResponse::fail("Invalid tour ID"))))
}

/// GET /api/tours
pub async fn list_all(RawQuery(raw): RawQuery) -> (StatusCode, Json<ApiResponse>) {
    let params = parse_query_string(raw.as_deref().unwrap_or(""));
    match service::list(params).await {
        Ok(tours) => (
            StatusCode::OK,
            Json(ApiResponse::success_with_results(
                tours.len(),
                json!({ "tours": tours }),
            )),
        ),
        Err(err) => failure(err),
    }
}

/// GET /api/tours/top-5
pub async fn top_tours(RawQuery(raw): RawQuery) -> (StatusCode, Json<ApiResponse>) {
    let params = service::top_tours_params(parse_query_string(raw.as_deref().unwrap_or("")));
    match service::list(params).await {
        Ok(tours) => (
            StatusCode::OK,
            Json(ApiResponse::success_with_results(
                tours.len(),
                json!({ "tours": tours }),
            )),
        ),
        Err(err) => failure(err),
    }
}

/// GET /api/tours/stats
pub async fn stats() -> (StatusCode, Json<ApiResponse>) {
    match service::stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(ApiResponse::success(json!({ "stats": stats }))),
        ),
        Err(err) => failure(err),
    }
}

/// GET /api/tours/:id
pub async fn get_by_id(Path(id): Path<String>) -> (StatusCode, Json<ApiResponse>) {
    let uuid = match parse_id(&id) {
        Ok(uuid) => uuid,
        Err(response) => return response,
    };
    match service::get_by_id(uuid).await {
        Ok(Some(tour)) => (
            StatusCode::OK,
            Json(ApiResponse::success(json!({ "tour": tour }))),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::fail("No tour found with that ID")),
        ),
        Err(err) => failure(err),
    }
}

/// POST /api/tours
pub async fn create(Json(dto): Json<TourDto>) -> (StatusCode, Json<ApiResponse>) {
    match service::create(dto).await {
        Ok(tour) => (
            StatusCode::CREATED,
            Json(ApiResponse::success(json!({ "tour": tour }))),
        ),
        Err(err) => failure(err),
    }
}

/// PATCH /api/tours/:id
pub async fn update(
    Path(id): Path<String>,
    Json(patch): Json<TourPatch>,
) -> (StatusCode, Json<ApiResponse>) {
    let uuid = match parse_id(&id) {
        Ok(uuid) => uuid,
        Err(response) => return response,
    };
    match service::update(uuid, patch).await {
        Ok(Some(tour)) => (
            StatusCode::OK,
            Json(ApiResponse::success(json!({ "tour": tour }))),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::fail("No tour found with that ID")),
        ),
        Err(err) => failure(err),
    }
}

/// DELETE /api/tours/:id
pub async fn delete(Path(id): Path<String>) -> (StatusCode, Json<ApiResponse>) {
    let uuid = match parse_id(&id) {
        Ok(uuid) => uuid,
        Err(response) => return response,
    };
    match service::delete(uuid).await {
        Ok(true) => (
            StatusCode::NO_CONTENT,
            Json(ApiResponse::success(Value::Null)),
        ),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::fail("No tour found with that ID")),
        ),
        Err(err) => failure(err),
    }
}

/// POST /api/tours/testdata
pub async fn insert_test_data() -> StatusCode {
    match service::insert_test_data().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
