use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
};
use uuid::Uuid;

use crate::{
    dto::reviews::{CreateReviewRequest, ModerateReviewRequest, ReviewList},
    error::AppResult,
    extract::{AppJson, AppQuery},
    middleware::auth::AuthUser,
    models::Review,
    response::ApiResponse,
    routes::params::ReviewQuery,
    services::review_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reviews).post(create_review))
        .route("/all", get(list_all_reviews))
        .route("/{id}/moderate", put(moderate_review))
}

#[utoipa::path(
    post,
    path = "/api/reviews",
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review submitted for moderation", body = ApiResponse<Review>),
        (status = 400, description = "Order not found or not completed"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Review>>)> {
    let resp = review_service::create_review(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/reviews",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("rating" = Option<i32>, Query, description = "Filter by rating")
    ),
    responses(
        (status = 200, description = "Approved reviews", body = ApiResponse<ReviewList>)
    ),
    tag = "Reviews"
)]
pub async fn list_reviews(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ReviewQuery>,
) -> AppResult<Json<ApiResponse<ReviewList>>> {
    let resp = review_service::list_approved(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/reviews/all",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("rating" = Option<i32>, Query, description = "Filter by rating"),
        ("status" = Option<String>, Query, description = "pending, approved or rejected")
    ),
    responses(
        (status = 200, description = "Every review", body = ApiResponse<ReviewList>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn list_all_reviews(
    State(state): State<AppState>,
    user: AuthUser,
    AppQuery(query): AppQuery<ReviewQuery>,
) -> AppResult<Json<ApiResponse<ReviewList>>> {
    let resp = review_service::list_all(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/reviews/{id}/moderate",
    params(("id" = Uuid, Path, description = "Review ID")),
    request_body = ModerateReviewRequest,
    responses(
        (status = 200, description = "Review moderated", body = ApiResponse<Review>),
        (status = 400, description = "Invalid status"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn moderate_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<ModerateReviewRequest>,
) -> AppResult<Json<ApiResponse<Review>>> {
    let resp = review_service::moderate(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
