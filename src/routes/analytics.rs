use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::analytics::{DashboardSnapshot, PopularItemList, SalesTrend},
    error::AppResult,
    extract::AppQuery,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::SalesTrendQuery,
    services::analytics_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/sales-trends", get(sales_trends))
        .route("/popular-items", get(popular_items))
}

#[utoipa::path(
    get,
    path = "/api/analytics/dashboard",
    responses(
        (status = 200, description = "Today's figures", body = ApiResponse<DashboardSnapshot>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<DashboardSnapshot>>> {
    let resp = analytics_service::dashboard(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/analytics/sales-trends",
    params(("period" = Option<String>, Query, description = "7d, 30d or 90d, default 7d")),
    responses(
        (status = 200, description = "Completed sales in the window", body = ApiResponse<SalesTrend>),
        (status = 400, description = "Unknown period"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn sales_trends(
    State(state): State<AppState>,
    user: AuthUser,
    AppQuery(query): AppQuery<SalesTrendQuery>,
) -> AppResult<Json<ApiResponse<SalesTrend>>> {
    let period = query.period.unwrap_or_default();
    let resp = analytics_service::sales_trend(&state, &user, period).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/analytics/popular-items",
    responses(
        (status = 200, description = "Top ten items by quantity ordered", body = ApiResponse<PopularItemList>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn popular_items(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<PopularItemList>>> {
    let resp = analytics_service::popular_items(&state, &user).await?;
    Ok(Json(resp))
}
