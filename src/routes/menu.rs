use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
};
use uuid::Uuid;

use crate::{
    dto::menu::{CategoryList, CategoryRequest, MenuItemList, MenuItemRequest},
    error::AppResult,
    extract::{AppJson, AppQuery},
    middleware::auth::AuthUser,
    models::{Category, MenuItem},
    response::ApiResponse,
    routes::params::MenuItemQuery,
    services::menu_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route(
            "/items/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/{id}", put(update_category))
}

#[utoipa::path(
    get,
    path = "/api/menu/items",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("category" = Option<Uuid>, Query, description = "Filter by category"),
        ("spice_level" = Option<i32>, Query, description = "Exact spice level 0-5"),
        ("is_vegetarian" = Option<bool>, Query, description = "Vegetarian only"),
        ("is_vegan" = Option<bool>, Query, description = "Vegan only"),
        ("search" = Option<String>, Query, description = "Search in name or description")
    ),
    responses(
        (status = 200, description = "Available menu items", body = ApiResponse<MenuItemList>),
        (status = 400, description = "Invalid query")
    ),
    tag = "Menu"
)]
pub async fn list_items(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<MenuItemQuery>,
) -> AppResult<Json<ApiResponse<MenuItemList>>> {
    let resp = menu_service::list_items(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/menu/items/{id}",
    params(("id" = Uuid, Path, description = "Menu item ID")),
    responses(
        (status = 200, description = "Menu item", body = ApiResponse<MenuItem>),
        (status = 404, description = "Not Found")
    ),
    tag = "Menu"
)]
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MenuItem>>> {
    let resp = menu_service::get_item(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/menu/items",
    request_body = MenuItemRequest,
    responses(
        (status = 201, description = "Menu item created", body = ApiResponse<MenuItem>),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Menu"
)]
pub async fn create_item(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<MenuItemRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<MenuItem>>)> {
    let resp = menu_service::create_item(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/menu/items/{id}",
    params(("id" = Uuid, Path, description = "Menu item ID")),
    request_body = MenuItemRequest,
    responses(
        (status = 200, description = "Menu item updated", body = ApiResponse<MenuItem>),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Menu"
)]
pub async fn update_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<MenuItemRequest>,
) -> AppResult<Json<ApiResponse<MenuItem>>> {
    let resp = menu_service::update_item(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/menu/items/{id}",
    params(("id" = Uuid, Path, description = "Menu item ID")),
    responses(
        (status = 200, description = "Menu item deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Item is referenced by orders")
    ),
    security(("bearer_auth" = [])),
    tag = "Menu"
)]
pub async fn delete_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = menu_service::delete_item(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/menu/categories",
    responses(
        (status = 200, description = "Active categories", body = ApiResponse<CategoryList>)
    ),
    tag = "Menu"
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<CategoryList>>> {
    let resp = menu_service::list_categories(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/menu/categories",
    request_body = CategoryRequest,
    responses(
        (status = 201, description = "Category created", body = ApiResponse<Category>),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Menu"
)]
pub async fn create_category(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CategoryRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Category>>)> {
    let resp = menu_service::create_category(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/menu/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    request_body = CategoryRequest,
    responses(
        (status = 200, description = "Category updated", body = ApiResponse<Category>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Menu"
)]
pub async fn update_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<CategoryRequest>,
) -> AppResult<Json<ApiResponse<Category>>> {
    let resp = menu_service::update_category(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
