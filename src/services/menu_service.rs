use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    dto::menu::{CategoryList, CategoryRequest, MenuItemList, MenuItemRequest},
    entity::{
        categories::{
            ActiveModel as CategoryActive, Column as CategoryCol, Entity as Categories,
            Model as CategoryModel,
        },
        menu_items::{ActiveModel as MenuActive, Column as MenuCol, Entity as MenuItems, Model as MenuModel},
        order_items::{Column as OrderItemCol, Entity as OrderItems},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Category, MenuItem},
    policy::{Operation, authorize},
    response::{ApiResponse, Meta},
    routes::params::MenuItemQuery,
    services::require_text,
    state::AppState,
};

pub const MAX_SPICE_LEVEL: i32 = 5;

/// Public catalog: available items only.
pub async fn list_items(
    state: &AppState,
    query: MenuItemQuery,
) -> AppResult<ApiResponse<MenuItemList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(MenuCol::IsAvailable.eq(true));

    if let Some(category) = query.category {
        condition = condition.add(MenuCol::CategoryId.eq(category));
    }
    if let Some(spice_level) = query.spice_level {
        condition = condition.add(MenuCol::SpiceLevel.eq(spice_level));
    }
    if query.is_vegetarian == Some(true) {
        condition = condition.add(MenuCol::IsVegetarian.eq(true));
    }
    if query.is_vegan == Some(true) {
        condition = condition.add(MenuCol::IsVegan.eq(true));
    }
    if let Some(search) = query.search.as_ref().filter(|s| !s.trim().is_empty()) {
        let pattern = contains_pattern(search.trim());
        condition = condition.add(Expr::col(MenuCol::Name).ilike(pattern));
    }

    let finder = MenuItems::find()
        .filter(condition)
        .order_by_asc(MenuCol::Name);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(menu_item_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Menu items",
        MenuItemList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_item(state: &AppState, id: Uuid) -> AppResult<ApiResponse<MenuItem>> {
    let item = MenuItems::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success(
        "Menu item",
        menu_item_from_entity(item)?,
        None,
    ))
}

pub async fn create_item(
    state: &AppState,
    user: &AuthUser,
    payload: MenuItemRequest,
) -> AppResult<ApiResponse<MenuItem>> {
    authorize(user, Operation::ManageMenu)?;
    validate_item(&payload)?;
    ensure_category(state, payload.category_id).await?;

    let now = Utc::now();
    let item = MenuActive {
        id: Set(Uuid::new_v4()),
        category_id: Set(payload.category_id),
        name: Set(payload.name.trim().to_string()),
        description: Set(payload.description),
        price: Set(payload.price),
        spice_level: Set(payload.spice_level),
        is_vegetarian: Set(payload.is_vegetarian),
        is_vegan: Set(payload.is_vegan),
        ingredients: Set(serde_json::json!(payload.ingredients)),
        image_url: Set(payload.image_url.filter(|url| !url.is_empty())),
        is_available: Set(payload.is_available),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::MenuItemCreate,
        serde_json::json!({ "menu_item_id": item.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Menu item created successfully",
        menu_item_from_entity(item)?,
        Some(Meta::empty()),
    ))
}

/// Full replacement. Past orders keep their snapshotted prices.
pub async fn update_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: MenuItemRequest,
) -> AppResult<ApiResponse<MenuItem>> {
    authorize(user, Operation::ManageMenu)?;
    validate_item(&payload)?;

    let existing = MenuItems::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if existing.category_id != payload.category_id {
        ensure_category(state, payload.category_id).await?;
    }

    let mut active: MenuActive = existing.into();
    active.category_id = Set(payload.category_id);
    active.name = Set(payload.name.trim().to_string());
    active.description = Set(payload.description);
    active.price = Set(payload.price);
    active.spice_level = Set(payload.spice_level);
    active.is_vegetarian = Set(payload.is_vegetarian);
    active.is_vegan = Set(payload.is_vegan);
    active.ingredients = Set(serde_json::json!(payload.ingredients));
    active.image_url = Set(payload.image_url.filter(|url| !url.is_empty()));
    active.is_available = Set(payload.is_available);
    active.updated_at = Set(Utc::now().into());
    let item = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::MenuItemUpdate,
        serde_json::json!({ "menu_item_id": item.id, "price": item.price }),
    )
    .await;

    Ok(ApiResponse::success(
        "Menu item updated successfully",
        menu_item_from_entity(item)?,
        Some(Meta::empty()),
    ))
}

/// Items that appear in any order stay in the catalog; mark them unavailable instead.
pub async fn delete_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    authorize(user, Operation::DeleteMenuItem)?;

    let referenced = OrderItems::find()
        .filter(OrderItemCol::MenuItemId.eq(id))
        .count(&state.orm)
        .await?;
    if referenced > 0 {
        return Err(AppError::Conflict(
            "Menu item has order history; mark it unavailable instead".into(),
        ));
    }

    let result = MenuItems::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::MenuItemDelete,
        serde_json::json!({ "menu_item_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Menu item deleted successfully",
        serde_json::json!({ "id": id }),
        Some(Meta::empty()),
    ))
}

/// Active categories by display order; ties fall back to creation time.
pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    let items = Categories::find()
        .filter(CategoryCol::IsActive.eq(true))
        .order_by_asc(CategoryCol::DisplayOrder)
        .order_by_asc(CategoryCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(category_from_entity)
        .collect();

    Ok(ApiResponse::success("Categories", CategoryList { items }, None))
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    authorize(user, Operation::ManageCategories)?;
    require_text(&payload.name, "name")?;

    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name.trim().to_string()),
        description: Set(payload.description),
        image_url: Set(payload.image_url),
        display_order: Set(payload.display_order),
        is_active: Set(payload.is_active),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::CategoryCreate,
        serde_json::json!({ "category_id": category.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Category created successfully",
        category_from_entity(category),
        Some(Meta::empty()),
    ))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: CategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    authorize(user, Operation::ManageCategories)?;
    require_text(&payload.name, "name")?;

    let existing = Categories::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: CategoryActive = existing.into();
    active.name = Set(payload.name.trim().to_string());
    active.description = Set(payload.description);
    active.image_url = Set(payload.image_url);
    active.display_order = Set(payload.display_order);
    active.is_active = Set(payload.is_active);
    let category = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::CategoryUpdate,
        serde_json::json!({ "category_id": category.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Category updated successfully",
        category_from_entity(category),
        Some(Meta::empty()),
    ))
}

fn validate_item(payload: &MenuItemRequest) -> AppResult<()> {
    require_text(&payload.name, "name")?;
    require_text(&payload.description, "description")?;
    if payload.price <= 0 {
        return Err(AppError::BadRequest("price must be positive".into()));
    }
    if !(0..=MAX_SPICE_LEVEL).contains(&payload.spice_level) {
        return Err(AppError::BadRequest(format!(
            "spice_level must be between 0 and {MAX_SPICE_LEVEL}"
        )));
    }
    if payload.ingredients.iter().any(|i| i.trim().is_empty()) {
        return Err(AppError::BadRequest("ingredients must not be blank".into()));
    }
    Ok(())
}

async fn ensure_category(state: &AppState, category_id: Uuid) -> AppResult<()> {
    let exists = Categories::find_by_id(category_id)
        .one(&state.orm)
        .await?
        .is_some();
    if !exists {
        return Err(AppError::BadRequest(format!(
            "Category {category_id} not found"
        )));
    }
    Ok(())
}

/// `ILIKE` pattern matching `term` literally anywhere in the column.
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub(crate) fn menu_item_from_entity(model: MenuModel) -> AppResult<MenuItem> {
    let ingredients: Vec<String> = serde_json::from_value(model.ingredients)
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(MenuItem {
        id: model.id,
        category_id: model.category_id,
        name: model.name,
        description: model.description,
        price: model.price,
        spice_level: model.spice_level,
        is_vegetarian: model.is_vegetarian,
        is_vegan: model.is_vegan,
        ingredients,
        image_url: model.image_url,
        is_available: model.is_available,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn category_from_entity(model: CategoryModel) -> Category {
    Category {
        id: model.id,
        name: model.name,
        description: model.description,
        image_url: model.image_url,
        display_order: model.display_order,
        is_active: model.is_active,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
