use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    dto::users::{UpdateProfileRequest, UpdateRoleRequest, UserList},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::User,
    policy::{Operation, Role, authorize},
    response::{ApiResponse, Meta},
    routes::params::UserQuery,
    services::parse_stored,
    state::AppState,
};

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    query: UserQuery,
) -> AppResult<ApiResponse<UserList>> {
    authorize(user, Operation::ListUsers)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(role) = query.role.as_deref().filter(|r| !r.is_empty()) {
        let role = parse_role(role)?;
        condition = condition.add(UserCol::Role.eq(role.as_str()));
    }

    let finder = Users::find()
        .filter(condition)
        .order_by_desc(UserCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(user_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    authorize(user, Operation::ViewProfile)?;
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success(
        "Profile",
        user_from_entity(model)?,
        Some(Meta::empty()),
    ))
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    authorize(user, Operation::UpdateProfile)?;
    validate_profile(&payload)?;

    let existing = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if let Some(email) = payload.email.as_deref() {
        let email = email.trim().to_lowercase();
        if email != existing.email {
            let taken = Users::find()
                .filter(UserCol::Email.eq(email.as_str()))
                .one(&state.orm)
                .await?
                .is_some();
            if taken {
                return Err(AppError::Conflict("Email is already taken".into()));
            }
        }
    }

    let mut active: UserActive = existing.into();
    if let Some(full_name) = payload.full_name {
        active.full_name = Set(full_name.trim().to_string());
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(phone.trim().to_string());
    }
    if let Some(email) = payload.email {
        active.email = Set(email.trim().to_lowercase());
    }
    let updated = active
        .update(&state.orm)
        .await
        .map_err(|e| AppError::conflict_on_unique(e, "Email is already taken"))?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::ProfileUpdate,
        serde_json::json!({ "user_id": updated.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Profile updated successfully",
        user_from_entity(updated)?,
        Some(Meta::empty()),
    ))
}

pub async fn update_role(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateRoleRequest,
) -> AppResult<ApiResponse<User>> {
    authorize(user, Operation::UpdateUserRole)?;
    let role = parse_role(&payload.role)?;

    let existing = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let previous = existing.role.clone();

    let mut active: UserActive = existing.into();
    active.role = Set(role.as_str().to_string());
    let updated = active.update(&state.orm).await?;

    tracing::info!(user_id = %id, from = %previous, to = %role, by = %user.user_id, "role changed");
    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::RoleChange,
        serde_json::json!({ "user_id": id, "from": previous, "role": role.as_str() }),
    )
    .await;

    Ok(ApiResponse::success(
        "User role updated successfully",
        user_from_entity(updated)?,
        Some(Meta::empty()),
    ))
}

fn parse_role(value: &str) -> AppResult<Role> {
    value
        .parse::<Role>()
        .map_err(|_| AppError::BadRequest("Invalid role".into()))
}

pub(crate) fn is_valid_phone(phone: &str) -> bool {
    !phone.trim().is_empty()
        && phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

fn validate_profile(payload: &UpdateProfileRequest) -> AppResult<()> {
    if let Some(full_name) = &payload.full_name {
        if full_name.trim().chars().count() < 2 {
            return Err(AppError::BadRequest(
                "full_name must be at least 2 characters".into(),
            ));
        }
    }
    if let Some(phone) = &payload.phone {
        if !is_valid_phone(phone) {
            return Err(AppError::BadRequest("Invalid phone number".into()));
        }
    }
    if let Some(email) = &payload.email {
        if !is_valid_email(email) {
            return Err(AppError::BadRequest("Invalid email".into()));
        }
    }
    Ok(())
}

pub(crate) fn user_from_entity(model: UserModel) -> AppResult<User> {
    Ok(User {
        id: model.id,
        email: model.email,
        full_name: model.full_name,
        phone: model.phone,
        role: parse_stored(&model.role, "users.role")?,
        created_at: model.created_at.with_timezone(&Utc),
        last_login: model.last_login.map(|dt| dt.with_timezone(&Utc)),
    })
}
