use serde_json::Value;
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    UserRegister,
    UserLogin,
    ProfileUpdate,
    RoleChange,
    OrderCreate,
    OrderConfirm,
    OrderStatusUpdate,
    MenuItemCreate,
    MenuItemUpdate,
    MenuItemDelete,
    CategoryCreate,
    CategoryUpdate,
    ReviewCreate,
    ReviewModerate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserRegister => "user_register",
            AuditAction::UserLogin => "user_login",
            AuditAction::ProfileUpdate => "profile_update",
            AuditAction::RoleChange => "role_change",
            AuditAction::OrderCreate => "order_create",
            AuditAction::OrderConfirm => "order_confirm",
            AuditAction::OrderStatusUpdate => "order_status_update",
            AuditAction::MenuItemCreate => "menu_item_create",
            AuditAction::MenuItemUpdate => "menu_item_update",
            AuditAction::MenuItemDelete => "menu_item_delete",
            AuditAction::CategoryCreate => "category_create",
            AuditAction::CategoryUpdate => "category_update",
            AuditAction::ReviewCreate => "review_create",
            AuditAction::ReviewModerate => "review_moderate",
        }
    }

    pub fn resource(&self) -> &'static str {
        match self {
            AuditAction::UserRegister
            | AuditAction::UserLogin
            | AuditAction::ProfileUpdate
            | AuditAction::RoleChange => "users",
            AuditAction::OrderCreate
            | AuditAction::OrderConfirm
            | AuditAction::OrderStatusUpdate => "orders",
            AuditAction::MenuItemCreate
            | AuditAction::MenuItemUpdate
            | AuditAction::MenuItemDelete => "menu_items",
            AuditAction::CategoryCreate | AuditAction::CategoryUpdate => "categories",
            AuditAction::ReviewCreate | AuditAction::ReviewModerate => "reviews",
        }
    }
}

pub async fn log_audit(
    pool: &DbPool,
    user_id: Option<Uuid>,
    action: AuditAction,
    metadata: Value,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(action.as_str())
    .bind(action.resource())
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}

/// Audit failures never fail the request that triggered them.
pub async fn record(pool: &DbPool, user_id: Option<Uuid>, action: AuditAction, metadata: Value) {
    if let Err(err) = log_audit(pool, user_id, action, metadata).await {
        tracing::warn!(error = %err, action = action.as_str(), "audit log failed");
    }
}
