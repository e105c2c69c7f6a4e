use std::collections::HashMap;

use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    dto::orders::{
        CreateOrderRequest, CreateOrderResponse, OrderList, OrderWithItems, UpdateOrderStatusRequest,
        VerifyOtpRequest,
    },
    entity::{
        menu_items::{Column as MenuCol, Entity as MenuItems},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem},
    policy::{Operation, authorize, is_permitted},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, Pagination, SortOrder},
    services::{parse_stored, require_text},
    state::AppState,
    workflow::{
        CatalogPrice, DeliveryAddress, OrderStatus, OtpChallenge, check_delivery_address,
        price_lines, verify_confirmation,
    },
};

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<CreateOrderResponse>> {
    authorize(user, Operation::CreateOrder)?;
    require_text(&payload.phone, "phone")?;
    check_delivery_address(payload.order_type, payload.delivery_address.as_ref())?;

    let requested: Vec<(Uuid, i32)> = payload
        .items
        .iter()
        .map(|line| (line.menu_item_id, line.quantity))
        .collect();
    let ids: Vec<Uuid> = requested.iter().map(|(id, _)| *id).collect();

    let txn = state.orm.begin().await?;

    let catalog: Vec<CatalogPrice> = MenuItems::find()
        .filter(MenuCol::Id.is_in(ids))
        .all(&txn)
        .await?
        .into_iter()
        .map(|item| CatalogPrice {
            menu_item_id: item.id,
            price: item.price,
            is_available: item.is_available,
        })
        .collect();

    let (lines, total_amount) = price_lines(&requested, &catalog)?;

    let now = Utc::now();
    let challenge = OtpChallenge::issue(now);
    let delivery_address = payload
        .delivery_address
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| AppError::Internal(e.into()))?;

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        order_type: Set(payload.order_type.as_str().to_string()),
        status: Set(OrderStatus::Pending.as_str().to_string()),
        total_amount: Set(total_amount),
        delivery_address: Set(delivery_address),
        special_notes: Set(payload.special_notes.clone().unwrap_or_default()),
        phone: Set(payload.phone.trim().to_string()),
        otp_code: Set(Some(challenge.code.clone())),
        otp_expires_at: Set(Some(challenge.expires_at.into())),
        confirmed_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    for (position, (line, request)) in lines.iter().zip(payload.items.iter()).enumerate() {
        OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            menu_item_id: Set(line.menu_item_id),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            special_instructions: Set(request.special_instructions.clone().unwrap_or_default()),
            position: Set(position as i32),
            created_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        user_id = %user.user_id,
        total_amount,
        order_type = payload.order_type.as_str(),
        "order created"
    );

    if let Err(err) = state.notifier.send_otp(&order.phone, &challenge.code) {
        tracing::warn!(order_id = %order.id, error = %err, "otp dispatch failed");
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::OrderCreate,
        serde_json::json!({ "order_id": order.id, "total_amount": total_amount }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order created successfully. OTP sent to your phone.",
        CreateOrderResponse {
            order_id: order.id,
            total_amount,
            estimated_time: payload.order_type.estimated_minutes(),
        },
        Some(Meta::empty()),
    ))
}

pub async fn verify_otp(
    state: &AppState,
    order_id: Uuid,
    payload: VerifyOtpRequest,
) -> AppResult<ApiResponse<Order>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let status: OrderStatus = parse_stored(&order.status, "orders.status")?;
    let challenge = OtpChallenge::from_stored(
        order.otp_code.clone(),
        order.otp_expires_at.map(|dt| dt.with_timezone(&Utc)),
    );

    let now = Utc::now();
    if let Err(err) = verify_confirmation(status, challenge.as_ref(), &payload.otp, now) {
        tracing::info!(order_id = %order_id, reason = %err, "otp verification rejected");
        return Err(err.into());
    }

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Confirmed.as_str().to_string());
    active.confirmed_at = Set(Some(now.into()));
    active.otp_code = Set(None);
    active.otp_expires_at = Set(None);
    active.updated_at = Set(now.into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(order_id = %order.id, "order confirmed");
    audit::record(
        &state.pool,
        Some(order.user_id),
        AuditAction::OrderConfirm,
        serde_json::json!({ "order_id": order.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order confirmed successfully",
        order_from_entity(order)?,
        Some(Meta::empty()),
    ))
}

pub async fn list_my_orders(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<OrderList>> {
    authorize(user, Operation::ListMyOrders)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .order_by_desc(OrderCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let items = attach_items(&state.orm, orders).await?;
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    authorize(user, Operation::ListAllOrders)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }
    if let Some(order_type) = query.order_type {
        condition = condition.add(OrderCol::OrderType.eq(order_type.as_str()));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;
    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let items = attach_items(&state.orm, orders).await?;
    Ok(ApiResponse::success(
        "Orders",
        OrderList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

/// Owners see their own orders; staff and above see any order.
pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    authorize(user, Operation::ViewOwnOrder)?;

    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if order.user_id != user.user_id && !is_permitted(user.role, Operation::ViewAnyOrder) {
        return Err(AppError::NotFound);
    }

    let data = attach_items(&state.orm, vec![order])
        .await?
        .pop()
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

/// Any of the six statuses may be set from any other status.
pub async fn update_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    authorize(user, Operation::UpdateOrderStatus)?;
    let target = payload.parsed()?;

    let existing = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let previous = existing.status.clone();
    let needs_confirmed_at = target == OrderStatus::Confirmed && existing.confirmed_at.is_none();

    let now = Utc::now();
    let mut active: OrderActive = existing.into();
    active.status = Set(target.as_str().to_string());
    active.updated_at = Set(now.into());
    if needs_confirmed_at {
        active.confirmed_at = Set(Some(now.into()));
    }
    if target != OrderStatus::Pending {
        active.otp_code = Set(None);
        active.otp_expires_at = Set(None);
    }
    let order = active.update(&state.orm).await?;

    tracing::info!(
        order_id = %order.id,
        from = %previous,
        to = %target,
        by = %user.user_id,
        "order status updated"
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::OrderStatusUpdate,
        serde_json::json!({ "order_id": order.id, "from": previous, "status": order.status }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order status updated successfully",
        order_from_entity(order)?,
        Some(Meta::empty()),
    ))
}

/// Loads line items (with menu item names) for a page of orders, in submission order.
async fn attach_items<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<OrderModel>,
) -> AppResult<Vec<OrderWithItems>> {
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let rows = if ids.is_empty() {
        Vec::new()
    } else {
        OrderItems::find()
            .filter(OrderItemCol::OrderId.is_in(ids))
            .order_by_asc(OrderItemCol::CreatedAt)
            .order_by_asc(OrderItemCol::Position)
            .find_also_related(MenuItems)
            .all(conn)
            .await?
    };

    let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for (item, menu_item) in rows {
        let name = menu_item.map(|m| m.name);
        grouped
            .entry(item.order_id)
            .or_default()
            .push(order_item_from_entity(item, name));
    }

    orders
        .into_iter()
        .map(|order| {
            let items = grouped.remove(&order.id).unwrap_or_default();
            Ok(OrderWithItems {
                order: order_from_entity(order)?,
                items,
            })
        })
        .collect()
}

pub(crate) fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    let delivery_address = model
        .delivery_address
        .map(serde_json::from_value::<DeliveryAddress>)
        .transpose()
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        order_type: parse_stored(&model.order_type, "orders.order_type")?,
        status: parse_stored(&model.status, "orders.status")?,
        total_amount: model.total_amount,
        delivery_address,
        special_notes: model.special_notes,
        phone: model.phone,
        confirmed_at: model.confirmed_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn order_item_from_entity(model: OrderItemModel, menu_item_name: Option<String>) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        menu_item_id: model.menu_item_id,
        menu_item_name,
        quantity: model.quantity,
        unit_price: model.unit_price,
        special_instructions: model.special_instructions,
    }
}
