use std::sync::{Arc, Mutex};

use restaurant_ordering_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        auth::RegisterRequest,
        orders::{CreateOrderRequest, OrderLineRequest, UpdateOrderStatusRequest, VerifyOtpRequest},
        reviews::CreateReviewRequest,
    },
    entity::{
        audit_logs::{Column as AuditCol, Entity as AuditLogs},
        categories::ActiveModel as CategoryActive,
        menu_items::{ActiveModel as MenuItemActive, Entity as MenuItems},
        orders::Entity as Orders,
        users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::AuthUser,
    models::ReviewPlatform,
    notify::{NotificationSink, NotifyError},
    policy::Role,
    routes::params::{OrderListQuery, Pagination},
    services::{analytics_service, auth_service, order_service, review_service},
    state::AppState,
    workflow::{DeliveryAddress, FulfillmentMode, OrderStatus, WorkflowError},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
    Statement,
};
use uuid::Uuid;

/// Captures dispatched codes so the flow can confirm with the real one.
#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    fn last_code(&self) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|(_, code)| code.clone())
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl NotificationSink for RecordingSink {
    fn send_otp(&self, phone: &str, code: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((phone.to_string(), code.to_string()));
        Ok(())
    }
}

// Customer orders, confirms with the texted code, staff fulfils, customer reviews.
#[tokio::test]
async fn order_confirmation_fulfilment_and_review_flow() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests.");
        return Ok(());
    };

    let sink = Arc::new(RecordingSink::default());
    let state = setup_state(&database_url, sink.clone()).await?;

    let customer = create_user(&state, Role::Customer, "customer@example.com").await?;
    let staff = create_user(&state, Role::Staff, "staff@example.com").await?;
    let manager = create_user(&state, Role::Manager, "manager@example.com").await?;

    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set("Momos".into()),
        description: Set(String::new()),
        image_url: Set(None),
        display_order: Set(1),
        is_active: Set(true),
        created_at: Set(chrono::Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;
    let chicken = create_menu_item(&state, category.id, "Chicken Momo", 1250, true).await?;
    let chai = create_menu_item(&state, category.id, "Masala Chai", 800, true).await?;
    let retired = create_menu_item(&state, category.id, "Seasonal Special", 1500, false).await?;

    // Unavailable items cannot be ordered.
    let err = order_service::create_order(
        &state,
        &customer,
        pickup_order(vec![line(retired, 1)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        AppError::Workflow(WorkflowError::Unavailable(id)) if id == retired
    ));

    // Delivery requires an address.
    let mut missing_address = pickup_order(vec![line(chai, 1)]);
    missing_address.order_type = FulfillmentMode::Delivery;
    let err = order_service::create_order(&state, &customer, missing_address)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Workflow(WorkflowError::MissingDeliveryAddress)
    ));
    assert_eq!(Orders::find().count(&state.orm).await?, 0);

    let created = order_service::create_order(
        &state,
        &customer,
        pickup_order(vec![line(chicken, 2), line(chai, 1)]),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(created.total_amount, 3300);
    assert_eq!(created.estimated_time, 25);

    let code = sink.last_code().expect("otp dispatched");
    assert_eq!(code.len(), 6);
    let stored = Orders::find_by_id(created.order_id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(stored.otp_code.as_deref(), Some(code.as_str()));

    // A wrong code leaves the order pending.
    let wrong = if code == "000000" { "111111" } else { "000000" };
    let err = order_service::verify_otp(
        &state,
        created.order_id,
        VerifyOtpRequest { otp: wrong.into() },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Workflow(WorkflowError::InvalidCode)));
    let fetched = order_service::get_order(&state, &customer, created.order_id)
        .await?
        .data
        .unwrap();
    assert_eq!(fetched.order.status, OrderStatus::Pending);
    let lines: Vec<(Uuid, i32, i64)> = fetched
        .items
        .iter()
        .map(|item| (item.menu_item_id, item.quantity, item.unit_price))
        .collect();
    assert_eq!(lines, vec![(chicken, 2, 1250), (chai, 1, 800)]);

    // Repricing the menu leaves placed orders untouched.
    let mut repriced: MenuItemActive = MenuItems::find_by_id(chicken)
        .one(&state.orm)
        .await?
        .unwrap()
        .into();
    repriced.price = Set(9999);
    repriced.update(&state.orm).await?;
    let fetched = order_service::get_order(&state, &customer, created.order_id)
        .await?
        .data
        .unwrap();
    assert_eq!(fetched.order.total_amount, 3300);
    assert_eq!(fetched.items[0].menu_item_id, chicken);
    assert_eq!(fetched.items[0].unit_price, 1250);

    // Codes are compared exactly.
    let err = order_service::verify_otp(
        &state,
        created.order_id,
        VerifyOtpRequest {
            otp: format!(" {code} "),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Workflow(WorkflowError::InvalidCode)));

    let confirmed = order_service::verify_otp(
        &state,
        created.order_id,
        VerifyOtpRequest { otp: code.clone() },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);
    assert!(confirmed.confirmed_at.is_some());

    let stored = Orders::find_by_id(created.order_id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert!(stored.otp_code.is_none());
    assert!(stored.otp_expires_at.is_none());

    // The same code cannot confirm twice.
    let err = order_service::verify_otp(&state, created.order_id, VerifyOtpRequest { otp: code })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Workflow(WorkflowError::NotAwaitingConfirmation)
    ));

    let err = order_service::verify_otp(
        &state,
        Uuid::new_v4(),
        VerifyOtpRequest { otp: "123456".into() },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // Reviews need a completed order.
    let review = CreateReviewRequest {
        order_id: created.order_id,
        rating: 5,
        comment: "Best momos in town".into(),
        platform: ReviewPlatform::Website,
    };
    let err = review_service::create_review(&state, &customer, review.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Customers cannot move orders along.
    let err = order_service::update_status(
        &state,
        &customer,
        created.order_id,
        status("completed"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let err = order_service::update_status(&state, &staff, created.order_id, status("shipped"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Workflow(WorkflowError::InvalidStatus(_))
    ));

    for next in ["preparing", "ready", "completed"] {
        let order = order_service::update_status(&state, &staff, created.order_id, status(next))
            .await?
            .data
            .unwrap();
        assert_eq!(order.status.as_str(), next);
    }

    let submitted = review_service::create_review(&state, &customer, review)
        .await?
        .data
        .unwrap();
    assert_eq!(submitted.rating, 5);

    // Staff sees every order, the customer only their own.
    let all = order_service::list_orders(
        &state,
        &staff,
        OrderListQuery {
            status: Some(OrderStatus::Completed),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(all.data.unwrap().items.len(), 1);
    let err = order_service::list_orders(&state, &customer, OrderListQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let mine = order_service::list_my_orders(&state, &customer, Pagination::default()).await?;
    assert_eq!(mine.meta.unwrap().total, Some(1));

    let err = analytics_service::popular_items(&state, &staff)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
    let popular = analytics_service::popular_items(&state, &manager)
        .await?
        .data
        .unwrap();
    assert_eq!(popular.items[0].id, chicken);
    assert_eq!(popular.items[0].total_ordered, 2);

    let dashboard = analytics_service::dashboard(&state, &staff)
        .await?
        .data
        .unwrap();
    assert_eq!(dashboard.today_stats.orders, 1);
    assert_eq!(dashboard.today_stats.revenue, 3300);
    assert_eq!(dashboard.orders_by_status.completed, 1);
    assert_eq!(dashboard.total_customers, 1);

    let err = analytics_service::dashboard(&state, &customer)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let audit_rows = AuditLogs::find()
        .filter(AuditCol::Action.eq("order_create"))
        .count(&state.orm)
        .await?;
    assert_eq!(audit_rows, 1);

    // Staff may set any status from any other, terminal ones included.
    let dispatched = sink.sent_count();
    let reopened = order_service::update_status(&state, &staff, created.order_id, status("pending"))
        .await?
        .data
        .unwrap();
    assert_eq!(reopened.status, OrderStatus::Pending);
    let stored = Orders::find_by_id(created.order_id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert!(stored.otp_code.is_none());
    assert!(stored.otp_expires_at.is_none());
    assert_eq!(sink.sent_count(), dispatched);
    let err = order_service::verify_otp(
        &state,
        created.order_id,
        VerifyOtpRequest {
            otp: "123456".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        AppError::Workflow(WorkflowError::NotAwaitingConfirmation)
    ));

    for next in ["cancelled", "preparing"] {
        let order = order_service::update_status(&state, &staff, created.order_id, status(next))
            .await?
            .data
            .unwrap();
        assert_eq!(order.status.as_str(), next);
    }
    assert_eq!(sink.sent_count(), dispatched);

    duplicate_emails_conflict(&state).await?;
    delivery_order_stores_address(&state, &customer, category.id).await
}

// Racing registrations for one email yield one account and one 409.
async fn duplicate_emails_conflict(state: &AppState) -> anyhow::Result<()> {
    let register = || RegisterRequest {
        email: "twins@example.com".into(),
        password: "momo-lover".into(),
        full_name: "Twin Customer".into(),
        phone: String::new(),
    };

    let (first, second) = tokio::join!(
        auth_service::register_user(state, register()),
        auth_service::register_user(state, register()),
    );
    let outcomes = [first.is_ok(), second.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    for result in [first, second] {
        if let Err(err) = result {
            assert!(matches!(err, AppError::Conflict(_)), "unexpected {err:?}");
        }
    }

    // The constraint itself also maps to a conflict.
    let err = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set("twins@example.com".into()),
        password_hash: Set("dummy".into()),
        full_name: Set("Twin Customer".into()),
        phone: Set(String::new()),
        role: Set(Role::Customer.as_str().into()),
        created_at: Set(chrono::Utc::now().into()),
        last_login: Set(None),
    }
    .insert(&state.orm)
    .await
    .map_err(|e| AppError::conflict_on_unique(e, "Email is already taken"))
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    Ok(())
}

// Delivery orders keep their address and take the longer estimate.
async fn delivery_order_stores_address(
    state: &AppState,
    customer: &AuthUser,
    category_id: Uuid,
) -> anyhow::Result<()> {
    let thukpa = create_menu_item(state, category_id, "Thukpa", 1300, true).await?;

    let mut request = pickup_order(vec![line(thukpa, 1)]);
    request.order_type = FulfillmentMode::Delivery;
    request.delivery_address = Some(DeliveryAddress {
        street: "12 Temple Road".into(),
        city: "Kathmandu".into(),
        postal_code: "44600".into(),
        phone: "+977 1 4412345".into(),
    });

    let created = order_service::create_order(state, customer, request)
        .await?
        .data
        .unwrap();
    assert_eq!(created.total_amount, 1300);
    assert_eq!(created.estimated_time, 45);

    let fetched = order_service::get_order(state, customer, created.order_id)
        .await?
        .data
        .unwrap();
    assert_eq!(fetched.order.order_type, FulfillmentMode::Delivery);
    assert_eq!(
        fetched.order.delivery_address.map(|a| a.city),
        Some("Kathmandu".to_string())
    );

    // Another customer cannot see it.
    let stranger = create_user(state, Role::Customer, "stranger@example.com").await?;
    let err = order_service::get_order(state, &stranger, created.order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    Ok(())
}

fn database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
}

fn line(menu_item_id: Uuid, quantity: i32) -> OrderLineRequest {
    OrderLineRequest {
        menu_item_id,
        quantity,
        special_instructions: None,
    }
}

fn pickup_order(items: Vec<OrderLineRequest>) -> CreateOrderRequest {
    CreateOrderRequest {
        items,
        order_type: FulfillmentMode::Pickup,
        phone: "+977 9800000000".into(),
        special_notes: None,
        delivery_address: None,
    }
}

fn status(value: &str) -> UpdateOrderStatusRequest {
    UpdateOrderStatusRequest {
        status: value.into(),
    }
}

async fn setup_state(database_url: &str, sink: Arc<RecordingSink>) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(pool.clone());
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE reviews, order_items, orders, menu_items, categories, audit_logs, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState {
        pool,
        orm,
        config: Arc::new(AppConfig {
            database_url: database_url.to_string(),
            host: "127.0.0.1".into(),
            port: 0,
            jwt_secret: "test-secret".into(),
            jwt_ttl_hours: 1,
            cors_origin: None,
        }),
        notifier: sink,
    })
}

async fn create_user(state: &AppState, role: Role, email: &str) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        full_name: Set("Test User".into()),
        phone: Set("+977 9800000000".into()),
        role: Set(role.as_str().into()),
        created_at: Set(chrono::Utc::now().into()),
        last_login: Set(None),
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role,
    })
}

async fn create_menu_item(
    state: &AppState,
    category_id: Uuid,
    name: &str,
    price: i64,
    is_available: bool,
) -> anyhow::Result<Uuid> {
    let now = chrono::Utc::now();
    let item = MenuItemActive {
        id: Set(Uuid::new_v4()),
        category_id: Set(category_id),
        name: Set(name.to_string()),
        description: Set(format!("{name} from the test kitchen")),
        price: Set(price),
        spice_level: Set(1),
        is_vegetarian: Set(false),
        is_vegan: Set(false),
        ingredients: Set(serde_json::json!([])),
        image_url: Set(None),
        is_available: Set(is_available),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    Ok(item.id)
}
