use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        analytics::{
            DailySales, DashboardSnapshot, PopularItem, PopularItemList, SalePoint, SalesPeriod,
            SalesTrend, StatusBreakdown, TodayStats,
        },
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        menu::{CategoryList, CategoryRequest, MenuItemList, MenuItemRequest},
        orders::{
            CreateOrderRequest, CreateOrderResponse, OrderLineRequest, OrderList, OrderWithItems,
            UpdateOrderStatusRequest, VerifyOtpRequest,
        },
        reviews::{CreateReviewRequest, ModerateReviewRequest, ReviewList},
        users::{UpdateProfileRequest, UpdateRoleRequest, UserList},
    },
    models::{Category, MenuItem, Order, OrderItem, Review, ReviewPlatform, ReviewStatus, User},
    response::{ApiResponse, Meta},
    routes::{analytics, auth, health, menu, orders, params, reviews, users},
    workflow::{DeliveryAddress, FulfillmentMode, OrderStatus},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::me,
        menu::list_items,
        menu::get_item,
        menu::create_item,
        menu::update_item,
        menu::delete_item,
        menu::list_categories,
        menu::create_category,
        menu::update_category,
        orders::create_order,
        orders::verify_otp,
        orders::my_orders,
        orders::list_orders,
        orders::get_order,
        orders::update_order_status,
        reviews::create_review,
        reviews::list_reviews,
        reviews::list_all_reviews,
        reviews::moderate_review,
        users::list_users,
        users::update_profile,
        users::update_role,
        analytics::dashboard,
        analytics::sales_trends,
        analytics::popular_items
    ),
    components(
        schemas(
            User,
            Category,
            MenuItem,
            Order,
            OrderItem,
            Review,
            ReviewStatus,
            ReviewPlatform,
            OrderStatus,
            FulfillmentMode,
            DeliveryAddress,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            MenuItemRequest,
            CategoryRequest,
            MenuItemList,
            CategoryList,
            OrderLineRequest,
            CreateOrderRequest,
            CreateOrderResponse,
            VerifyOtpRequest,
            UpdateOrderStatusRequest,
            OrderWithItems,
            OrderList,
            CreateReviewRequest,
            ModerateReviewRequest,
            ReviewList,
            UpdateProfileRequest,
            UpdateRoleRequest,
            UserList,
            StatusBreakdown,
            TodayStats,
            DashboardSnapshot,
            SalesPeriod,
            SalePoint,
            DailySales,
            SalesTrend,
            PopularItem,
            PopularItemList,
            params::Pagination,
            params::MenuItemQuery,
            params::OrderListQuery,
            params::ReviewQuery,
            params::UserQuery,
            Meta,
            ApiResponse<User>,
            ApiResponse<Order>,
            ApiResponse<MenuItem>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<CreateOrderResponse>
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration and login"),
        (name = "Menu", description = "Menu items and categories"),
        (name = "Orders", description = "Order placement, OTP confirmation and fulfillment"),
        (name = "Reviews", description = "Customer reviews and moderation"),
        (name = "Users", description = "Profiles and roles"),
        (name = "Analytics", description = "Dashboard, sales trends and popular items"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
