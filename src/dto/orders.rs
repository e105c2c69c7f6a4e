use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    models::{Order, OrderItem},
    workflow::{DeliveryAddress, FulfillmentMode, OrderStatus},
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OrderLineRequest {
    pub menu_item_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLineRequest>,
    pub order_type: FulfillmentMode,
    pub phone: String,
    #[serde(default)]
    pub special_notes: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<DeliveryAddress>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub total_amount: i64,
    /// Minutes until pickup or delivery.
    pub estimated_time: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyOtpRequest {
    pub otp: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    /// Kept as a string so unknown values surface as a 400 from the workflow.
    pub status: String,
}

impl UpdateOrderStatusRequest {
    pub fn parsed(&self) -> Result<OrderStatus, crate::workflow::WorkflowError> {
        self.status.parse()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<OrderWithItems>,
}
