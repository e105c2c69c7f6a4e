use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct StatusBreakdown {
    pub pending: i64,
    pub confirmed: i64,
    pub preparing: i64,
    pub ready: i64,
    pub completed: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct TodayStats {
    pub orders: i64,
    pub revenue: i64,
    pub pending_orders: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardSnapshot {
    pub today_stats: TodayStats,
    pub total_customers: i64,
    pub average_rating: f64,
    pub orders_by_status: StatusBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ToSchema)]
pub enum SalesPeriod {
    #[default]
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
    #[serde(rename = "90d")]
    NinetyDays,
}

impl SalesPeriod {
    pub fn days(&self) -> i64 {
        match self {
            SalesPeriod::SevenDays => 7,
            SalesPeriod::ThirtyDays => 30,
            SalesPeriod::NinetyDays => 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SalePoint {
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DailySales {
    pub date: NaiveDate,
    pub revenue: i64,
    pub orders: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SalesTrend {
    pub period: SalesPeriod,
    pub points: Vec<SalePoint>,
    pub daily: Vec<DailySales>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PopularItem {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    pub total_ordered: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct PopularItemList {
    #[schema(value_type = Vec<PopularItem>)]
    pub items: Vec<PopularItem>,
}
