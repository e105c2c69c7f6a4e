use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::analytics::SalesPeriod,
    workflow::{FulfillmentMode, OrderStatus},
};

#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1).saturating_mul(per_page);
        (page, per_page, offset)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

// Query structs repeat `page`/`per_page` instead of flattening `Pagination`:
// serde_urlencoded cannot parse numbers inside flattened structs.

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct MenuItemQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub category: Option<Uuid>,
    pub spice_level: Option<i32>,
    pub is_vegetarian: Option<bool>,
    pub is_vegan: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct OrderListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<OrderStatus>,
    pub order_type: Option<FulfillmentMode>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReviewQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub rating: Option<i32>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UserQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SalesTrendQuery {
    pub period: Option<SalesPeriod>,
}

macro_rules! paginated {
    ($($query:ty),+ $(,)?) => {
        $(
            impl $query {
                pub fn pagination(&self) -> Pagination {
                    Pagination {
                        page: self.page,
                        per_page: self.per_page,
                    }
                }
            }
        )+
    };
}

paginated!(MenuItemQuery, OrderListQuery, ReviewQuery, UserQuery);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_page_of_twenty() {
        assert_eq!(Pagination::default().normalize(), (1, 20, 0));
    }

    #[test]
    fn clamps_out_of_range_values() {
        let p = Pagination {
            page: Some(0),
            per_page: Some(500),
        };
        assert_eq!(p.normalize(), (1, 100, 0));
        let p = Pagination {
            page: Some(3),
            per_page: Some(10),
        };
        assert_eq!(p.normalize(), (3, 10, 20));
        let p = Pagination {
            page: Some(i64::MAX),
            per_page: Some(100),
        };
        assert_eq!(p.normalize(), (i64::MAX, 100, i64::MAX));
    }

    #[test]
    fn huge_page_from_query_string_does_not_overflow() {
        let uri: axum::http::Uri = "/api/menu/items?page=9223372036854775807&per_page=100"
            .parse()
            .unwrap();
        let axum::extract::Query(query) =
            axum::extract::Query::<MenuItemQuery>::try_from_uri(&uri).unwrap();
        let (_, limit, offset) = query.pagination().normalize();
        assert_eq!(limit, 100);
        assert!(offset >= 0);
    }
}
