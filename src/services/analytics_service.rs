use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use sea_orm::{
    ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    prelude::DateTimeWithTimeZone,
};
use uuid::Uuid;

use crate::{
    dto::analytics::{
        DailySales, DashboardSnapshot, PopularItem, PopularItemList, SalePoint, SalesPeriod,
        SalesTrend, StatusBreakdown, TodayStats,
    },
    entity::{
        menu_items::Entity as MenuItems,
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{Column as OrderCol, Entity as Orders},
        reviews::{Column as ReviewCol, Entity as Reviews},
        users::{Column as UserCol, Entity as Users},
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::ReviewStatus,
    policy::{Operation, Role, authorize},
    response::{ApiResponse, Meta},
    services::parse_stored,
    state::AppState,
    workflow::OrderStatus,
};

pub const POPULAR_ITEMS_LIMIT: usize = 10;

pub async fn dashboard(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<DashboardSnapshot>> {
    authorize(user, Operation::ViewDashboard)?;
    let (start, end) = day_bounds(&Local::now());

    let today_rows: Vec<(i64, String)> = Orders::find()
        .select_only()
        .column(OrderCol::TotalAmount)
        .column(OrderCol::Status)
        .filter(OrderCol::CreatedAt.gte(start))
        .filter(OrderCol::CreatedAt.lt(end))
        .into_tuple()
        .all(&state.orm)
        .await?;
    let today_rows = today_rows
        .into_iter()
        .map(|(amount, status)| Ok((amount, parse_stored(&status, "orders.status")?)))
        .collect::<AppResult<Vec<(i64, OrderStatus)>>>()?;
    let (today_stats, orders_by_status) = summarize_day(&today_rows);

    let total_customers = Users::find()
        .filter(UserCol::Role.eq(Role::Customer.as_str()))
        .count(&state.orm)
        .await? as i64;

    let ratings: Vec<i32> = Reviews::find()
        .select_only()
        .column(ReviewCol::Rating)
        .filter(ReviewCol::Status.eq(ReviewStatus::Approved.as_str()))
        .into_tuple()
        .all(&state.orm)
        .await?;

    Ok(ApiResponse::success(
        "Dashboard",
        DashboardSnapshot {
            today_stats,
            total_customers,
            average_rating: average_rating(&ratings),
            orders_by_status,
        },
        Some(Meta::empty()),
    ))
}

pub async fn sales_trend(
    state: &AppState,
    user: &AuthUser,
    period: SalesPeriod,
) -> AppResult<ApiResponse<SalesTrend>> {
    authorize(user, Operation::ViewSalesTrends)?;
    let since = Utc::now() - Duration::days(period.days());

    let rows: Vec<(i64, DateTimeWithTimeZone)> = Orders::find()
        .select_only()
        .column(OrderCol::TotalAmount)
        .column(OrderCol::CreatedAt)
        .filter(OrderCol::Status.eq(OrderStatus::Completed.as_str()))
        .filter(OrderCol::CreatedAt.gte(since))
        .order_by_asc(OrderCol::CreatedAt)
        .into_tuple()
        .all(&state.orm)
        .await?;

    let points: Vec<SalePoint> = rows
        .into_iter()
        .map(|(total_amount, created_at)| SalePoint {
            total_amount,
            created_at: created_at.with_timezone(&Utc),
        })
        .collect();
    let daily = bucket_by_day(&points);

    Ok(ApiResponse::success(
        "Sales trends",
        SalesTrend {
            period,
            points,
            daily,
        },
        Some(Meta::empty()),
    ))
}

pub async fn popular_items(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<PopularItemList>> {
    authorize(user, Operation::ViewPopularItems)?;

    let rows = OrderItems::find()
        .order_by_asc(OrderItemCol::CreatedAt)
        .order_by_asc(OrderItemCol::OrderId)
        .order_by_asc(OrderItemCol::Position)
        .find_also_related(MenuItems)
        .all(&state.orm)
        .await?;

    let lines = rows.into_iter().filter_map(|(line, menu_item)| {
        menu_item.map(|item| PopularLine {
            menu_item_id: item.id,
            name: item.name,
            price: item.price,
            quantity: line.quantity,
        })
    });

    Ok(ApiResponse::success(
        "Popular items",
        PopularItemList {
            items: rank_popular(lines, POPULAR_ITEMS_LIMIT),
        },
        Some(Meta::empty()),
    ))
}

/// Start (inclusive) and end (exclusive) of the calendar day containing `now`,
/// in the caller's timezone.
pub fn day_bounds<Tz: TimeZone>(now: &DateTime<Tz>) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = now.date_naive().and_time(chrono::NaiveTime::MIN);
    let start = now
        .timezone()
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight));
    (start, start + Duration::days(1))
}

/// Count and revenue over all of today's orders, plus the per-status
/// breakdown of the five non-cancelled statuses.
pub fn summarize_day(rows: &[(i64, OrderStatus)]) -> (TodayStats, StatusBreakdown) {
    let mut breakdown = StatusBreakdown::default();
    for (_, status) in rows {
        match status {
            OrderStatus::Pending => breakdown.pending += 1,
            OrderStatus::Confirmed => breakdown.confirmed += 1,
            OrderStatus::Preparing => breakdown.preparing += 1,
            OrderStatus::Ready => breakdown.ready += 1,
            OrderStatus::Completed => breakdown.completed += 1,
            OrderStatus::Cancelled => {}
        }
    }

    let stats = TodayStats {
        orders: rows.len() as i64,
        revenue: rows.iter().map(|(amount, _)| amount).sum(),
        pending_orders: breakdown.pending,
    };
    (stats, breakdown)
}

/// Mean rating rounded to one decimal; 0 when there are no ratings.
pub fn average_rating(ratings: &[i32]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    let mean = sum as f64 / ratings.len() as f64;
    (mean * 10.0).round() / 10.0
}

/// Groups sale points into UTC calendar days, oldest first.
pub fn bucket_by_day(points: &[SalePoint]) -> Vec<DailySales> {
    let mut days: BTreeMap<chrono::NaiveDate, (i64, i64)> = BTreeMap::new();
    for point in points {
        let entry = days.entry(point.created_at.date_naive()).or_default();
        entry.0 += point.total_amount;
        entry.1 += 1;
    }
    days.into_iter()
        .map(|(date, (revenue, orders))| DailySales {
            date,
            revenue,
            orders,
        })
        .collect()
}

/// One ordered line joined with its menu item.
#[derive(Debug, Clone)]
pub struct PopularLine {
    pub menu_item_id: Uuid,
    pub name: String,
    pub price: i64,
    pub quantity: i32,
}

/// Sums quantities per menu item and returns the `limit` most ordered.
/// Ties keep the order in which items were first seen.
pub fn rank_popular(lines: impl IntoIterator<Item = PopularLine>, limit: usize) -> Vec<PopularItem> {
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    let mut items: Vec<PopularItem> = Vec::new();

    for line in lines {
        match index.get(&line.menu_item_id) {
            Some(&pos) => items[pos].total_ordered += i64::from(line.quantity),
            None => {
                index.insert(line.menu_item_id, items.len());
                items.push(PopularItem {
                    id: line.menu_item_id,
                    name: line.name,
                    price: line.price,
                    total_ordered: i64::from(line.quantity),
                });
            }
        }
    }

    // sort_by is stable, so first-seen order survives among equal totals
    items.sort_by(|a, b| b.total_ordered.cmp(&a.total_ordered));
    items.truncate(limit);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};

    fn line(id: Uuid, name: &str, quantity: i32) -> PopularLine {
        PopularLine {
            menu_item_id: id,
            name: name.into(),
            price: 1000,
            quantity,
        }
    }

    #[test]
    fn average_rating_is_zero_without_reviews() {
        assert_eq!(average_rating(&[]), 0.0);
    }

    #[test]
    fn average_rating_rounds_to_one_decimal() {
        assert_eq!(average_rating(&[5, 4, 4]), 4.3);
        assert_eq!(average_rating(&[5, 4]), 4.5);
        assert_eq!(average_rating(&[1, 2, 2]), 1.7);
        assert_eq!(average_rating(&[3]), 3.0);
    }

    #[test]
    fn popular_items_are_sorted_by_total_quantity() {
        let momo = Uuid::new_v4();
        let dal = Uuid::new_v4();
        let lassi = Uuid::new_v4();
        let ranked = rank_popular(
            vec![
                line(dal, "Dal Bhat", 1),
                line(momo, "Momo", 3),
                line(lassi, "Lassi", 2),
                line(dal, "Dal Bhat", 1),
                line(momo, "Momo", 4),
            ],
            POPULAR_ITEMS_LIMIT,
        );
        let order: Vec<_> = ranked.iter().map(|i| (i.name.as_str(), i.total_ordered)).collect();
        assert_eq!(order, vec![("Momo", 7), ("Dal Bhat", 2), ("Lassi", 2)]);
    }

    #[test]
    fn popular_items_are_capped() {
        let lines: Vec<_> = (0..15)
            .map(|i| line(Uuid::new_v4(), &format!("item {i}"), i + 1))
            .collect();
        let ranked = rank_popular(lines, POPULAR_ITEMS_LIMIT);
        assert_eq!(ranked.len(), 10);
        assert_eq!(ranked[0].total_ordered, 15);
        assert_eq!(ranked[9].total_ordered, 6);
    }

    #[test]
    fn today_summary_counts_every_order_but_breaks_down_five_statuses() {
        let rows = vec![
            (3300, OrderStatus::Pending),
            (1200, OrderStatus::Completed),
            (800, OrderStatus::Cancelled),
            (500, OrderStatus::Pending),
            (900, OrderStatus::Ready),
        ];
        let (stats, breakdown) = summarize_day(&rows);
        assert_eq!(stats.orders, 5);
        assert_eq!(stats.revenue, 6700);
        assert_eq!(stats.pending_orders, 2);
        assert_eq!(
            breakdown,
            StatusBreakdown {
                pending: 2,
                confirmed: 0,
                preparing: 0,
                ready: 1,
                completed: 1,
            }
        );
    }

    #[test]
    fn day_bounds_follow_the_local_offset() {
        let berlin = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = berlin.with_ymd_and_hms(2025, 6, 1, 0, 30, 0).unwrap();
        let (start, end) = day_bounds(&now);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 5, 31, 22, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 6, 1, 22, 0, 0).unwrap());
    }

    #[test]
    fn sales_are_bucketed_per_day() {
        let points = vec![
            SalePoint {
                total_amount: 1000,
                created_at: Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap(),
            },
            SalePoint {
                total_amount: 2500,
                created_at: Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap(),
            },
            SalePoint {
                total_amount: 500,
                created_at: Utc.with_ymd_and_hms(2025, 6, 2, 20, 0, 0).unwrap(),
            },
        ];
        let daily = bucket_by_day(&points);
        assert_eq!(
            daily,
            vec![
                DailySales {
                    date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                    revenue: 2500,
                    orders: 1,
                },
                DailySales {
                    date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
                    revenue: 1500,
                    orders: 2,
                },
            ]
        );
    }

    #[test]
    fn sales_period_windows() {
        assert_eq!(SalesPeriod::default(), SalesPeriod::SevenDays);
        assert_eq!(SalesPeriod::ThirtyDays.days(), 30);
        assert_eq!(SalesPeriod::NinetyDays.days(), 90);
        let parsed: SalesPeriod = serde_json::from_str("\"90d\"").unwrap();
        assert_eq!(parsed, SalesPeriod::NinetyDays);
    }
}
