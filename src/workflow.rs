//! Order lifecycle rules.
//!
//! Everything here is pure: callers pass in `now`, prices and stored
//! state, and persist whatever comes back. `services::order_service` wires
//! these rules to the database and the notification sink.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use password_hash::rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Validity window of a freshly issued confirmation code.
pub const OTP_TTL_SECONDS: i64 = 15 * 60;

const OTP_MIN: u32 = 100_000;
const OTP_SPAN: u32 = 900_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Order must contain at least one item")]
    EmptyOrder,

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Menu item {0} not found")]
    InvalidReference(Uuid),

    #[error("Menu item {0} is not available")]
    Unavailable(Uuid),

    #[error("Delivery address is required for delivery orders")]
    MissingDeliveryAddress,

    #[error("Delivery address is only accepted for delivery orders")]
    UnexpectedDeliveryAddress,

    #[error("Delivery address field `{0}` must not be empty")]
    IncompleteDeliveryAddress(&'static str),

    #[error("Order total is out of range")]
    TotalOverflow,

    #[error("Invalid OTP")]
    InvalidCode,

    #[error("OTP has expired")]
    Expired,

    #[error("Order is not awaiting confirmation")]
    NotAwaitingConfirmation,

    #[error("Invalid status")]
    InvalidStatus(String),

    #[error("Invalid order type")]
    InvalidOrderType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal by convention only; `update_status` may still move an order
    /// out of these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| WorkflowError::InvalidStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentMode {
    Pickup,
    Delivery,
}

impl FulfillmentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentMode::Pickup => "pickup",
            FulfillmentMode::Delivery => "delivery",
        }
    }

    /// Fixed promise shown to the customer, in minutes.
    pub fn estimated_minutes(&self) -> i32 {
        match self {
            FulfillmentMode::Pickup => 25,
            FulfillmentMode::Delivery => 45,
        }
    }
}

impl FromStr for FulfillmentMode {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pickup" => Ok(FulfillmentMode::Pickup),
            "delivery" => Ok(FulfillmentMode::Delivery),
            other => Err(WorkflowError::InvalidOrderType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub phone: String,
}

impl DeliveryAddress {
    fn validate(&self) -> Result<(), WorkflowError> {
        let fields = [
            ("street", &self.street),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("phone", &self.phone),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(WorkflowError::IncompleteDeliveryAddress(name));
            }
        }
        Ok(())
    }
}

/// Enforces "address present iff delivery".
pub fn check_delivery_address(
    mode: FulfillmentMode,
    address: Option<&DeliveryAddress>,
) -> Result<(), WorkflowError> {
    match (mode, address) {
        (FulfillmentMode::Delivery, Some(address)) => address.validate(),
        (FulfillmentMode::Delivery, None) => Err(WorkflowError::MissingDeliveryAddress),
        (FulfillmentMode::Pickup, None) => Ok(()),
        (FulfillmentMode::Pickup, Some(_)) => Err(WorkflowError::UnexpectedDeliveryAddress),
    }
}

/// Current catalog state of a referenced menu item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogPrice {
    pub menu_item_id: Uuid,
    pub price: i64,
    pub is_available: bool,
}

/// A requested line with its price resolved at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
}

/// Resolves each `(menu_item_id, quantity)` against the catalog and returns
/// the priced lines in request order together with the order total.
pub fn price_lines(
    requested: &[(Uuid, i32)],
    catalog: &[CatalogPrice],
) -> Result<(Vec<PricedLine>, i64), WorkflowError> {
    if requested.is_empty() {
        return Err(WorkflowError::EmptyOrder);
    }

    let mut lines = Vec::with_capacity(requested.len());
    for &(menu_item_id, quantity) in requested {
        if quantity < 1 {
            return Err(WorkflowError::InvalidQuantity);
        }
        let entry = catalog
            .iter()
            .find(|c| c.menu_item_id == menu_item_id)
            .ok_or(WorkflowError::InvalidReference(menu_item_id))?;
        if !entry.is_available {
            return Err(WorkflowError::Unavailable(menu_item_id));
        }
        lines.push(PricedLine {
            menu_item_id,
            quantity,
            unit_price: entry.price,
        });
    }

    let total = order_total(&lines)?;
    Ok((lines, total))
}

/// Σ(unit price × quantity) in minor units.
pub fn order_total(lines: &[PricedLine]) -> Result<i64, WorkflowError> {
    lines.iter().try_fold(0i64, |acc, line| {
        line.unit_price
            .checked_mul(i64::from(line.quantity))
            .and_then(|subtotal| acc.checked_add(subtotal))
            .ok_or(WorkflowError::TotalOverflow)
    })
}

/// A single-use, time-boxed confirmation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl OtpChallenge {
    /// Issues a random 6-digit code valid for [`OTP_TTL_SECONDS`].
    pub fn issue(now: DateTime<Utc>) -> Self {
        Self::with_code(generate_code(), now)
    }

    pub fn with_code(code: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            code: code.into(),
            expires_at: now + Duration::seconds(OTP_TTL_SECONDS),
        }
    }

    /// Rebuilds the challenge from stored columns; `None` once consumed.
    pub fn from_stored(
        code: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Option<Self> {
        match (code, expires_at) {
            (Some(code), Some(expires_at)) => Some(Self { code, expires_at }),
            _ => None,
        }
    }

    /// Expiry is checked before the code so an expired challenge always
    /// reports `Expired`.
    pub fn verify(&self, submitted: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        if now > self.expires_at {
            return Err(WorkflowError::Expired);
        }
        if self.code != submitted {
            return Err(WorkflowError::InvalidCode);
        }
        Ok(())
    }
}

/// Checks a submitted code against an order's stored state.
pub fn verify_confirmation(
    status: OrderStatus,
    challenge: Option<&OtpChallenge>,
    submitted: &str,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    let challenge = match (status, challenge) {
        (OrderStatus::Pending, Some(challenge)) => challenge,
        _ => return Err(WorkflowError::NotAwaitingConfirmation),
    };
    challenge.verify(submitted, now)
}

/// Uniform over 100000..=999999, rejection-sampled from the OS RNG.
pub fn generate_code() -> String {
    let zone = u32::MAX - (u32::MAX % OTP_SPAN);
    loop {
        let value = OsRng.next_u32();
        if value < zone {
            return (OTP_MIN + value % OTP_SPAN).to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn catalog(entries: &[(Uuid, i64)]) -> Vec<CatalogPrice> {
        entries
            .iter()
            .map(|&(menu_item_id, price)| CatalogPrice {
                menu_item_id,
                price,
                is_available: true,
            })
            .collect()
    }

    #[test]
    fn total_is_sum_of_price_times_quantity() {
        let momo = Uuid::new_v4();
        let lassi = Uuid::new_v4();
        let (lines, total) =
            price_lines(&[(momo, 2), (lassi, 1)], &catalog(&[(momo, 1250), (lassi, 800)]))
                .unwrap();
        assert_eq!(total, 3300);
        assert_eq!(lines[0].unit_price, 1250);
        assert_eq!(lines[1].quantity, 1);
    }

    #[test]
    fn repeated_items_are_priced_per_line() {
        let momo = Uuid::new_v4();
        let (lines, total) =
            price_lines(&[(momo, 1), (momo, 3)], &catalog(&[(momo, 500)])).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(total, 2000);
    }

    #[test]
    fn unknown_item_is_an_invalid_reference() {
        let known = Uuid::new_v4();
        let unknown = Uuid::new_v4();
        let err = price_lines(&[(known, 1), (unknown, 1)], &catalog(&[(known, 100)]))
            .unwrap_err();
        assert_eq!(err, WorkflowError::InvalidReference(unknown));
    }

    #[test]
    fn unavailable_item_is_rejected() {
        let id = Uuid::new_v4();
        let catalog = [CatalogPrice {
            menu_item_id: id,
            price: 100,
            is_available: false,
        }];
        assert_eq!(
            price_lines(&[(id, 1)], &catalog).unwrap_err(),
            WorkflowError::Unavailable(id)
        );
    }

    #[test]
    fn empty_orders_and_zero_quantities_are_rejected() {
        let id = Uuid::new_v4();
        assert_eq!(
            price_lines(&[], &catalog(&[(id, 100)])).unwrap_err(),
            WorkflowError::EmptyOrder
        );
        assert_eq!(
            price_lines(&[(id, 0)], &catalog(&[(id, 100)])).unwrap_err(),
            WorkflowError::InvalidQuantity
        );
    }

    #[test]
    fn overflowing_totals_are_rejected() {
        let id = Uuid::new_v4();
        assert_eq!(
            price_lines(&[(id, 2)], &catalog(&[(id, i64::MAX)])).unwrap_err(),
            WorkflowError::TotalOverflow
        );
    }

    #[test]
    fn delivery_requires_an_address_and_pickup_never_does() {
        let address = DeliveryAddress {
            street: "Sendlinger Str. 1".into(),
            city: "Munich".into(),
            postal_code: "80331".into(),
            phone: "+49 89 1234".into(),
        };
        assert_eq!(
            check_delivery_address(FulfillmentMode::Delivery, None),
            Err(WorkflowError::MissingDeliveryAddress)
        );
        assert!(check_delivery_address(FulfillmentMode::Delivery, Some(&address)).is_ok());
        assert!(check_delivery_address(FulfillmentMode::Pickup, None).is_ok());
        assert_eq!(
            check_delivery_address(FulfillmentMode::Pickup, Some(&address)),
            Err(WorkflowError::UnexpectedDeliveryAddress)
        );
    }

    #[test]
    fn blank_address_fields_are_rejected() {
        let address = DeliveryAddress {
            street: "Main 1".into(),
            city: " ".into(),
            postal_code: "80331".into(),
            phone: "123".into(),
        };
        assert_eq!(
            check_delivery_address(FulfillmentMode::Delivery, Some(&address)),
            Err(WorkflowError::IncompleteDeliveryAddress("city"))
        );
    }

    #[test]
    fn issued_code_is_six_digits_and_expires_after_fifteen_minutes() {
        let now = at(0);
        let challenge = OtpChallenge::issue(now);
        assert_eq!(challenge.code.len(), 6);
        assert!(challenge.code.chars().all(|c| c.is_ascii_digit()));
        let value: u32 = challenge.code.parse().unwrap();
        assert!((100_000..=999_999).contains(&value));
        assert_eq!((challenge.expires_at - now).num_seconds(), 900);
    }

    #[test]
    fn generated_codes_stay_in_range() {
        for _ in 0..1_000 {
            let value: u32 = generate_code().parse().unwrap();
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[test]
    fn correct_code_before_expiry_verifies() {
        let challenge = OtpChallenge::with_code("123456", at(0));
        assert!(challenge.verify("123456", at(899)).is_ok());
        assert!(challenge.verify("123456", at(900)).is_ok());
    }

    #[test]
    fn wrong_code_is_rejected() {
        let challenge = OtpChallenge::with_code("123456", at(0));
        assert_eq!(challenge.verify("654321", at(10)), Err(WorkflowError::InvalidCode));
        assert_eq!(challenge.verify("12345", at(10)), Err(WorkflowError::InvalidCode));
    }

    #[test]
    fn codes_must_match_exactly() {
        let challenge = OtpChallenge::with_code("123456", at(0));
        assert_eq!(challenge.verify(" 123456", at(10)), Err(WorkflowError::InvalidCode));
        assert_eq!(challenge.verify("123456\n", at(10)), Err(WorkflowError::InvalidCode));
    }

    #[test]
    fn expiry_wins_over_code_correctness() {
        let challenge = OtpChallenge::with_code("123456", at(0));
        assert_eq!(challenge.verify("123456", at(901)), Err(WorkflowError::Expired));
        assert_eq!(challenge.verify("000000", at(901)), Err(WorkflowError::Expired));
    }

    #[test]
    fn consumed_or_non_pending_orders_cannot_be_confirmed() {
        let challenge = OtpChallenge::with_code("123456", at(0));
        assert_eq!(
            verify_confirmation(OrderStatus::Pending, None, "123456", at(1)),
            Err(WorkflowError::NotAwaitingConfirmation)
        );
        assert_eq!(
            verify_confirmation(OrderStatus::Confirmed, Some(&challenge), "123456", at(1)),
            Err(WorkflowError::NotAwaitingConfirmation)
        );
        assert!(verify_confirmation(OrderStatus::Pending, Some(&challenge), "123456", at(1)).is_ok());
    }

    #[test]
    fn stored_challenge_needs_both_columns() {
        assert!(OtpChallenge::from_stored(Some("123456".into()), None).is_none());
        assert!(OtpChallenge::from_stored(None, Some(at(0))).is_none());
        assert!(OtpChallenge::from_stored(Some("123456".into()), Some(at(0))).is_some());
    }

    #[test]
    fn every_status_parses_and_unknown_values_do_not() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!(
            "shipped".parse::<OrderStatus>(),
            Err(WorkflowError::InvalidStatus("shipped".into()))
        );
        assert!("Pending".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn only_completed_and_cancelled_are_terminal() {
        let terminal: Vec<_> = OrderStatus::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![OrderStatus::Completed, OrderStatus::Cancelled]);
    }

    #[test]
    fn estimated_time_depends_on_fulfillment_mode() {
        assert_eq!(FulfillmentMode::Pickup.estimated_minutes(), 25);
        assert_eq!(FulfillmentMode::Delivery.estimated_minutes(), 45);
    }
}
