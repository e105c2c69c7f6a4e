use std::{fmt::Display, str::FromStr};

use crate::error::{AppError, AppResult};

pub mod analytics_service;
pub mod auth_service;
pub mod menu_service;
pub mod order_service;
pub mod review_service;
pub mod user_service;

/// Parses an enum-like column. A failure means the row violates the schema.
pub(crate) fn parse_stored<T>(value: &str, column: &str) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Debug,
{
    value.parse::<T>().map_err(|err| {
        AppError::Internal(anyhow::anyhow!("invalid {column} `{value}` in database: {err:?}"))
    })
}

/// Rejects blank required text fields.
pub(crate) fn require_text(value: &str, field: impl Display) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(())
}
