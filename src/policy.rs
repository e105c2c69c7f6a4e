//! Access policy: which role may perform which operation.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{error::AppError, middleware::auth::AuthUser};

/// Roles in increasing order of privilege.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Staff,
    Manager,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Customer, Role::Staff, Role::Manager, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Staff => "staff",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Every authenticated operation the API exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateOrder,
    ListMyOrders,
    ViewOwnOrder,
    CreateReview,
    ViewProfile,
    UpdateProfile,
    ListAllOrders,
    ViewAnyOrder,
    UpdateOrderStatus,
    ViewDashboard,
    ViewSalesTrends,
    ViewPopularItems,
    ManageMenu,
    ManageCategories,
    ModerateReview,
    ListAllReviews,
    ListUsers,
    DeleteMenuItem,
    UpdateUserRole,
}

impl Operation {
    pub fn min_role(self) -> Role {
        use Operation::*;
        match self {
            CreateOrder | ListMyOrders | ViewOwnOrder | CreateReview | ViewProfile
            | UpdateProfile => Role::Customer,
            ListAllOrders | ViewAnyOrder | UpdateOrderStatus | ViewDashboard => Role::Staff,
            ViewSalesTrends | ViewPopularItems | ManageMenu | ManageCategories
            | ModerateReview | ListAllReviews | ListUsers => Role::Manager,
            DeleteMenuItem | UpdateUserRole => Role::Admin,
        }
    }
}

pub fn is_permitted(role: Role, op: Operation) -> bool {
    role >= op.min_role()
}

pub fn authorize(user: &AuthUser, op: Operation) -> Result<(), AppError> {
    if !is_permitted(user.role, op) {
        tracing::debug!(user_id = %user.user_id, role = %user.role, ?op, "forbidden");
        return Err(AppError::Forbidden);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn roles_are_totally_ordered() {
        assert!(Role::Customer < Role::Staff);
        assert!(Role::Staff < Role::Manager);
        assert!(Role::Manager < Role::Admin);
    }

    #[test]
    fn roles_round_trip_through_strings() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("owner".parse::<Role>(), Err(UnknownRole("owner".into())));
    }

    #[test]
    fn staff_can_run_the_kitchen_but_not_the_menu() {
        assert!(is_permitted(Role::Staff, Operation::UpdateOrderStatus));
        assert!(is_permitted(Role::Staff, Operation::ViewDashboard));
        assert!(!is_permitted(Role::Staff, Operation::ManageMenu));
        assert!(!is_permitted(Role::Staff, Operation::ViewSalesTrends));
    }

    #[test]
    fn customers_only_reach_their_own_resources() {
        assert!(is_permitted(Role::Customer, Operation::CreateOrder));
        assert!(is_permitted(Role::Customer, Operation::CreateReview));
        assert!(!is_permitted(Role::Customer, Operation::ListAllOrders));
        assert!(!is_permitted(Role::Customer, Operation::UpdateOrderStatus));
    }

    #[test]
    fn destructive_operations_need_admin() {
        assert!(!is_permitted(Role::Manager, Operation::DeleteMenuItem));
        assert!(!is_permitted(Role::Manager, Operation::UpdateUserRole));
        assert!(is_permitted(Role::Admin, Operation::DeleteMenuItem));
        assert!(is_permitted(Role::Admin, Operation::UpdateUserRole));
    }

    #[test]
    fn authorize_maps_to_forbidden() {
        let user = AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::Staff,
        };
        assert!(authorize(&user, Operation::ListAllOrders).is_ok());
        assert!(matches!(
            authorize(&user, Operation::ModerateReview),
            Err(AppError::Forbidden)
        ));
    }
}
