pub mod audit_logs;
pub mod categories;
pub mod menu_items;
pub mod order_items;
pub mod orders;
pub mod reviews;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use categories::Entity as Categories;
pub use menu_items::Entity as MenuItems;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use reviews::Entity as Reviews;
pub use users::Entity as Users;
