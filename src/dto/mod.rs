pub mod analytics;
pub mod auth;
pub mod menu;
pub mod orders;
pub mod reviews;
pub mod users;
