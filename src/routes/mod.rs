use axum::Router;

use crate::state::AppState;

pub mod analytics;
pub mod auth;
pub mod doc;
pub mod health;
pub mod menu;
pub mod orders;
pub mod params;
pub mod reviews;
pub mod users;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/menu", menu::router())
        .nest("/orders", orders::router())
        .nest("/reviews", reviews::router())
        .nest("/users", users::router())
        .nest("/analytics", analytics::router())
}
