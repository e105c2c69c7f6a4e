use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Review, ReviewPlatform};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateReviewRequest {
    pub order_id: Uuid,
    pub rating: i32,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub platform: ReviewPlatform,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ModerateReviewRequest {
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ReviewList {
    #[schema(value_type = Vec<Review>)]
    pub items: Vec<Review>,
}
