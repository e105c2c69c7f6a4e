use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    dto::reviews::{CreateReviewRequest, ModerateReviewRequest, ReviewList},
    entity::{
        orders::{Column as OrderCol, Entity as Orders},
        reviews::{ActiveModel as ReviewActive, Column as ReviewCol, Entity as Reviews, Model as ReviewModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Review, ReviewStatus},
    policy::{Operation, authorize},
    response::{ApiResponse, Meta},
    routes::params::ReviewQuery,
    services::parse_stored,
    state::AppState,
    workflow::OrderStatus,
};

pub const MAX_COMMENT_CHARS: usize = 500;

/// Reviews are only accepted for the caller's own completed orders.
pub async fn create_review(
    state: &AppState,
    user: &AuthUser,
    payload: CreateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    authorize(user, Operation::CreateReview)?;
    validate_review(&payload)?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(payload.order_id))
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Status.eq(OrderStatus::Completed.as_str())),
        )
        .one(&state.orm)
        .await?;
    if order.is_none() {
        return Err(AppError::BadRequest("Order not found or not completed".into()));
    }

    let review = ReviewActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        order_id: Set(payload.order_id),
        rating: Set(payload.rating),
        comment: Set(payload.comment.trim().to_string()),
        platform: Set(payload.platform.as_str().to_string()),
        status: Set(ReviewStatus::Pending.as_str().to_string()),
        moderated_by: Set(None),
        moderated_at: Set(None),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::ReviewCreate,
        serde_json::json!({ "review_id": review.id, "order_id": review.order_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Review submitted successfully",
        review_from_entity(review)?,
        Some(Meta::empty()),
    ))
}

/// Public listing of approved reviews.
pub async fn list_approved(
    state: &AppState,
    query: ReviewQuery,
) -> AppResult<ApiResponse<ReviewList>> {
    let mut condition = Condition::all().add(ReviewCol::Status.eq(ReviewStatus::Approved.as_str()));
    if let Some(rating) = query.rating {
        condition = condition.add(ReviewCol::Rating.eq(rating));
    }
    list_where(state, condition, &query).await
}

/// Moderation queue, optionally filtered by status.
pub async fn list_all(
    state: &AppState,
    user: &AuthUser,
    query: ReviewQuery,
) -> AppResult<ApiResponse<ReviewList>> {
    authorize(user, Operation::ListAllReviews)?;
    let mut condition = Condition::all();
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        let status = parse_review_status(status)?;
        condition = condition.add(ReviewCol::Status.eq(status.as_str()));
    }
    if let Some(rating) = query.rating {
        condition = condition.add(ReviewCol::Rating.eq(rating));
    }
    list_where(state, condition, &query).await
}

pub async fn moderate(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: ModerateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    authorize(user, Operation::ModerateReview)?;
    let status = parse_review_status(&payload.status)?;

    let existing = Reviews::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ReviewActive = existing.into();
    active.status = Set(status.as_str().to_string());
    active.moderated_by = Set(Some(user.user_id));
    active.moderated_at = Set(Some(Utc::now().into()));
    let review = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        AuditAction::ReviewModerate,
        serde_json::json!({ "review_id": review.id, "status": review.status }),
    )
    .await;

    Ok(ApiResponse::success(
        "Review moderated successfully",
        review_from_entity(review)?,
        Some(Meta::empty()),
    ))
}

async fn list_where(
    state: &AppState,
    condition: Condition,
    query: &ReviewQuery,
) -> AppResult<ApiResponse<ReviewList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let finder = Reviews::find()
        .filter(condition)
        .order_by_desc(ReviewCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(review_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Reviews",
        ReviewList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

fn parse_review_status(value: &str) -> AppResult<ReviewStatus> {
    value
        .parse::<ReviewStatus>()
        .map_err(|_| AppError::BadRequest("Invalid status".into()))
}

fn validate_review(payload: &CreateReviewRequest) -> AppResult<()> {
    if !(1..=5).contains(&payload.rating) {
        return Err(AppError::BadRequest("rating must be between 1 and 5".into()));
    }
    if payload.comment.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::BadRequest(format!(
            "comment must be at most {MAX_COMMENT_CHARS} characters"
        )));
    }
    Ok(())
}

fn review_from_entity(model: ReviewModel) -> AppResult<Review> {
    Ok(Review {
        id: model.id,
        user_id: model.user_id,
        order_id: model.order_id,
        rating: model.rating,
        comment: model.comment,
        platform: parse_stored(&model.platform, "reviews.platform")?,
        status: parse_stored(&model.status, "reviews.status")?,
        moderated_at: model.moderated_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReviewPlatform;

    fn review(rating: i32, comment: &str) -> CreateReviewRequest {
        CreateReviewRequest {
            order_id: Uuid::new_v4(),
            rating,
            comment: comment.into(),
            platform: ReviewPlatform::Website,
        }
    }

    #[test]
    fn rating_must_be_one_to_five() {
        assert!(validate_review(&review(0, "")).is_err());
        assert!(validate_review(&review(6, "")).is_err());
        assert!(validate_review(&review(1, "")).is_ok());
        assert!(validate_review(&review(5, "great momos")).is_ok());
    }

    #[test]
    fn comments_are_capped() {
        let long = "a".repeat(MAX_COMMENT_CHARS + 1);
        assert!(validate_review(&review(4, &long)).is_err());
        let exact = "ä".repeat(MAX_COMMENT_CHARS);
        assert!(validate_review(&review(4, &exact)).is_ok());
    }

    #[test]
    fn moderation_accepts_the_three_statuses() {
        assert_eq!(parse_review_status("approved").unwrap(), ReviewStatus::Approved);
        assert_eq!(parse_review_status("rejected").unwrap(), ReviewStatus::Rejected);
        assert_eq!(parse_review_status("pending").unwrap(), ReviewStatus::Pending);
        assert!(matches!(
            parse_review_status("hidden"),
            Err(AppError::BadRequest(_))
        ));
    }
}
