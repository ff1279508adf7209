use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::feedback;
use crate::error::{AppError, AppResult};
use crate::response::{created, ok, CreatedResponse, JsonResponse};
use crate::services::booking::{self as bookings, BookingDetail, NewBooking};
use crate::services::payment::{self as payments, PaymentLinkView};
use crate::utils::jwt::Claims;
use crate::AppState;

/// Hold seats on a trip for the current customer
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<NewBooking>,
) -> AppResult<CreatedResponse<BookingDetail>> {
    let detail = bookings::create_booking(&state.db, claims.sub, payload).await?;
    Ok(created("Booking created", detail))
}

/// Get current customer's bookings
pub async fn my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<JsonResponse<Vec<BookingDetail>>> {
    let list = bookings::list_user_bookings(&state.db, claims.sub).await?;
    Ok(ok("Bookings retrieved", list))
}

/// Booking detail, visible to its owner and to admins
pub async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
) -> AppResult<JsonResponse<BookingDetail>> {
    let owner = (!claims.is_admin()).then_some(claims.sub);
    let detail = bookings::get_booking(&state.db, id, owner).await?;
    Ok(ok("Booking retrieved", detail))
}

/// Cancel a booking before departure
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
) -> AppResult<JsonResponse<BookingDetail>> {
    let detail = bookings::cancel_booking(&state.db, claims.sub, id).await?;
    Ok(ok("Booking cancelled", detail))
}

/// Ask the payment provider for a checkout link
pub async fn create_payment_link(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
) -> AppResult<JsonResponse<PaymentLinkView>> {
    let link = payments::create_payment_link(
        &state.db,
        state.payments.as_ref(),
        &state.config,
        claims.sub,
        id,
    )
    .await?;
    Ok(ok("Payment link created", link))
}

// ============ Feedback ============

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub booking_id: i32,
    pub rating: i32,
    pub comment: Option<String>,
}

/// Rate a completed trip, once per booking
pub async fn submit_feedback(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<FeedbackRequest>,
) -> AppResult<CreatedResponse<feedback::Model>> {
    if !(1..=5).contains(&payload.rating) {
        return Err(AppError::BadRequest("Rating must be between 1 and 5".to_string()));
    }

    let b = booking::Entity::find_by_id(payload.booking_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    if b.user_id != claims.sub {
        return Err(AppError::Forbidden(
            "You can only review your own bookings".to_string(),
        ));
    }
    if b.status != BookingStatus::Completed {
        return Err(AppError::BadRequest(
            "Only completed trips can be reviewed".to_string(),
        ));
    }

    let existing = feedback::Entity::find()
        .filter(feedback::Column::BookingId.eq(b.id))
        .count(&state.db)
        .await?;
    if existing > 0 {
        return Err(AppError::Conflict(
            "Feedback already submitted for this booking".to_string(),
        ));
    }

    let created_feedback = feedback::ActiveModel {
        user_id: Set(claims.sub),
        booking_id: Set(b.id),
        rating: Set(payload.rating),
        comment: Set(payload.comment.filter(|c| !c.trim().is_empty())),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    Ok(created("Feedback submitted", created_feedback))
}

pub async fn my_feedback(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<JsonResponse<Vec<feedback::Model>>> {
    let list = feedback::Entity::find()
        .filter(feedback::Column::UserId.eq(claims.sub))
        .order_by_desc(feedback::Column::CreatedAt)
        .all(&state.db)
        .await?;
    Ok(ok("Feedback retrieved", list))
}
