use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{Config, PaymentConfig};
use crate::entities::booking::{self, BookingStatus, PaymentStatus};
use crate::entities::{booking_seat, user};
use crate::error::{AppError, AppResult};
use crate::services::booking::{find_booking, release_booking, transition};
use crate::utils::signature;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentItem {
    pub name: String,
    pub quantity: i32,
    pub price: i64,
}

/// Body of a payment-link request, in the provider's field naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLinkRequest {
    pub order_code: i64,
    pub amount: i64,
    pub description: String,
    pub buyer_name: String,
    pub buyer_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_phone: Option<String>,
    pub items: Vec<PaymentItem>,
    pub return_url: String,
    pub cancel_url: String,
    pub expired_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLink {
    pub payment_request_id: String,
    pub checkout_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_link(&self, request: &PaymentLinkRequest) -> AppResult<PaymentLink>;
}

/// PayOS payment-link client.
pub struct PayOsGateway {
    http: Client,
    config: PaymentConfig,
}

impl PayOsGateway {
    pub fn new(config: PaymentConfig) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(StdDuration::from_secs(20))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    code: String,
    #[serde(default)]
    desc: String,
    data: Option<ProviderLink>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderLink {
    checkout_url: String,
    payment_link_id: String,
}

#[async_trait]
impl PaymentGateway for PayOsGateway {
    async fn create_payment_link(&self, request: &PaymentLinkRequest) -> AppResult<PaymentLink> {
        let url = format!("{}/v2/payment-requests", self.config.api_url);

        let resp = self
            .http
            .post(url)
            .header("x-client-id", &self.config.client_id)
            .header("x-api-key", &self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, order_code = request.order_code, "Payment provider request failed");
                AppError::Unavailable("Payment provider is unreachable".to_string())
            })?;

        let status = resp.status();
        let body: Value = resp.json().await.map_err(|e| {
            tracing::error!(error = %e, %status, "Payment provider returned invalid JSON");
            AppError::Unavailable("Payment provider returned an invalid response".to_string())
        })?;

        if body.get(signature::SIGNATURE_FIELD).is_some()
            && !signature::verify(&body, &self.config.checksum_key)
        {
            return Err(AppError::Unavailable(
                "Payment provider response signature mismatch".to_string(),
            ));
        }

        let parsed: ProviderResponse = serde_json::from_value(body).map_err(|e| {
            tracing::error!(error = %e, "Unexpected payment provider response");
            AppError::Unavailable("Payment provider returned an invalid response".to_string())
        })?;

        match parsed.data {
            Some(link) if status.is_success() && parsed.code == "00" => Ok(PaymentLink {
                payment_request_id: link.payment_link_id,
                checkout_url: link.checkout_url,
            }),
            _ => Err(AppError::Unavailable(format!(
                "Payment provider rejected the request: {}",
                parsed.desc
            ))),
        }
    }
}

/// What the provider reported about a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Paid,
    Failed,
    Expired,
    Pending,
}

impl PaymentOutcome {
    /// Webhook status code: `00` paid, `01` cancelled, `02` expired.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "00" => PaymentOutcome::Paid,
            "01" => PaymentOutcome::Failed,
            "02" => PaymentOutcome::Expired,
            _ => PaymentOutcome::Pending,
        }
    }

    /// Status string of the browser return redirect.
    pub fn from_return_status(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "PAID" => Self::from_code("00"),
            "CANCELLED" => Self::from_code("01"),
            "EXPIRED" => Self::from_code("02"),
            _ => PaymentOutcome::Pending,
        }
    }

    pub fn booking_status(self) -> Option<BookingStatus> {
        match self {
            PaymentOutcome::Paid => Some(BookingStatus::Paid),
            PaymentOutcome::Failed | PaymentOutcome::Expired => Some(BookingStatus::Cancelled),
            PaymentOutcome::Pending => None,
        }
    }

    pub fn payment_status(self) -> Option<PaymentStatus> {
        match self {
            PaymentOutcome::Paid => Some(PaymentStatus::Paid),
            PaymentOutcome::Failed => Some(PaymentStatus::Failed),
            PaymentOutcome::Expired => Some(PaymentStatus::Expired),
            PaymentOutcome::Pending => None,
        }
    }

    fn cancel_reason(self) -> &'static str {
        match self {
            PaymentOutcome::Expired => "Payment link expired",
            _ => "Payment cancelled",
        }
    }
}

/// Booking id followed by the last six digits of the millisecond clock.
pub fn order_code(booking_id: i32, now_millis: i64) -> i64 {
    booking_id as i64 * 1_000_000 + now_millis.rem_euclid(1_000_000)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLinkView {
    pub booking_id: i32,
    pub order_code: i64,
    pub amount: i64,
    pub checkout_url: String,
    pub payment_request_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Request a checkout link for a pending booking owned by `user_id`.
///
/// A link that was already issued for the booking is returned as is.
pub async fn create_payment_link(
    db: &DatabaseConnection,
    gateway: &dyn PaymentGateway,
    config: &Config,
    user_id: i32,
    booking_id: i32,
) -> AppResult<PaymentLinkView> {
    let now = Utc::now();
    let b = find_booking(db, booking_id).await?;

    if b.user_id != user_id {
        return Err(AppError::Forbidden(
            "You can only pay for your own bookings".to_string(),
        ));
    }
    if b.status != BookingStatus::Pending {
        return Err(AppError::Conflict(
            "Only pending bookings can be paid".to_string(),
        ));
    }

    let expires_at = b.booked_at.with_timezone(&Utc) + config.booking_timeout();
    if now >= expires_at {
        return Err(AppError::Conflict("Booking has expired".to_string()));
    }

    if let (Some(code), Some(url), Some(request_id), Some(PaymentStatus::Pending)) = (
        b.order_code,
        b.checkout_url.clone(),
        b.payment_request_id.clone(),
        b.payment_status,
    ) {
        return Ok(PaymentLinkView {
            booking_id,
            order_code: code,
            amount: b.total_price,
            checkout_url: url,
            payment_request_id: request_id,
            expires_at,
        });
    }

    if b.total_price <= 0 {
        return Err(AppError::BadRequest(
            "Booking has nothing to pay".to_string(),
        ));
    }

    let buyer = user::Entity::find_by_id(b.user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let seat_count = booking_seat::Entity::find()
        .filter(booking_seat::Column::BookingId.eq(b.id))
        .count(db)
        .await?;

    let code = order_code(b.id, now.timestamp_millis());
    let mut request = PaymentLinkRequest {
        order_code: code,
        amount: b.total_price,
        description: format!("BK{}", b.id),
        buyer_name: buyer.full_name,
        buyer_email: buyer.email,
        buyer_phone: buyer.phone,
        items: vec![PaymentItem {
            name: format!("Booking #{} ({} seats)", b.id, seat_count),
            quantity: 1,
            price: b.total_price,
        }],
        return_url: format!("{}/api/payments/return?orderCode={}", config.backend_url, code),
        cancel_url: format!("{}/api/payments/cancel?orderCode={}", config.backend_url, code),
        expired_at: expires_at.timestamp(),
        signature: None,
    };
    let unsigned = serde_json::to_value(&request)
        .map_err(|e| AppError::Internal(format!("Failed to encode payment request: {}", e)))?;
    request.signature = Some(signature::sign(&unsigned, &config.payment.checksum_key)?);

    let link = gateway.create_payment_link(&request).await?;

    let changes = booking::ActiveModel {
        payment_request_id: Set(Some(link.payment_request_id.clone())),
        checkout_url: Set(Some(link.checkout_url.clone())),
        order_code: Set(Some(code)),
        payment_status: Set(Some(PaymentStatus::Pending)),
        updated_at: Set(now.into()),
        ..Default::default()
    };
    if !transition(db, b.id, BookingStatus::Pending, changes).await? {
        return Err(AppError::Conflict(
            "Booking is no longer pending".to_string(),
        ));
    }

    tracing::info!(booking_id = b.id, order_code = code, "Payment link created");

    Ok(PaymentLinkView {
        booking_id,
        order_code: code,
        amount: b.total_price,
        checkout_url: link.checkout_url,
        payment_request_id: link.payment_request_id,
        expires_at,
    })
}

async fn find_by_order_code(db: &DatabaseConnection, code: i64) -> AppResult<booking::Model> {
    booking::Entity::find()
        .filter(booking::Column::OrderCode.eq(code))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found for order code".to_string()))
}

/// Apply a provider outcome to a booking and return its resulting status.
pub async fn apply_outcome(
    db: &DatabaseConnection,
    booking_id: i32,
    outcome: PaymentOutcome,
) -> AppResult<BookingStatus> {
    let now = Utc::now();
    let txn = db.begin().await?;
    let b = find_booking(&txn, booking_id).await?;

    let moved = match (outcome, b.status) {
        (PaymentOutcome::Pending, _) => false,
        (PaymentOutcome::Paid, BookingStatus::Pending) => {
            let changes = booking::ActiveModel {
                status: Set(BookingStatus::Paid),
                payment_status: Set(Some(PaymentStatus::Paid)),
                payment_completed_at: Set(Some(now.into())),
                updated_at: Set(now.into()),
                ..Default::default()
            };
            transition(&txn, b.id, BookingStatus::Pending, changes).await?
        }
        (PaymentOutcome::Paid, BookingStatus::Cancelled) => {
            // money arrived after the seats were released; record it for a refund
            tracing::warn!(booking_id = b.id, "Payment received for a cancelled booking");
            let changes = booking::ActiveModel {
                payment_status: Set(Some(PaymentStatus::Paid)),
                payment_completed_at: Set(Some(now.into())),
                updated_at: Set(now.into()),
                ..Default::default()
            };
            transition(&txn, b.id, BookingStatus::Cancelled, changes).await?;
            false
        }
        (PaymentOutcome::Failed | PaymentOutcome::Expired, BookingStatus::Pending) => {
            release_booking(&txn, &b, outcome.cancel_reason(), outcome.payment_status(), now)
                .await?
        }
        _ => false,
    };

    let status = if moved {
        outcome.booking_status().unwrap_or(b.status)
    } else {
        find_booking(&txn, booking_id).await?.status
    };
    txn.commit().await?;

    if moved {
        tracing::info!(booking_id, ?outcome, ?status, "Payment outcome applied");
    } else {
        tracing::debug!(booking_id, ?outcome, ?status, "Payment outcome left booking unchanged");
    }
    Ok(status)
}

/// Handle a provider webhook. Errors are only returned for requests that
/// fail authentication or reference nothing; update failures are logged.
pub async fn handle_webhook(
    db: &DatabaseConnection,
    checksum_key: &str,
    body: &Value,
) -> AppResult<()> {
    if !signature::verify(body, checksum_key) {
        tracing::warn!("Webhook rejected: invalid signature");
        return Err(AppError::BadRequest("Invalid webhook signature".to_string()));
    }

    body.get("success")
        .and_then(Value::as_bool)
        .ok_or_else(|| AppError::BadRequest("Webhook is missing the success flag".to_string()))?;

    let data = body.get("data");
    let code = data
        .and_then(|d| d.get("orderCode"))
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::BadRequest("Webhook is missing the order code".to_string()))?;

    let status_code = data
        .and_then(|d| d.get("code"))
        .or_else(|| body.get("code"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let outcome = PaymentOutcome::from_code(status_code);

    let b = find_by_order_code(db, code).await?;

    match apply_outcome(db, b.id, outcome).await {
        Ok(status) => {
            tracing::info!(booking_id = b.id, order_code = code, ?outcome, ?status, "Webhook processed")
        }
        Err(e) => {
            tracing::error!(booking_id = b.id, order_code = code, error = %e, "Webhook update failed")
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnQuery {
    pub order_code: Option<i64>,
    #[serde(alias = "id")]
    pub payment_request_id: Option<String>,
    pub status: Option<String>,
}

/// Browser return from the provider. Returns the booking id and outcome.
pub async fn handle_return(
    db: &DatabaseConnection,
    query: &ReturnQuery,
) -> AppResult<(i32, PaymentOutcome)> {
    let code = query
        .order_code
        .ok_or_else(|| AppError::BadRequest("Missing order code".to_string()))?;
    let b = find_by_order_code(db, code).await?;

    let outcome = PaymentOutcome::from_return_status(query.status.as_deref().unwrap_or_default());

    if outcome == PaymentOutcome::Paid
        && b.payment_request_id.as_deref() != query.payment_request_id.as_deref()
    {
        tracing::warn!(booking_id = b.id, order_code = code, "Return callback with mismatched payment request");
        return Err(AppError::BadRequest("Payment request does not match booking".to_string()));
    }

    apply_outcome(db, b.id, outcome).await?;
    Ok((b.id, outcome))
}

/// Browser cancel from the provider checkout page.
pub async fn handle_cancel(db: &DatabaseConnection, order_code: Option<i64>) -> AppResult<i32> {
    let code = order_code.ok_or_else(|| AppError::BadRequest("Missing order code".to_string()))?;
    let b = find_by_order_code(db, code).await?;
    apply_outcome(db, b.id, PaymentOutcome::Failed).await?;
    Ok(b.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_code_mapping() {
        assert_eq!(PaymentOutcome::from_code("00"), PaymentOutcome::Paid);
        assert_eq!(PaymentOutcome::from_code("01"), PaymentOutcome::Failed);
        assert_eq!(PaymentOutcome::from_code("02"), PaymentOutcome::Expired);
        assert_eq!(PaymentOutcome::from_code("99"), PaymentOutcome::Pending);
        assert_eq!(PaymentOutcome::from_code(""), PaymentOutcome::Pending);
    }

    #[test]
    fn test_outcome_statuses() {
        assert_eq!(PaymentOutcome::Paid.booking_status(), Some(BookingStatus::Paid));
        assert_eq!(PaymentOutcome::Paid.payment_status(), Some(PaymentStatus::Paid));
        assert_eq!(PaymentOutcome::Failed.booking_status(), Some(BookingStatus::Cancelled));
        assert_eq!(PaymentOutcome::Failed.payment_status(), Some(PaymentStatus::Failed));
        assert_eq!(PaymentOutcome::Expired.booking_status(), Some(BookingStatus::Cancelled));
        assert_eq!(PaymentOutcome::Expired.payment_status(), Some(PaymentStatus::Expired));
        assert_eq!(PaymentOutcome::Pending.booking_status(), None);
    }

    #[test]
    fn test_return_status_mapping() {
        assert_eq!(PaymentOutcome::from_return_status("PAID"), PaymentOutcome::Paid);
        assert_eq!(PaymentOutcome::from_return_status("cancelled"), PaymentOutcome::Failed);
        assert_eq!(PaymentOutcome::from_return_status("EXPIRED"), PaymentOutcome::Expired);
        assert_eq!(PaymentOutcome::from_return_status("PROCESSING"), PaymentOutcome::Pending);
    }

    #[test]
    fn test_order_code_concatenates_digits() {
        assert_eq!(order_code(42, 1_700_000_123_456), 42_123_456);
        assert_eq!(order_code(7, 1_700_000_000_005), 7_000_005);
    }

    #[test]
    fn test_signed_request_verifies() {
        let request = PaymentLinkRequest {
            order_code: 1_000_001,
            amount: 250_000,
            description: "BK1".to_string(),
            buyer_name: "Nguyen Van A".to_string(),
            buyer_email: "a@example.com".to_string(),
            buyer_phone: None,
            items: vec![],
            return_url: "http://localhost/return".to_string(),
            cancel_url: "http://localhost/cancel".to_string(),
            expired_at: 0,
            signature: None,
        };
        let mut value = serde_json::to_value(&request).unwrap();
        let sig = signature::sign(&value, "key").unwrap();
        value["signature"] = Value::String(sig);
        assert!(signature::verify(&value, "key"));
    }
}
