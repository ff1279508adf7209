use axum::{
    extract::{Query, State},
    response::Redirect,
    Json,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppResult;
use crate::services::payment::{self as payments, PaymentOutcome, ReturnQuery};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub success: bool,
}

/// Payment status notification from the provider
pub async fn webhook(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> AppResult<Json<WebhookAck>> {
    payments::handle_webhook(&state.db, &state.config.payment.checksum_key, &body).await?;
    Ok(Json(WebhookAck { success: true }))
}

fn frontend_redirect(state: &AppState, page: &str, params: &[(&str, String)]) -> Redirect {
    let base = format!("{}/payment/{}", state.config.frontend_url, page);
    match Url::parse_with_params(&base, params) {
        Ok(url) => Redirect::to(url.as_str()),
        Err(e) => {
            tracing::error!(error = %e, base = %base, "Invalid frontend redirect URL");
            Redirect::to(&base)
        }
    }
}

/// Browser lands here after checkout
pub async fn payment_return(
    State(state): State<AppState>,
    Query(query): Query<ReturnQuery>,
) -> Redirect {
    match payments::handle_return(&state.db, &query).await {
        Ok((booking_id, PaymentOutcome::Failed | PaymentOutcome::Expired)) => frontend_redirect(
            &state,
            "cancel",
            &[("bookingId", booking_id.to_string())],
        ),
        Ok((booking_id, outcome)) => {
            let status = if outcome == PaymentOutcome::Paid { "paid" } else { "pending" };
            frontend_redirect(
                &state,
                "success",
                &[
                    ("bookingId", booking_id.to_string()),
                    ("status", status.to_string()),
                ],
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, order_code = ?query.order_code, "Payment return failed");
            frontend_redirect(&state, "error", &[("message", e.public_message())])
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelQuery {
    pub order_code: Option<i64>,
}

/// Browser lands here when the customer abandons checkout
pub async fn payment_cancel(
    State(state): State<AppState>,
    Query(query): Query<CancelQuery>,
) -> Redirect {
    match payments::handle_cancel(&state.db, query.order_code).await {
        Ok(booking_id) => frontend_redirect(
            &state,
            "cancel",
            &[("bookingId", booking_id.to_string())],
        ),
        Err(e) => {
            tracing::warn!(error = %e, order_code = ?query.order_code, "Payment cancel failed");
            frontend_redirect(&state, "error", &[("message", e.public_message())])
        }
    }
}
