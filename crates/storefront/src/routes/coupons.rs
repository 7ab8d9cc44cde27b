//! Coupon validation.
//!
//! Prices a coupon against an order amount without redeeming it. Usage
//! counting happens at checkout, outside this API.

use axum::{Json, extract::State};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use emporium_core::coupon::{self, CouponError};

use crate::db::CouponRepository;
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub order_amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ValidateCouponResponse {
    pub code: String,
    pub discount: Decimal,
    pub payable: Decimal,
}

/// `POST /api/coupons/validate`
pub async fn validate(
    State(state): State<AppState>,
    Json(body): Json<ValidateCouponRequest>,
) -> Result<Json<ValidateCouponResponse>> {
    if body.code.trim().is_empty() {
        return Err(AppError::BadRequest("code is required".to_string()));
    }

    let coupon = CouponRepository::new(state.pool())
        .get_by_code(&body.code)
        .await?
        .ok_or(CouponError::NotFound)?;

    let discount = coupon::evaluate(&coupon, body.order_amount, state.clock().now())?;

    Ok(Json(ValidateCouponResponse {
        code: coupon.code,
        discount,
        payable: body.order_amount - discount,
    }))
}
