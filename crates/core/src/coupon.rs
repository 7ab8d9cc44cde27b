//! Coupon validation and discount calculation.
//!
//! [`evaluate`] is read-only. Incrementing `used_count` belongs to order
//! finalization, so validating a coupon any number of times never consumes it.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CouponId, DiscountType};

/// Reasons a coupon cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("coupon not found")]
    NotFound,

    #[error("coupon is not active")]
    Inactive,

    #[error("coupon is not valid yet")]
    NotStarted,

    #[error("coupon has expired")]
    Expired,

    #[error("coupon usage limit reached")]
    UsageLimitReached,

    /// The order is below the coupon's minimum amount.
    #[error("order amount must be at least {minimum}")]
    BelowMinimum { minimum: Decimal },

    #[error("order amount must not be negative")]
    InvalidOrderAmount,

    /// The discount cannot be computed for an amount this large.
    #[error("order amount is too large")]
    OrderAmountTooLarge,
}

/// A stored coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    /// Unique, stored in normalized form (see [`normalize_code`]).
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_amount: Decimal,
    /// Upper bound for percentage discounts. Zero means uncapped.
    pub max_discount: Decimal,
    /// Zero means unlimited.
    pub usage_limit: i32,
    pub used_count: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Canonical form of a coupon code: trimmed and upper-cased.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Check a coupon against an order and compute the discount.
///
/// Checks run in order: active flag, validity window (inclusive), usage
/// limit, minimum order amount. The discount is rounded half away from zero
/// to a whole currency unit and never exceeds the order amount.
///
/// # Errors
///
/// Returns the first failing check as a [`CouponError`].
pub fn evaluate(
    coupon: &Coupon,
    order_amount: Decimal,
    now: DateTime<Utc>,
) -> Result<Decimal, CouponError> {
    if order_amount.is_sign_negative() && !order_amount.is_zero() {
        return Err(CouponError::InvalidOrderAmount);
    }
    if !coupon.is_active {
        return Err(CouponError::Inactive);
    }
    if now < coupon.starts_at {
        return Err(CouponError::NotStarted);
    }
    if now > coupon.ends_at {
        return Err(CouponError::Expired);
    }
    if coupon.usage_limit > 0 && coupon.used_count >= coupon.usage_limit {
        return Err(CouponError::UsageLimitReached);
    }
    if order_amount < coupon.min_order_amount {
        return Err(CouponError::BelowMinimum {
            minimum: coupon.min_order_amount,
        });
    }

    let raw = match coupon.discount_type {
        DiscountType::Percentage => {
            let percent = order_amount
                .checked_mul(coupon.discount_value)
                .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
                .ok_or(CouponError::OrderAmountTooLarge)?;
            if coupon.max_discount > Decimal::ZERO {
                percent.min(coupon.max_discount)
            } else {
                percent
            }
        }
        DiscountType::Fixed => coupon.discount_value,
    };

    let rounded = raw
        .min(order_amount)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    // Rounding up a fractional order amount could overshoot it.
    if rounded > order_amount {
        return Ok(order_amount.floor());
    }

    Ok(rounded)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn d(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn coupon(discount_type: DiscountType, value: Decimal, max_discount: Decimal) -> Coupon {
        Coupon {
            id: CouponId::new(1),
            code: "SUMMER".to_string(),
            discount_type,
            discount_value: value,
            min_order_amount: Decimal::ZERO,
            max_discount,
            usage_limit: 0,
            used_count: 0,
            starts_at: now() - Duration::days(1),
            ends_at: now() + Duration::days(1),
            is_active: true,
        }
    }

    #[test]
    fn test_percentage_capped() {
        let c = coupon(DiscountType::Percentage, d(20), d(500));
        assert_eq!(evaluate(&c, d(5000), now()).unwrap(), d(500));
    }

    #[test]
    fn test_percentage_under_cap() {
        let c = coupon(DiscountType::Percentage, d(20), d(500));
        assert_eq!(evaluate(&c, d(1000), now()).unwrap(), d(200));
    }

    #[test]
    fn test_percentage_uncapped() {
        let c = coupon(DiscountType::Percentage, d(20), Decimal::ZERO);
        assert_eq!(evaluate(&c, d(5000), now()).unwrap(), d(1000));
    }

    #[test]
    fn test_fixed_never_exceeds_order() {
        let c = coupon(DiscountType::Fixed, d(1000), Decimal::ZERO);
        assert_eq!(evaluate(&c, d(700), now()).unwrap(), d(700));
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        let c = coupon(DiscountType::Percentage, d(15), Decimal::ZERO);
        // 15% of 1010 = 151.5
        assert_eq!(evaluate(&c, d(1010), now()).unwrap(), d(152));
        // 15% of 1003 = 150.45
        assert_eq!(evaluate(&c, d(1003), now()).unwrap(), d(150));
    }

    #[test]
    fn test_rounding_does_not_overshoot_order() {
        let c = coupon(DiscountType::Fixed, d(1000), Decimal::ZERO);
        assert_eq!(evaluate(&c, Decimal::new(7005, 1), now()).unwrap(), d(700));
    }

    #[test]
    fn test_inactive() {
        let mut c = coupon(DiscountType::Fixed, d(100), Decimal::ZERO);
        c.is_active = false;
        assert_eq!(evaluate(&c, d(700), now()), Err(CouponError::Inactive));
    }

    #[test]
    fn test_validity_window() {
        let c = coupon(DiscountType::Fixed, d(100), Decimal::ZERO);
        assert_eq!(
            evaluate(&c, d(700), c.starts_at - Duration::seconds(1)),
            Err(CouponError::NotStarted)
        );
        assert_eq!(
            evaluate(&c, d(700), c.ends_at + Duration::seconds(1)),
            Err(CouponError::Expired)
        );
        assert!(evaluate(&c, d(700), c.starts_at).is_ok());
        assert!(evaluate(&c, d(700), c.ends_at).is_ok());
    }

    #[test]
    fn test_usage_limit() {
        let mut c = coupon(DiscountType::Fixed, d(100), Decimal::ZERO);
        c.usage_limit = 3;
        c.used_count = 3;
        assert_eq!(
            evaluate(&c, d(700), now()),
            Err(CouponError::UsageLimitReached)
        );

        c.usage_limit = 0;
        c.used_count = 10_000;
        assert!(evaluate(&c, d(700), now()).is_ok());
    }

    #[test]
    fn test_minimum_names_amount() {
        let mut c = coupon(DiscountType::Fixed, d(100), Decimal::ZERO);
        c.min_order_amount = d(1500);
        let err = evaluate(&c, d(700), now()).unwrap_err();
        assert_eq!(
            err,
            CouponError::BelowMinimum {
                minimum: d(1500)
            }
        );
        assert_eq!(err.to_string(), "order amount must be at least 1500");
    }

    #[test]
    fn test_negative_order_rejected() {
        let c = coupon(DiscountType::Fixed, d(100), Decimal::ZERO);
        assert_eq!(
            evaluate(&c, d(-1), now()),
            Err(CouponError::InvalidOrderAmount)
        );
    }

    #[test]
    fn test_huge_order_amount_is_rejected() {
        let c = coupon(DiscountType::Percentage, d(20), d(500));
        let huge: Decimal = "70000000000000000000000000000".parse().unwrap();
        assert_eq!(
            evaluate(&c, huge, now()),
            Err(CouponError::OrderAmountTooLarge)
        );

        // Fixed discounts never multiply, so the same amount prices fine.
        let fixed = coupon(DiscountType::Fixed, d(100), Decimal::ZERO);
        assert_eq!(evaluate(&fixed, huge, now()).unwrap(), d(100));
        assert_eq!(
            evaluate(&c, Decimal::MAX, now()),
            Err(CouponError::OrderAmountTooLarge)
        );
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  summer25 "), "SUMMER25");
    }
}
