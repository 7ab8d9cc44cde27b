//! Coupon pricing scenarios and the storefront's reporting of rejections.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use emporium_core::coupon::{Coupon, CouponError, evaluate, normalize_code};
use emporium_core::{CouponId, DiscountType};
use emporium_integration_tests::epoch;
use emporium_storefront::error::AppError;

fn coupon(discount_type: DiscountType, value: i64, max_discount: i64) -> Coupon {
    Coupon {
        id: CouponId::new(1),
        code: normalize_code(" spring20 "),
        discount_type,
        discount_value: Decimal::from(value),
        min_order_amount: Decimal::ZERO,
        max_discount: Decimal::from(max_discount),
        usage_limit: 0,
        used_count: 0,
        starts_at: epoch() - Duration::days(1),
        ends_at: epoch() + Duration::days(30),
        is_active: true,
    }
}

fn price(coupon: &Coupon, amount: i64, now: DateTime<Utc>) -> Result<Decimal, CouponError> {
    evaluate(coupon, Decimal::from(amount), now)
}

#[test]
fn test_percentage_cap_and_order_bound() {
    let twenty = coupon(DiscountType::Percentage, 20, 500);
    assert_eq!(twenty.code, "SPRING20");
    assert_eq!(price(&twenty, 5000, epoch()).unwrap(), Decimal::from(500));
    assert_eq!(price(&twenty, 1000, epoch()).unwrap(), Decimal::from(200));

    let fixed = coupon(DiscountType::Fixed, 1000, 0);
    assert_eq!(price(&fixed, 700, epoch()).unwrap(), Decimal::from(700));
}

#[test]
fn test_window_is_inclusive() {
    let c = coupon(DiscountType::Fixed, 100, 0);
    assert!(price(&c, 1000, c.starts_at).is_ok());
    assert!(price(&c, 1000, c.ends_at).is_ok());
    assert!(matches!(
        price(&c, 1000, c.starts_at - Duration::seconds(1)),
        Err(CouponError::NotStarted)
    ));
    assert!(matches!(
        price(&c, 1000, c.ends_at + Duration::seconds(1)),
        Err(CouponError::Expired)
    ));
}

#[test]
fn test_usage_limit_and_minimum() {
    let used_up = Coupon {
        usage_limit: 10,
        used_count: 10,
        ..coupon(DiscountType::Fixed, 100, 0)
    };
    assert!(matches!(
        price(&used_up, 1000, epoch()),
        Err(CouponError::UsageLimitReached)
    ));

    let unlimited = Coupon {
        usage_limit: 0,
        used_count: 10_000,
        ..coupon(DiscountType::Fixed, 100, 0)
    };
    assert!(price(&unlimited, 1000, epoch()).is_ok());

    let minimum = Coupon {
        min_order_amount: Decimal::from(3000),
        ..coupon(DiscountType::Percentage, 10, 0)
    };
    let err = price(&minimum, 2999, epoch()).unwrap_err();
    let response = AppError::from(err).into_response();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[test]
fn test_inactive_is_checked_first() {
    let c = Coupon {
        is_active: false,
        usage_limit: 1,
        used_count: 1,
        ..coupon(DiscountType::Fixed, 100, 0)
    };
    assert!(matches!(price(&c, 10, epoch()), Err(CouponError::Inactive)));
}

#[test]
fn test_discount_rounds_to_whole_units() {
    let c = coupon(DiscountType::Percentage, 15, 0);
    // 15% of 1003 is 150.45.
    assert_eq!(price(&c, 1003, epoch()).unwrap(), Decimal::from(150));
    // 15% of 1010 is 151.5.
    assert_eq!(price(&c, 1010, epoch()).unwrap(), Decimal::from(152));
}
