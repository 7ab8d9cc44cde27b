//! Coupon management commands.
//!
//! # Usage
//!
//! ```bash
//! # 10% off orders of 3000 or more, capped at 500, valid for 30 days
//! emp-cli coupon create -c WELCOME10 -t percentage -v 10 --min-order 3000 --max-discount 500
//!
//! # 200 off, 100 uses, explicit window
//! emp-cli coupon create -c SPRING200 -t fixed -v 200 --usage-limit 100 \
//!     --starts-at 2026-03-01T00:00:00Z --ends-at 2026-05-31T23:59:59Z
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string for storefront

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use emporium_core::coupon::normalize_code;
use emporium_core::{CouponId, DiscountType};
use emporium_storefront::db::CouponRepository;
use emporium_storefront::db::coupons::NewCoupon;

use super::{CommandError, storefront_pool};

/// Coupon fields as given on the command line.
#[derive(Debug, Clone)]
pub struct CouponArgs {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub min_order: Decimal,
    pub max_discount: Decimal,
    pub usage_limit: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub days: i64,
}

impl CouponArgs {
    /// Check the arguments and resolve the validity window against `now`.
    fn into_new_coupon(self, now: DateTime<Utc>) -> Result<NewCoupon, CommandError> {
        let code = normalize_code(&self.code);
        if code.is_empty() {
            return Err(invalid("code must not be blank"));
        }
        if self.value <= Decimal::ZERO {
            return Err(invalid("value must be positive"));
        }
        if self.discount_type == DiscountType::Percentage && self.value > Decimal::ONE_HUNDRED {
            return Err(invalid("percentage must not exceed 100"));
        }
        if self.min_order.is_sign_negative() || self.max_discount.is_sign_negative() {
            return Err(invalid("amounts must not be negative"));
        }
        if self.usage_limit < 0 {
            return Err(invalid("usage limit must not be negative"));
        }

        let starts_at = self.starts_at.unwrap_or(now);
        let ends_at = match self.ends_at {
            Some(ends_at) => ends_at,
            None => Duration::try_days(self.days)
                .and_then(|days| starts_at.checked_add_signed(days))
                .ok_or_else(|| invalid("days is out of range"))?,
        };
        if ends_at <= starts_at {
            return Err(invalid("coupon must end after it starts"));
        }

        Ok(NewCoupon {
            code,
            discount_type: self.discount_type,
            discount_value: self.value,
            min_order_amount: self.min_order,
            max_discount: self.max_discount,
            usage_limit: self.usage_limit,
            starts_at,
            ends_at,
        })
    }
}

fn invalid(msg: &str) -> CommandError {
    CommandError::InvalidArgument(msg.to_string())
}

/// Create a coupon.
///
/// # Errors
///
/// Returns an error if the arguments are inconsistent or the code is taken.
pub async fn create(args: CouponArgs) -> Result<CouponId, CommandError> {
    let coupon = args.into_new_coupon(Utc::now())?;

    let pool = storefront_pool().await?;
    let id = CouponRepository::new(&pool).create(&coupon).await?;

    tracing::info!(
        coupon_id = %id,
        code = %coupon.code,
        discount_type = %coupon.discount_type,
        value = %coupon.discount_value,
        ends_at = %coupon.ends_at,
        "Coupon created"
    );
    Ok(id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn args() -> CouponArgs {
        CouponArgs {
            code: " welcome10 ".to_string(),
            discount_type: DiscountType::Percentage,
            value: Decimal::from(10),
            min_order: Decimal::from(3000),
            max_discount: Decimal::from(500),
            usage_limit: 0,
            starts_at: None,
            ends_at: None,
            days: 30,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_window_defaults_to_days_from_now() {
        let coupon = args().into_new_coupon(now()).unwrap();
        assert_eq!(coupon.code, "WELCOME10");
        assert_eq!(coupon.starts_at, now());
        assert_eq!(coupon.ends_at, now() + Duration::days(30));
    }

    #[test]
    fn test_explicit_window_wins() {
        let ends_at = Utc.with_ymd_and_hms(2026, 5, 31, 23, 59, 59).unwrap();
        let coupon = CouponArgs {
            ends_at: Some(ends_at),
            ..args()
        }
        .into_new_coupon(now())
        .unwrap();
        assert_eq!(coupon.ends_at, ends_at);
    }

    #[test]
    fn test_rejects_inconsistent_arguments() {
        let cases = [
            CouponArgs {
                code: "   ".to_string(),
                ..args()
            },
            CouponArgs {
                value: Decimal::ZERO,
                ..args()
            },
            CouponArgs {
                value: Decimal::from(150),
                ..args()
            },
            CouponArgs {
                usage_limit: -1,
                ..args()
            },
            CouponArgs {
                ends_at: Some(now() - Duration::days(1)),
                ..args()
            },
        ];
        for case in cases {
            assert!(matches!(
                case.into_new_coupon(now()),
                Err(CommandError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_out_of_range_days_is_rejected() {
        for days in [i64::MAX, 1_000_000_000] {
            let result = CouponArgs { days, ..args() }.into_new_coupon(now());
            assert!(matches!(result, Err(CommandError::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_fixed_amount_may_exceed_one_hundred() {
        let coupon = CouponArgs {
            discount_type: DiscountType::Fixed,
            value: Decimal::from(200),
            ..args()
        }
        .into_new_coupon(now())
        .unwrap();
        assert_eq!(coupon.discount_value, Decimal::from(200));
    }
}
