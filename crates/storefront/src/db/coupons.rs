//! Coupon repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use emporium_core::coupon::{Coupon, normalize_code};
use emporium_core::{CouponId, DiscountType};

use super::{RepositoryError, conflict_or_database};

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    id: i32,
    code: String,
    discount_type: DiscountType,
    discount_value: Decimal,
    min_order_amount: Decimal,
    max_discount: Decimal,
    usage_limit: i32,
    used_count: i32,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    is_active: bool,
}

impl From<CouponRow> for Coupon {
    fn from(row: CouponRow) -> Self {
        Self {
            id: CouponId::new(row.id),
            code: row.code,
            discount_type: row.discount_type,
            discount_value: row.discount_value,
            min_order_amount: row.min_order_amount,
            max_discount: row.max_discount,
            usage_limit: row.usage_limit,
            used_count: row.used_count,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            is_active: row.is_active,
        }
    }
}

/// Fields for a new coupon.
#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_amount: Decimal,
    pub max_discount: Decimal,
    pub usage_limit: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Repository for `storefront.coupon`.
pub struct CouponRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CouponRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Look up a coupon by code. The code is normalized first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<Coupon>, RepositoryError> {
        let row = sqlx::query_as::<_, CouponRow>(
            r"
            SELECT id, code, discount_type, discount_value, min_order_amount, max_discount,
                   usage_limit, used_count, starts_at, ends_at, is_active
            FROM storefront.coupon
            WHERE code = $1
            ",
        )
        .bind(normalize_code(code))
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Create a coupon.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code already exists.
    pub async fn create(&self, coupon: &NewCoupon) -> Result<CouponId, RepositoryError> {
        let id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO storefront.coupon
                (code, discount_type, discount_value, min_order_amount, max_discount,
                 usage_limit, starts_at, ends_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            ",
        )
        .bind(normalize_code(&coupon.code))
        .bind(coupon.discount_type)
        .bind(coupon.discount_value)
        .bind(coupon.min_order_amount)
        .bind(coupon.max_discount)
        .bind(coupon.usage_limit)
        .bind(coupon.starts_at)
        .bind(coupon.ends_at)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_or_database(e, "coupon code"))?;

        Ok(CouponId::new(id))
    }
}
