//! Emporium CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! emp-cli migrate storefront
//!
//! # Run admin database migrations
//! emp-cli migrate admin
//!
//! # Run all database migrations
//! emp-cli migrate all
//!
//! # Create admin user
//! emp-cli admin create -u ops -p 'correct horse battery staple'
//!
//! # Create a coupon
//! emp-cli coupon create -c WELCOME10 -t percentage -v 10 --max-discount 500
//!
//! # Sweep expired verification codes
//! emp-cli otp purge
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use emporium_core::DiscountType;
use rust_decimal::Decimal;

mod commands;

use commands::coupon::CouponArgs;

#[derive(Parser)]
#[command(name = "emp-cli")]
#[command(author, version, about = "Emporium CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        target: MigrateTarget,
    },
    /// Manage admin users
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Manage coupons
    Coupon {
        #[command(subcommand)]
        action: CouponAction,
    },
    /// Maintain verification codes
    Otp {
        #[command(subcommand)]
        action: OtpAction,
    },
}

#[derive(Subcommand)]
enum MigrateTarget {
    /// Run storefront database migrations
    Storefront,
    /// Run admin database migrations
    Admin,
    /// Run all database migrations
    All,
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a new admin user
    Create {
        /// Login name
        #[arg(short, long)]
        username: String,

        /// Initial password (min 8 characters)
        #[arg(short, long)]
        password: String,
    },
}

#[derive(Subcommand)]
enum CouponAction {
    /// Create a new coupon
    Create {
        /// Coupon code (stored upper-case)
        #[arg(short, long)]
        code: String,

        /// Discount type (`percentage`, `fixed`)
        #[arg(short = 't', long = "type")]
        discount_type: DiscountType,

        /// Percentage or fixed amount
        #[arg(short, long)]
        value: Decimal,

        /// Minimum order amount
        #[arg(long, default_value = "0")]
        min_order: Decimal,

        /// Cap on a percentage discount (0 for none)
        #[arg(long, default_value = "0")]
        max_discount: Decimal,

        /// Total redemptions allowed (0 for unlimited)
        #[arg(long, default_value_t = 0)]
        usage_limit: i32,

        /// Start of the validity window, RFC 3339 (default: now)
        #[arg(long)]
        starts_at: Option<DateTime<Utc>>,

        /// End of the validity window, RFC 3339
        #[arg(long, conflicts_with = "days")]
        ends_at: Option<DateTime<Utc>>,

        /// Validity in days when no end is given
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}

#[derive(Subcommand)]
enum OtpAction {
    /// Delete expired verification codes
    Purge,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate { target } => match target {
            MigrateTarget::Storefront => commands::migrate::storefront().await?,
            MigrateTarget::Admin => commands::migrate::admin().await?,
            MigrateTarget::All => {
                commands::migrate::storefront().await?;
                commands::migrate::admin().await?;
            }
        },
        Commands::Admin { action } => match action {
            AdminAction::Create { username, password } => {
                commands::admin::create_user(&username, &password).await?;
            }
        },
        Commands::Coupon { action } => match action {
            CouponAction::Create {
                code,
                discount_type,
                value,
                min_order,
                max_discount,
                usage_limit,
                starts_at,
                ends_at,
                days,
            } => {
                commands::coupon::create(CouponArgs {
                    code,
                    discount_type,
                    value,
                    min_order,
                    max_discount,
                    usage_limit,
                    starts_at,
                    ends_at,
                    days,
                })
                .await?;
            }
        },
        Commands::Otp { action } => match action {
            OtpAction::Purge => {
                commands::otp::purge().await?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_coupon_create() {
        let cli = Cli::try_parse_from([
            "emp-cli", "coupon", "create", "-c", "welcome10", "-t", "percentage", "-v", "10",
            "--max-discount", "500",
        ]);
        let Ok(Cli {
            command:
                Commands::Coupon {
                    action:
                        CouponAction::Create {
                            discount_type,
                            value,
                            min_order,
                            days,
                            ..
                        },
                },
        }) = cli
        else {
            panic!("expected coupon create");
        };
        assert_eq!(discount_type, DiscountType::Percentage);
        assert_eq!(value, Decimal::from(10));
        assert_eq!(min_order, Decimal::ZERO);
        assert_eq!(days, 30);
    }

    #[test]
    fn test_parse_rejects_unknown_discount_type() {
        let cli = Cli::try_parse_from([
            "emp-cli", "coupon", "create", "-c", "X", "-t", "bogo", "-v", "1",
        ]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_parse_admin_create_requires_password() {
        assert!(Cli::try_parse_from(["emp-cli", "admin", "create", "-u", "ops"]).is_err());
        assert!(
            Cli::try_parse_from(["emp-cli", "admin", "create", "-u", "ops", "-p", "hunter22!"])
                .is_ok()
        );
    }
}
