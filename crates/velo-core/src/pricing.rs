//! Trip cost computation.
//!
//! Billing order is fixed: elapsed time rounds up to whole minutes (minimum
//! one minute), the per-class rate applies, the loyalty tier discount is
//! taken multiplicatively, and flex dollars offset the discounted amount
//! dollar-for-dollar, floored at zero. Everything is integer cents.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::PricingConfig;
use crate::types::{BikeClass, Cents};

/// Full pricing breakdown for one completed trip.
///
/// Stored on the rental at completion so billing history can show how the
/// final amount was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TripCharge {
    /// Minutes billed after rounding up (at least 1).
    pub billed_minutes: i64,

    /// `billed_minutes * rate` before any discount.
    pub base_cents: Cents,

    /// Loyalty tier discount percentage applied.
    pub discount_pct: u8,

    /// Base amount after the tier discount.
    pub discounted_cents: Cents,

    /// Flex dollars deducted from the discounted amount.
    pub flex_applied_cents: Cents,

    /// Final amount charged; never negative.
    pub total_cents: Cents,
}

/// Round a trip duration up to billable minutes.
///
/// A 1-second trip bills a full minute; a zero or negative duration (clock
/// skew) still bills the 1-minute minimum.
#[must_use]
pub fn billable_minutes(duration: Duration) -> i64 {
    let secs = duration.num_seconds().max(0);
    let minutes = (secs as u64).div_ceil(60) as i64;
    minutes.max(1)
}

/// Compute the charge for a trip.
///
/// `flex_balance_cents` is the rider's current flex-dollar balance; the
/// returned [`TripCharge::flex_applied_cents`] never exceeds it.
#[must_use]
pub fn compute_charge(
    duration: Duration,
    class: BikeClass,
    pricing: &PricingConfig,
    discount_pct: u8,
    flex_balance_cents: Cents,
) -> TripCharge {
    let billed_minutes = billable_minutes(duration);
    let base_cents = billed_minutes * pricing.rate_for(class);

    // Integer percentage math, rounding the discounted amount down.
    let discount_pct = discount_pct.min(100);
    let discounted_cents = base_cents * (100 - Cents::from(discount_pct)) / 100;

    let flex_applied_cents = discounted_cents.min(flex_balance_cents.max(0));
    let total_cents = discounted_cents - flex_applied_cents;

    TripCharge {
        billed_minutes,
        base_cents,
        discount_pct,
        discounted_cents,
        flex_applied_cents,
        total_cents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pricing() -> PricingConfig {
        PricingConfig {
            standard_cents_per_minute: 15,
            ebike_cents_per_minute: 25,
        }
    }

    #[test]
    fn test_one_second_bills_a_full_minute() {
        assert_eq!(billable_minutes(Duration::seconds(1)), 1);
    }

    #[test]
    fn test_zero_duration_bills_minimum_minute() {
        assert_eq!(billable_minutes(Duration::zero()), 1);
        assert_eq!(billable_minutes(Duration::seconds(-30)), 1);
    }

    #[test]
    fn test_partial_minutes_round_up() {
        assert_eq!(billable_minutes(Duration::seconds(61)), 2);
        assert_eq!(billable_minutes(Duration::minutes(12)), 12);
        assert_eq!(billable_minutes(Duration::seconds(12 * 60 + 1)), 13);
    }

    #[test]
    fn test_twelve_minute_standard_trip() {
        let charge = compute_charge(
            Duration::minutes(12),
            BikeClass::Standard,
            &pricing(),
            0,
            0,
        );
        assert_eq!(charge.billed_minutes, 12);
        assert_eq!(charge.base_cents, 180);
        assert_eq!(charge.total_cents, 180);
    }

    #[test]
    fn test_discount_applies_before_flex_deduction() {
        // 10 minutes standard = 150; 10% discount -> 135; 50 flex -> 85.
        let charge = compute_charge(
            Duration::minutes(10),
            BikeClass::Standard,
            &pricing(),
            10,
            50,
        );
        assert_eq!(charge.discounted_cents, 135);
        assert_eq!(charge.flex_applied_cents, 50);
        assert_eq!(charge.total_cents, 85);
    }

    #[test]
    fn test_flex_deduction_floors_at_zero() {
        let charge = compute_charge(
            Duration::minutes(2),
            BikeClass::Standard,
            &pricing(),
            0,
            10_000,
        );
        assert_eq!(charge.flex_applied_cents, 30);
        assert_eq!(charge.total_cents, 0);
    }

    #[test]
    fn test_cost_is_monotonic_in_duration() {
        let mut last = 0;
        for minutes in 1..=120 {
            let charge = compute_charge(
                Duration::minutes(minutes),
                BikeClass::Standard,
                &pricing(),
                5,
                0,
            );
            assert!(charge.total_cents >= last, "minute {minutes} decreased");
            last = charge.total_cents;
        }
    }

    #[test]
    fn test_ebike_costs_more_than_standard() {
        for minutes in [1, 7, 30] {
            let standard =
                compute_charge(Duration::minutes(minutes), BikeClass::Standard, &pricing(), 0, 0);
            let ebike =
                compute_charge(Duration::minutes(minutes), BikeClass::EBike, &pricing(), 0, 0);
            assert!(ebike.total_cents > standard.total_cents);
        }
    }

    #[test]
    fn test_discount_rounds_down() {
        // 1 minute at 15 cents with 10% discount: 13.5 -> 13.
        let charge = compute_charge(
            Duration::minutes(1),
            BikeClass::Standard,
            &pricing(),
            10,
            0,
        );
        assert_eq!(charge.discounted_cents, 13);
    }

    #[test]
    fn test_negative_flex_balance_is_ignored() {
        let charge = compute_charge(
            Duration::minutes(1),
            BikeClass::Standard,
            &pricing(),
            0,
            -500,
        );
        assert_eq!(charge.flex_applied_cents, 0);
        assert_eq!(charge.total_cents, 15);
    }
}
