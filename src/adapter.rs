//! Adapter layer: converts between the simulation's f64 world and the
//! ledger's exact `Decimal` money.

use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// Convert f64 to Decimal (lossy but sufficient for simulation).
pub fn to_decimal(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or(Decimal::ZERO)
}

/// Convert Decimal to f64.
pub fn from_decimal(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Half of a purchase price rounded down to whole currency, the deletion refund.
pub fn half_refund(cost: f64) -> Decimal {
    (to_decimal(cost) / Decimal::TWO).round_dp_with_strategy(0, RoundingStrategy::ToNegativeInfinity)
}

/// Round for display in snapshots (cents).
pub fn to_display(d: Decimal) -> f64 {
    from_decimal(d.round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round_trip_exact_values() {
        assert_eq!(to_decimal(1.5), dec!(1.5));
        assert_eq!(from_decimal(dec!(-1000)), -1000.0);
    }

    #[test]
    fn non_finite_maps_to_zero() {
        assert_eq!(to_decimal(f64::NAN), Decimal::ZERO);
    }

    #[test]
    fn refund_floors_half_cost() {
        assert_eq!(half_refund(25.0), dec!(12));
        assert_eq!(half_refund(200.0), dec!(100));
    }
}
