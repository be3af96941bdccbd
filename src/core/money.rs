//! Fixed-point money helpers.
//!
//! Every derived amount in this crate passes through [`round2`] immediately
//! after it is computed, before it is added to anything else or persisted.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Amounts within this distance of zero are treated as settled / neutral.
pub const EPSILON: Decimal = dec!(0.01);

/// Human-readable description of the rounding policy, echoed in breakdown
/// metadata so consumers can detect a policy change.
pub const ROUNDING_POLICY: &str = "2dp, midpoint away from zero, applied per derived value";

/// Round to cents, half away from zero.
///
/// # Examples
///
/// ```
/// use league_settlement::core::money::round2;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(round2(dec!(10.005)), dec!(10.01));
/// assert_eq!(round2(dec!(-10.005)), dec!(-10.01));
/// assert_eq!(round2(dec!(3.14159)), dec!(3.14));
/// ```
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount × rate / 100`, rounded.
pub fn percent_of(amount: Decimal, rate: Decimal) -> Decimal {
    round2(amount * rate / Decimal::ONE_HUNDRED)
}

/// True if the amount carries no more than two decimal places.
pub fn has_cents_precision(amount: Decimal) -> bool {
    amount.normalize().scale() <= 2
}

/// Balance an entity ends the period with.
///
/// `previous_carry + weekly_result − ledger_net`, where ledger net is
/// `inbound − outbound`. This is the only place the formula lives; the
/// aggregator and the closer both call it.
pub fn current_balance(previous_carry: Decimal, weekly_result: Decimal, ledger_net: Decimal) -> Decimal {
    round2(previous_carry + weekly_result - ledger_net)
}

/// Whether an entity's balance is still open, from the operator's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Situation {
    /// The entity owes the operator.
    Receivable,
    /// The operator owes the entity.
    Payable,
    Settled,
}

impl Situation {
    pub fn from_balance(balance: Decimal) -> Self {
        if balance > EPSILON {
            Situation::Payable
        } else if balance < -EPSILON {
            Situation::Receivable
        } else {
            Situation::Settled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2_midpoint() {
        assert_eq!(round2(dec!(0.125)), dec!(0.13));
        assert_eq!(round2(dec!(-0.125)), dec!(-0.13));
        assert_eq!(round2(dec!(7)), dec!(7));
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(dec!(200), dec!(10)), dec!(20));
        assert_eq!(percent_of(dec!(33.33), dec!(15)), dec!(5.00));
        assert_eq!(percent_of(dec!(0), dec!(50)), Decimal::ZERO);
    }

    #[test]
    fn test_cents_precision() {
        assert!(has_cents_precision(dec!(1.10)));
        assert!(has_cents_precision(dec!(1.100)));
        assert!(!has_cents_precision(dec!(1.101)));
    }

    #[test]
    fn test_current_balance_pins_ledger_sign() {
        // carry 1000, lost 200 this week, 300 net recorded in
        assert_eq!(
            current_balance(dec!(1000.00), dec!(-200.00), dec!(300.00)),
            dec!(500.00)
        );
    }

    #[test]
    fn test_situation_epsilon() {
        assert_eq!(Situation::from_balance(dec!(0.01)), Situation::Settled);
        assert_eq!(Situation::from_balance(dec!(-0.01)), Situation::Settled);
        assert_eq!(Situation::from_balance(dec!(0.02)), Situation::Payable);
        assert_eq!(Situation::from_balance(dec!(-0.02)), Situation::Receivable);
    }
}
