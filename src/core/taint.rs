//! Fixed-point taint arithmetic
//!
//! Taint values are `Decimal`s truncated toward zero at 18 places, so a
//! parent's split never sums above what it had to give.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::errors::{AppError, AppResult};

/// Decimal places kept on every taint value
pub const TAINT_SCALE: u32 = 18;

/// Truncate to `TAINT_SCALE` places, toward zero
#[inline]
pub fn truncate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(TAINT_SCALE, RoundingStrategy::ToZero)
}

/// Taint available for one category after decay: `trunc(taint × decay)`
pub fn budget(taint: Decimal, decay: Decimal) -> AppResult<Decimal> {
    taint
        .checked_mul(decay)
        .map(truncate)
        .ok_or_else(|| AppError::invariant(format!("taint overflow: {} × {}", taint, decay)))
}

/// Proportional split of `budget` over leg values: `trunc(budget × v / V)`.
///
/// Non-positive legs get zero. If truncation still leaves the shares above
/// the budget, the excess comes off the largest share; a remaining
/// violation is an invariant error.
pub fn split(budget: Decimal, values: &[Decimal]) -> AppResult<Vec<Decimal>> {
    let total: Decimal = values
        .iter()
        .filter(|v| v.is_sign_positive() && !v.is_zero())
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
        .ok_or_else(|| AppError::invariant("category value overflow"))?;

    if total.is_zero() || budget.is_zero() {
        return Ok(vec![Decimal::ZERO; values.len()]);
    }

    let mut shares = Vec::with_capacity(values.len());
    for v in values {
        if !v.is_sign_positive() || v.is_zero() {
            shares.push(Decimal::ZERO);
            continue;
        }
        let share = v
            .checked_div(total)
            .and_then(|ratio| ratio.checked_mul(budget))
            .map(truncate)
            .ok_or_else(|| AppError::invariant(format!("taint split overflow: {}/{}", v, total)))?;
        shares.push(share);
    }

    enforce_budget(budget, &mut shares)?;
    Ok(shares)
}

/// Trim shares so they never sum above `budget`
fn enforce_budget(budget: Decimal, shares: &mut [Decimal]) -> AppResult<()> {
    let sum: Decimal = shares.iter().copied().sum();
    if sum <= budget {
        return Ok(());
    }

    let excess = sum - budget;
    if let Some(largest) = shares.iter_mut().max_by(|a, b| a.cmp(b)) {
        *largest -= excess;
    }

    let sum: Decimal = shares.iter().copied().sum();
    if sum > budget || shares.iter().any(|s| s.is_sign_negative() && !s.is_zero()) {
        return Err(AppError::invariant(format!(
            "split of {} sums to {}",
            budget, sum
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_truncate_toward_zero() {
        let v = dec!(0.3333333333333333333333333333);
        assert_eq!(truncate(v), dec!(0.333333333333333333));
        assert_eq!(truncate(dec!(0.9999999999999999999999)), dec!(0.999999999999999999));
    }

    #[test]
    fn test_budget() {
        assert_eq!(budget(dec!(1), dec!(0.95)).unwrap(), dec!(0.95));
        assert_eq!(budget(dec!(0.5), dec!(1)).unwrap(), dec!(0.5));
    }

    #[test]
    fn test_even_split() {
        let shares = split(dec!(1), &[dec!(0.5), dec!(0.5)]).unwrap();
        assert_eq!(shares, vec![dec!(0.5), dec!(0.5)]);
    }

    #[test]
    fn test_sixty_forty_split() {
        let shares = split(dec!(1), &[dec!(600), dec!(400)]).unwrap();
        assert_eq!(shares, vec![dec!(0.6), dec!(0.4)]);
    }

    #[test]
    fn test_thirds_never_exceed_budget() {
        let shares = split(dec!(1), &[dec!(1), dec!(1), dec!(1)]).unwrap();
        let sum: Decimal = shares.iter().copied().sum();
        assert!(sum <= dec!(1));
        assert_eq!(shares[0], dec!(0.333333333333333333));
    }

    #[test]
    fn test_zero_total_yields_zero_shares() {
        let shares = split(dec!(1), &[Decimal::ZERO, Decimal::ZERO]).unwrap();
        assert!(shares.iter().all(|s| s.is_zero()));
    }

    #[test]
    fn test_non_positive_legs_get_nothing() {
        let shares = split(dec!(1), &[dec!(-5), dec!(5)]).unwrap();
        assert_eq!(shares, vec![Decimal::ZERO, dec!(1)]);
    }

    #[test]
    fn test_large_values_do_not_overflow() {
        let big = dec!(30000000000000000000000000000);
        let shares = split(dec!(0.9), &[big, big]).unwrap();
        assert_eq!(shares, vec![dec!(0.45), dec!(0.45)]);
    }

    #[test]
    fn test_enforce_budget_trims_largest() {
        let mut shares = vec![dec!(0.6), dec!(0.5)];
        enforce_budget(dec!(1), &mut shares).unwrap();
        assert_eq!(shares, vec![dec!(0.5), dec!(0.5)]);
    }
}
