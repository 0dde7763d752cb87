//! Integer money arithmetic.
//!
//! Amounts are `i64` minor units (cents). Rates are basis points where
//! `RATE_SCALE` (10 000) is 100 %. Every division rounds half away from zero,
//! so a value exactly between two cents goes to the one further from zero.

use crate::error::{DomainError, DomainResult};

/// Money amount in minor currency units.
pub type Amount = i64;

/// Rate in basis points (1 bp = 0.01 %).
pub type RateBp = u32;

/// 100 % expressed in basis points.
pub const RATE_SCALE: i64 = 10_000;

/// Divide rounding half away from zero. `den` must be non-zero.
pub fn div_round(num: i128, den: i128) -> i128 {
    debug_assert!(den != 0);
    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
    let q = num / den;
    let r = num % den;
    if r.abs() * 2 >= den {
        if num >= 0 { q + 1 } else { q - 1 }
    } else {
        q
    }
}

fn narrow(value: i128, what: &str) -> DomainResult<Amount> {
    i64::try_from(value).map_err(|_| DomainError::overflow(what))
}

/// `amount × rate`, rounded.
pub fn apply_rate(amount: Amount, rate_bp: RateBp) -> DomainResult<Amount> {
    narrow(
        div_round(amount as i128 * rate_bp as i128, RATE_SCALE as i128),
        "rate application",
    )
}

/// Split a tax-inclusive amount into `(net, tax)`.
///
/// `net = amount / (1 + rate)` rounded; tax is the remainder so that
/// `net + tax == amount` always holds.
pub fn extract_inclusive_tax(amount: Amount, rate_bp: RateBp) -> DomainResult<(Amount, Amount)> {
    let net = narrow(
        div_round(
            amount as i128 * RATE_SCALE as i128,
            RATE_SCALE as i128 + rate_bp as i128,
        ),
        "inclusive tax extraction",
    )?;
    Ok((net, amount - net))
}

/// `amount × part / whole`, rounded. Zero when `whole` is zero.
pub fn prorate(amount: Amount, part: i64, whole: i64) -> DomainResult<Amount> {
    if whole == 0 {
        return Ok(0);
    }
    narrow(
        div_round(amount as i128 * part as i128, whole as i128),
        "proration",
    )
}

/// Multiply two integers with an overflow check.
pub fn checked_mul(a: i64, b: i64, what: &str) -> DomainResult<Amount> {
    a.checked_mul(b).ok_or_else(|| DomainError::overflow(what))
}

/// Sum with an overflow check.
pub fn checked_sum<I: IntoIterator<Item = Amount>>(values: I, what: &str) -> DomainResult<Amount> {
    values
        .into_iter()
        .try_fold(0i64, |acc, v| acc.checked_add(v))
        .ok_or_else(|| DomainError::overflow(what))
}

/// Distribute `amount` over `weights` proportionally (largest remainder).
///
/// The parts always sum to exactly `amount`. Leftover units go to the largest
/// fractional remainders, ties to the earliest index. Non-positive weights
/// receive nothing unless every weight is non-positive, in which case the
/// amount is spread evenly.
pub fn allocate(amount: Amount, weights: &[i64]) -> Vec<Amount> {
    if weights.is_empty() {
        return Vec::new();
    }

    let weights: Vec<i128> = if weights.iter().all(|w| *w <= 0) {
        vec![1; weights.len()]
    } else {
        weights.iter().map(|w| (*w).max(0) as i128).collect()
    };
    let total: i128 = weights.iter().sum();

    let sign: i128 = if amount < 0 { -1 } else { 1 };
    let magnitude = (amount as i128).abs();

    let mut parts = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    let mut assigned: i128 = 0;
    for (idx, w) in weights.iter().enumerate() {
        let exact = magnitude * w;
        let floor = exact / total;
        parts.push(floor);
        remainders.push((exact % total, idx));
        assigned += floor;
    }

    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    let mut leftover = magnitude - assigned;
    for (_, idx) in remainders {
        if leftover == 0 {
            break;
        }
        parts[idx] += 1;
        leftover -= 1;
    }

    parts.into_iter().map(|p| (p * sign) as i64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn div_round_goes_half_away_from_zero() {
        assert_eq!(div_round(5, 2), 3);
        assert_eq!(div_round(-5, 2), -3);
        assert_eq!(div_round(4, 3), 1);
        assert_eq!(div_round(-4, 3), -1);
        assert_eq!(div_round(7, -2), -4);
    }

    #[test]
    fn inclusive_tax_split_is_exact() {
        // 110.00 at 10 % contains 10.00 tax.
        assert_eq!(extract_inclusive_tax(11_000, 1_000).unwrap(), (10_000, 1_000));
        // 1.00 at 15 %: net 0.87, tax 0.13.
        assert_eq!(extract_inclusive_tax(100, 1_500).unwrap(), (87, 13));
    }

    #[test]
    fn allocate_spreads_leftover_cents_to_largest_remainders() {
        assert_eq!(allocate(100, &[1, 1, 1]), vec![34, 33, 33]);
        assert_eq!(allocate(-100, &[1, 1, 1]), vec![-34, -33, -33]);
        assert_eq!(allocate(10, &[0, 0]), vec![5, 5]);
        assert_eq!(allocate(10, &[3, 0, 1]), vec![8, 0, 2]);
    }

    #[test]
    fn prorate_handles_zero_whole() {
        assert_eq!(prorate(500, 1, 0).unwrap(), 0);
        assert_eq!(prorate(1_000, 1, 3).unwrap(), 333);
    }

    proptest! {
        #[test]
        fn allocate_always_sums_to_amount(
            amount in -1_000_000i64..1_000_000,
            weights in proptest::collection::vec(0i64..100_000, 1..12),
        ) {
            let parts = allocate(amount, &weights);
            prop_assert_eq!(parts.len(), weights.len());
            prop_assert_eq!(parts.iter().sum::<i64>(), amount);
        }

        #[test]
        fn inclusive_split_recombines(amount in 0i64..10_000_000, rate in 0u32..5_000) {
            let (net, tax) = extract_inclusive_tax(amount, rate).unwrap();
            prop_assert_eq!(net + tax, amount);
            prop_assert!(tax >= 0);
        }
    }
}
