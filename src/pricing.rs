use crate::config::{gamma, NEUTRAL_QUOTE};
use crate::types::Quote;

/// Compute the payout multipliers for a market from the aggregate PLACED
/// stake on each side.
///
/// The quote shades against the heavier side: `quote_a = 2 − γ(a − b)/total`,
/// `quote_b = 4 − quote_a`. γ steps up with the heavier side's volume so a
/// handful of early coins can't swing the market. Callers must pass the live
/// aggregate; a stale one breaks the locked-odd accounting downstream.
pub fn price(stake_a: i64, stake_b: i64) -> Quote {
    let total = stake_a + stake_b;
    if total == 0 {
        return Quote { a: NEUTRAL_QUOTE, b: NEUTRAL_QUOTE };
    }

    let g = sensitivity(stake_a.max(stake_b));
    let a = 2.0 - g * (stake_a - stake_b) as f64 / total as f64;
    Quote { a, b: 4.0 - a }
}

/// γ tier for the heavier side's stake.
fn sensitivity(max_stake: i64) -> f64 {
    if max_stake >= gamma::HIGH_STAKE {
        gamma::HIGH
    } else if max_stake >= gamma::MID_STAKE {
        gamma::MID
    } else {
        gamma::LOW
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn zero_volume_is_neutral() {
        let q = price(0, 0);
        assert!((q.a - 2.0).abs() < TOL);
        assert!((q.b - 2.0).abs() < TOL);
    }

    #[test]
    fn equal_stakes_stay_neutral_at_any_volume() {
        for v in [1, 49, 50, 100, 5000] {
            let q = price(v, v);
            assert!((q.a - 2.0).abs() < TOL, "stake {v}: quote_a={}", q.a);
            assert!((q.b - 2.0).abs() < TOL, "stake {v}: quote_b={}", q.b);
        }
    }

    #[test]
    fn quotes_always_sum_to_four() {
        let cases = [(0, 0), (1, 0), (0, 1), (60, 0), (60, 40), (150, 3), (7, 1000)];
        for (a, b) in cases {
            let q = price(a, b);
            assert!((q.a + q.b - 4.0).abs() < TOL, "({a},{b}): {}+{}", q.a, q.b);
        }
    }

    #[test]
    fn heavier_side_pays_less() {
        let q = price(80, 20);
        assert!(q.a < 2.0);
        assert!(q.b > 2.0);
    }

    #[test]
    fn sensitivity_tiers() {
        // Below 50 on both sides: γ = 0.1.
        let q = price(40, 0);
        assert!((q.a - 1.9).abs() < TOL);

        // Heavier side in [50, 100): γ = 0.2.
        let q = price(60, 0);
        assert!((q.a - 1.8).abs() < TOL);

        // Heavier side ≥ 100: γ = 0.3.
        let q = price(100, 0);
        assert!((q.a - 1.7).abs() < TOL);
    }

    #[test]
    fn worked_example_two_bettors() {
        // 60 on A alone: γ=0.2, quote_a = 2 − 0.2·60/60 = 1.8.
        let q = price(60, 0);
        assert!((q.a - 1.8).abs() < TOL);
        assert!((q.b - 2.2).abs() < TOL);

        // Then 40 lands on B: γ still 0.2 (max 60 < 100),
        // quote_a = 2 − 0.2·20/100 = 1.96.
        let q = price(60, 40);
        assert!((q.a - 1.96).abs() < TOL);
        assert!((q.b - 2.04).abs() < TOL);
    }
}
