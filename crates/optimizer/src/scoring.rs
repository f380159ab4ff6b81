//! Sub-score and composite computation for strategy analysis.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Composite at or above this is a recommendation, on the 0-10000 scale.
pub const RECOMMEND_THRESHOLD: u32 = 6000;

/// Per-strategy scoring snapshot produced by an analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyScore {
    pub strategy: String,
    /// All-in cost, 0-10000 bps (lower is better)
    pub cost_score: u32,
    /// Self-reported risk, 0-100 (lower is better)
    pub risk_score: u32,
    /// Free headroom vs target, 0-100
    pub liquidity_score: u32,
    /// Historical success rate, 0-100
    pub reliability_score: u32,
    /// Total capacity vs target, 0-100
    pub capacity_score: u32,
    /// Weighted composite, 0-10000
    pub total_score: u32,
    pub recommended: bool,
    pub reasoning: String,
}

impl StrategyScore {
    /// Score for a strategy that could not be probed. Never recommended.
    #[must_use]
    pub fn unresponsive(strategy: &str, reason: &str) -> Self {
        Self {
            strategy: strategy.to_string(),
            cost_score: 10_000,
            risk_score: 100,
            liquidity_score: 0,
            reliability_score: 0,
            capacity_score: 0,
            total_score: 0,
            recommended: false,
            reasoning: format!("unresponsive: {reason}"),
        }
    }
}

/// Step function of an available-vs-target ratio.
///
/// Breakpoints at 2x / 1x / 0.5x / 0.25x of target map to
/// 100 / 75 / 50 / 25, anything below to 0. A zero target scores 100.
#[must_use]
pub fn step_score(available: Decimal, target: Decimal) -> u32 {
    if target <= Decimal::ZERO {
        return 100;
    }
    let available = available.max(Decimal::ZERO);
    if available >= target * Decimal::TWO {
        100
    } else if available >= target {
        75
    } else if available * Decimal::TWO >= target {
        50
    } else if available * Decimal::from(4u32) >= target {
        25
    } else {
        0
    }
}

/// Weighted composite on 0-10000:
/// 40% cost (inverted), 20% risk (inverted), 15% liquidity,
/// 15% reliability, 10% capacity.
#[must_use]
pub fn composite(cost: u32, risk: u32, liquidity: u32, reliability: u32, capacity: u32) -> u32 {
    let cost = cost.min(10_000);
    let risk = risk.min(100);
    40 * (10_000 - cost) / 100
        + 20 * (100 - risk)
        + 15 * liquidity.min(100)
        + 15 * reliability.min(100)
        + 10 * capacity.min(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn step_breakpoints() {
        let target = dec!(100);
        assert_eq!(step_score(dec!(200), target), 100);
        assert_eq!(step_score(dec!(150), target), 75);
        assert_eq!(step_score(dec!(100), target), 75);
        assert_eq!(step_score(dec!(60), target), 50);
        assert_eq!(step_score(dec!(50), target), 50);
        assert_eq!(step_score(dec!(30), target), 25);
        assert_eq!(step_score(dec!(25), target), 25);
        assert_eq!(step_score(dec!(10), target), 0);
        assert_eq!(step_score(dec!(-5), target), 0);
    }

    #[test]
    fn zero_target_is_always_satisfied() {
        assert_eq!(step_score(dec!(0), dec!(0)), 100);
    }

    #[test]
    fn perfect_strategy_scores_full_marks() {
        assert_eq!(composite(0, 0, 100, 100, 100), 10_000);
    }

    #[test]
    fn worst_strategy_scores_zero() {
        assert_eq!(composite(10_000, 100, 0, 0, 0), 0);
    }

    #[test]
    fn composite_clamps_out_of_range_inputs() {
        assert_eq!(composite(20_000, 300, 250, 250, 250), composite(10_000, 100, 100, 100, 100));
    }
}
