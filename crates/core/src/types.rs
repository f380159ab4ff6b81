use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Mechanism through which an exposure strategy gains synthetic price
/// exposure to its underlying asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExposureKind {
    /// Leveraged derivative position (perpetual future or similar)
    Perpetual,
    /// Swap-based total-return agreement
    TotalReturnSwap,
    /// Direct token holding
    SpotToken,
}

/// Self-reported position snapshot of an exposure strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureInfo {
    pub kind: ExposureKind,
    /// Symbol of the underlying asset (e.g. "BTC")
    pub underlying: String,
    /// Leverage ratio, 100 = 1x
    pub leverage: u32,
    /// Collateral backing the exposure, as basis points of notional
    /// (10000 = fully collateralized)
    pub collateral_ratio_bps: u32,
    /// Notional exposure currently held, in quote units
    pub current_exposure: Decimal,
    /// Maximum notional the strategy can absorb
    pub max_capacity: Decimal,
    /// Current running cost in basis points per year
    pub current_cost_bps: u32,
    /// Self-assessed risk, 0 (safest) to 100
    pub risk_score: u32,
    pub is_active: bool,
    /// Price at which the position would be liquidated, if applicable
    pub liquidation_price: Option<Decimal>,
}

/// Itemized running costs of holding exposure through a strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Funding rate paid (positive) or earned (negative), in bps
    pub funding_rate_bps: i64,
    pub borrow_rate_bps: u32,
    pub management_fee_bps: u32,
    pub slippage_cost_bps: u32,
    /// Fixed execution cost per position change, in quote units
    pub gas_cost: Decimal,
    /// All-in cost in basis points, 0-10000
    pub total_cost_bps: u32,
}

impl ExposureInfo {
    /// Collateral currently backing the exposure, in quote units.
    #[must_use]
    pub fn collateral(&self) -> Decimal {
        self.current_exposure * Decimal::from(self.collateral_ratio_bps) / Decimal::from(10_000u32)
    }

    /// Free capacity left before the strategy is full.
    #[must_use]
    pub fn headroom(&self) -> Decimal {
        (self.max_capacity - self.current_exposure).max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn info(exposure: Decimal, collateral_ratio_bps: u32) -> ExposureInfo {
        ExposureInfo {
            kind: ExposureKind::Perpetual,
            underlying: "BTC".to_string(),
            leverage: 100,
            collateral_ratio_bps,
            current_exposure: exposure,
            max_capacity: dec!(1000),
            current_cost_bps: 0,
            risk_score: 0,
            is_active: true,
            liquidation_price: None,
        }
    }

    #[test]
    fn collateral_scales_with_ratio() {
        // Half-collateralized 1000 notional backs 500
        assert_eq!(info(dec!(1000), 5000).collateral(), dec!(500));
        assert_eq!(info(dec!(1000), 10000).collateral(), dec!(1000));
    }

    #[test]
    fn headroom_never_negative() {
        let mut i = info(dec!(1500), 10000);
        assert_eq!(i.headroom(), Decimal::ZERO);
        i.current_exposure = dec!(400);
        assert_eq!(i.headroom(), dec!(600));
    }
}
