use cap_alloc_core::traits::{ExposureStrategy, YieldStrategy};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Minimum target weight a primary strategy keeps, in bps.
pub const PRIMARY_MIN_BPS: u32 = 1000;

/// Registry entry for one exposure strategy.
#[derive(Clone)]
pub struct ExposureSlot {
    pub strategy: Arc<dyn ExposureStrategy>,
    pub name: String,
    /// Target weight in bps of the exposure portion
    pub target_bps: u32,
    /// Capital currently placed through this strategy
    pub current_allocation: Decimal,
    pub max_bps: u32,
    pub min_bps: u32,
    pub is_primary: bool,
    pub active: bool,
    pub last_rebalance: Option<DateTime<Utc>>,
    /// Cumulative capital ever placed through this strategy
    pub total_allocated: Decimal,
}

/// The singleton yield-side registry: parallel strategy/fraction lists.
#[derive(Clone, Default)]
pub struct YieldBundle {
    pub strategies: Vec<Arc<dyn YieldStrategy>>,
    /// Must sum to exactly 10000 when non-empty
    pub fractions_bps: Vec<u32>,
    /// Aggregate capital deposited across the bundle
    pub total_capital: Decimal,
    /// 100 = 1x
    pub current_leverage: u32,
    pub max_leverage: u32,
    pub active: bool,
}

/// Serializable snapshot of one slot, for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotStatus {
    pub name: String,
    pub target_bps: u32,
    pub min_bps: u32,
    pub max_bps: u32,
    pub current_allocation: Decimal,
    pub is_primary: bool,
    pub active: bool,
    pub last_rebalance: Option<DateTime<Utc>>,
}

/// Serializable snapshot of the bundle's persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleStatus {
    pub total_allocated_capital: Decimal,
    pub idle_capital: Decimal,
    pub circuit_breaker: bool,
    pub yield_capital: Decimal,
    pub strategies: Vec<SlotStatus>,
}

impl ExposureSlot {
    pub(crate) fn status(&self) -> SlotStatus {
        SlotStatus {
            name: self.name.clone(),
            target_bps: self.target_bps,
            min_bps: self.min_bps,
            max_bps: self.max_bps,
            current_allocation: self.current_allocation,
            is_primary: self.is_primary,
            active: self.active,
            last_rebalance: self.last_rebalance,
        }
    }
}
