use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Notifications emitted by the allocation bundle.
///
/// Broadcast over a `tokio::sync::broadcast` channel; emission is
/// fire-and-forget and a missing subscriber is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AllocationEvent {
    /// Exposure strategy registered
    StrategyAdded {
        name: String,
        target_bps: u32,
        primary: bool,
    },

    /// Exposure strategy deregistered after a best-effort exit
    StrategyRemoved { name: String, recovered: Decimal },

    /// A slot's target weight changed (optimizer pass or admin)
    AllocationUpdated { name: String, target_bps: u32 },

    /// Yield bundle composition replaced
    YieldBundleUpdated { strategies: usize },

    /// Optimization pass completed
    OptimizationPerformed {
        expected_saving_bps: i64,
        implementation_cost: Decimal,
        at: DateTime<Utc>,
    },

    /// Rebalance bookkeeping pass completed
    RebalanceExecuted {
        strategies_rebalanced: usize,
        value_moved: Decimal,
    },

    /// Emergency exit ran
    EmergencyAction { recovered: Decimal },

    RiskParametersUpdated,

    CircuitBreakerActivated,

    /// Deposit processed (realized split may be below requested)
    CapitalAllocated {
        requested: Decimal,
        exposure_placed: Decimal,
        yield_placed: Decimal,
    },

    /// Withdrawal processed
    CapitalWithdrawn {
        requested: Decimal,
        realized: Decimal,
    },

    YieldHarvested { amount: Decimal },
}
