use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the allocation engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocConfig {
    #[serde(default)]
    pub bundle: BundleConfig,
    #[serde(default)]
    pub risk: RiskParameters,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

/// Intervals gating the bundle's periodic work. Measured against a
/// monotonic clock; zero disables the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    #[serde(default = "default_optimization_interval")]
    pub optimization_interval_secs: u64,
    #[serde(default = "default_rebalance_interval")]
    pub rebalance_interval_secs: u64,
    /// Horizon handed to the optimizer when the bundle triggers a pass
    #[serde(default = "default_time_horizon")]
    pub time_horizon_secs: u64,
}

/// Risk limits owned by the bundle. Mutated only through the admin
/// surface or by emergency-exit logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParameters {
    /// Maximum aggregate leverage, 100 = 1x
    #[serde(default = "default_max_total_leverage")]
    pub max_total_leverage: u32,
    #[serde(default = "default_max_strategy_count")]
    pub max_strategy_count: usize,
    /// Deviation from target that marks a slot for rebalancing, in bps
    #[serde(default = "default_rebalance_threshold")]
    pub rebalance_threshold_bps: u32,
    /// Deviation that qualifies as an emergency, in bps
    #[serde(default = "default_emergency_threshold")]
    pub emergency_threshold_bps: u32,
    #[serde(default = "default_max_slippage")]
    pub max_slippage_bps: u32,
    /// Floor on deployed-vs-idle capital ratio, in bps
    #[serde(default = "default_min_capital_efficiency")]
    pub min_capital_efficiency_bps: u32,
    /// Once set, ordinary capital movement is blocked until cleared
    #[serde(default)]
    pub circuit_breaker: bool,
}

/// Cost-benefit thresholds for the strategy optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Minimum expected saving for a rebalance to be worth doing, in bps
    #[serde(default = "default_min_saving")]
    pub min_saving_bps: i64,
    /// Ceiling on estimated implementation cost, in gas units
    #[serde(default = "default_max_implementation_cost")]
    pub max_implementation_cost: Decimal,
    #[serde(default = "default_base_gas")]
    pub base_gas: Decimal,
    #[serde(default = "default_per_switch_gas")]
    pub per_switch_gas: Decimal,
    /// Baseline cost the proposal is compared against, in bps (5%)
    #[serde(default = "default_baseline_cost")]
    pub baseline_cost_bps: u32,
    /// Baseline risk the proposal is compared against, 0-100
    #[serde(default = "default_baseline_risk")]
    pub baseline_risk: u32,
    /// Entries kept per strategy in the performance ledger
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Slippage bound stamped on emitted rebalance instructions, in bps
    #[serde(default = "default_max_slippage")]
    pub max_slippage_bps: u32,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            optimization_interval_secs: default_optimization_interval(),
            rebalance_interval_secs: default_rebalance_interval(),
            time_horizon_secs: default_time_horizon(),
        }
    }
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            max_total_leverage: default_max_total_leverage(),
            max_strategy_count: default_max_strategy_count(),
            rebalance_threshold_bps: default_rebalance_threshold(),
            emergency_threshold_bps: default_emergency_threshold(),
            max_slippage_bps: default_max_slippage(),
            min_capital_efficiency_bps: default_min_capital_efficiency(),
            circuit_breaker: false,
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            min_saving_bps: default_min_saving(),
            max_implementation_cost: default_max_implementation_cost(),
            base_gas: default_base_gas(),
            per_switch_gas: default_per_switch_gas(),
            baseline_cost_bps: default_baseline_cost(),
            baseline_risk: default_baseline_risk(),
            history_capacity: default_history_capacity(),
            max_slippage_bps: default_max_slippage(),
        }
    }
}

const fn default_optimization_interval() -> u64 {
    3600 // hourly
}

const fn default_rebalance_interval() -> u64 {
    21_600 // 6 hours
}

const fn default_time_horizon() -> u64 {
    86_400 // 1 day
}

const fn default_max_total_leverage() -> u32 {
    300 // 3x
}

const fn default_max_strategy_count() -> usize {
    8
}

const fn default_rebalance_threshold() -> u32 {
    500 // 5%
}

const fn default_emergency_threshold() -> u32 {
    2000 // 20%
}

const fn default_max_slippage() -> u32 {
    100 // 1%
}

const fn default_min_capital_efficiency() -> u32 {
    8000 // 80%
}

const fn default_min_saving() -> i64 {
    50 // 0.5%
}

fn default_max_implementation_cost() -> Decimal {
    Decimal::from(1_000_000u32)
}

fn default_base_gas() -> Decimal {
    Decimal::from(150_000u32)
}

fn default_per_switch_gas() -> Decimal {
    Decimal::from(80_000u32)
}

const fn default_baseline_cost() -> u32 {
    500 // 5%
}

const fn default_baseline_risk() -> u32 {
    50
}

const fn default_history_capacity() -> usize {
    100
}
