use crate::history::{PerformanceHistory, PerformanceRecord};
use crate::scoring::{composite, step_score, StrategyScore, RECOMMEND_THRESHOLD};
use cap_alloc_core::config::OptimizerConfig;
use cap_alloc_core::guard::contained;
use cap_alloc_core::traits::{ExposureStrategy, PriceOracle};
use cap_alloc_core::types::ExposureInfo;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Results
// =============================================================================

/// One suggested capital movement between strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceInstruction {
    /// Strategy shedding capital, when decreasing
    pub from_strategy: Option<String>,
    /// Strategy receiving capital, when increasing
    pub to_strategy: Option<String>,
    pub amount: Decimal,
    /// 1 = emergency, 2 = increase toward cheaper, 3 = decrease
    pub priority: u8,
    pub max_slippage_bps: u32,
    pub emergency: bool,
    pub reasoning: String,
}

/// Outcome of a full optimization pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub scores: Vec<StrategyScore>,
    /// Recommended target weights in bps, parallel to the input strategies
    pub recommended_allocation: Vec<u32>,
    /// Expected cost saving vs the baseline, in bps (negative = worse)
    pub expected_saving_bps: i64,
    /// Expected risk reduction vs the baseline (negative = riskier)
    pub expected_risk_reduction: i64,
    /// Estimated execution cost of applying the proposal, in gas units
    pub implementation_cost: Decimal,
    /// True when the saving clears the minimum and the cost clears the ceiling
    pub should_rebalance: bool,
    /// Share of strategies that responded to probing, 0-100
    pub confidence: u32,
    pub instructions: Vec<RebalanceInstruction>,
    pub time_horizon_secs: u64,
}

// =============================================================================
// Optimizer
// =============================================================================

/// Stateless scoring engine over live strategy reads plus a bounded
/// per-strategy performance ledger (the only state it owns).
pub struct StrategyOptimizer {
    config: OptimizerConfig,
    oracle: Option<Arc<dyn PriceOracle>>,
    history: HashMap<String, PerformanceHistory>,
}

impl StrategyOptimizer {
    #[must_use]
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            oracle: None,
            history: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_oracle(config: OptimizerConfig, oracle: Arc<dyn PriceOracle>) -> Self {
        Self {
            config,
            oracle: Some(oracle),
            history: HashMap::new(),
        }
    }

    /// Scores each strategy against the target exposure.
    ///
    /// Probing is failure-contained: an unresponsive or malformed strategy
    /// scores not-recommended with an explanatory reason instead of
    /// aborting the batch.
    pub async fn analyze_strategies(
        &self,
        strategies: &[Arc<dyn ExposureStrategy>],
        target_exposure: Decimal,
    ) -> Vec<StrategyScore> {
        self.analyze_with_info(strategies, target_exposure).await.0
    }

    async fn analyze_with_info(
        &self,
        strategies: &[Arc<dyn ExposureStrategy>],
        target_exposure: Decimal,
    ) -> (Vec<StrategyScore>, Vec<Option<ExposureInfo>>) {
        let mut scores = Vec::with_capacity(strategies.len());
        let mut infos = Vec::with_capacity(strategies.len());

        for strategy in strategies {
            let name = strategy.name();
            let info = contained(name, "exposure_info", strategy.exposure_info()).await;
            let costs = contained(name, "cost_breakdown", strategy.cost_breakdown()).await;

            let score = match (&info, costs) {
                (Some(info), Some(costs)) => {
                    let cost = costs.total_cost_bps.min(10_000);
                    let risk = info.risk_score.min(100);
                    let liquidity = step_score(info.headroom(), target_exposure);
                    let capacity = step_score(info.max_capacity, target_exposure);
                    let reliability = self
                        .history
                        .get(name)
                        .and_then(PerformanceHistory::success_rate)
                        .unwrap_or(50);
                    let total = composite(cost, risk, liquidity, reliability, capacity);
                    let recommended = total >= RECOMMEND_THRESHOLD;

                    let mut reasoning = format!(
                        "cost {} bps, risk {}, liquidity {}, reliability {}, capacity {}",
                        cost, risk, liquidity, reliability, capacity
                    );
                    if !info.is_active {
                        reasoning.push_str("; inactive");
                    }

                    StrategyScore {
                        strategy: name.to_string(),
                        cost_score: cost,
                        risk_score: risk,
                        liquidity_score: liquidity,
                        reliability_score: reliability,
                        capacity_score: capacity,
                        total_score: total,
                        recommended,
                        reasoning,
                    }
                }
                _ => StrategyScore::unresponsive(name, "probe returned no usable data"),
            };

            scores.push(score);
            infos.push(info);
        }

        (scores, infos)
    }

    /// Derives a recommended allocation vector and estimates whether
    /// applying it is worth its execution cost.
    ///
    /// Weight goes to recommended strategies inversely proportional to
    /// their cost; unrecommended strategies get zero. The vector always
    /// sums to exactly 10000 bps when anything is recommended.
    pub async fn calculate_optimal_allocation(
        &self,
        strategies: &[Arc<dyn ExposureStrategy>],
        current: &[u32],
        target_exposure: Decimal,
        time_horizon_secs: u64,
    ) -> OptimizationResult {
        let (scores, infos) = self.analyze_with_info(strategies, target_exposure).await;

        let recommended_allocation = derive_allocation(&scores);

        // Weighted-average cost/risk of the proposal vs fixed baselines.
        let mut weighted_cost = 0i64;
        let mut weighted_risk = 0i64;
        for (score, alloc) in scores.iter().zip(&recommended_allocation) {
            weighted_cost += i64::from(score.cost_score) * i64::from(*alloc);
            weighted_risk += i64::from(score.risk_score) * i64::from(*alloc);
        }
        let allocated: i64 = recommended_allocation.iter().map(|a| i64::from(*a)).sum();
        let (expected_saving_bps, expected_risk_reduction) = if allocated > 0 {
            (
                i64::from(self.config.baseline_cost_bps) - weighted_cost / allocated,
                i64::from(self.config.baseline_risk) - weighted_risk / allocated,
            )
        } else {
            (0, 0)
        };

        let implementation_cost = self.config.base_gas
            + Decimal::from(strategies.len()) * self.config.per_switch_gas;

        let should_rebalance = expected_saving_bps > self.config.min_saving_bps
            && implementation_cost < self.config.max_implementation_cost;

        let confidence = self.confidence(&infos).await;

        let instructions = self.instructions_from(
            &scores,
            &infos,
            current,
            &recommended_allocation,
            target_exposure,
        );

        debug!(
            "Optimization pass: saving {} bps, cost {}, rebalance {}",
            expected_saving_bps, implementation_cost, should_rebalance
        );

        OptimizationResult {
            scores,
            recommended_allocation,
            expected_saving_bps,
            expected_risk_reduction,
            implementation_cost,
            should_rebalance,
            confidence,
            instructions,
            time_horizon_secs,
        }
    }

    /// True when the current and optimal vectors differ anywhere.
    #[must_use]
    pub fn should_rebalance(&self, current: &[u32], optimal: &[u32]) -> bool {
        current.len() != optimal.len() || current.iter().zip(optimal).any(|(c, o)| c != o)
    }

    /// Emits instructions only for strategies whose current and optimal
    /// weights differ.
    pub async fn rebalance_instructions(
        &self,
        strategies: &[Arc<dyn ExposureStrategy>],
        current: &[u32],
        optimal: &[u32],
        target_exposure: Decimal,
    ) -> Vec<RebalanceInstruction> {
        let (scores, infos) = self.analyze_with_info(strategies, target_exposure).await;
        self.instructions_from(&scores, &infos, current, optimal, target_exposure)
    }

    fn instructions_from(
        &self,
        scores: &[StrategyScore],
        infos: &[Option<ExposureInfo>],
        current: &[u32],
        optimal: &[u32],
        target_exposure: Decimal,
    ) -> Vec<RebalanceInstruction> {
        let mut instructions = Vec::new();

        for (i, score) in scores.iter().enumerate() {
            let cur = current.get(i).copied().unwrap_or(0);
            let opt = optimal.get(i).copied().unwrap_or(0);
            if cur == opt {
                continue;
            }

            let emergency = match infos.get(i).and_then(Option::as_ref) {
                None => true,
                Some(info) => !info.is_active || info.risk_score > 90,
            };
            let increasing = opt > cur;
            let priority = if emergency {
                1
            } else if increasing {
                2
            } else {
                3
            };
            let diff = cur.abs_diff(opt);
            let amount = target_exposure * Decimal::from(diff) / Decimal::from(10_000u32);

            let reasoning = if emergency {
                format!("{} in emergency state, unwinding", score.strategy)
            } else if increasing {
                format!(
                    "{} underweight by {} bps at cost {} bps",
                    score.strategy, diff, score.cost_score
                )
            } else {
                format!("{} overweight by {} bps", score.strategy, diff)
            };

            instructions.push(RebalanceInstruction {
                from_strategy: (!increasing).then(|| score.strategy.clone()),
                to_strategy: increasing.then(|| score.strategy.clone()),
                amount,
                priority,
                max_slippage_bps: self.config.max_slippage_bps,
                emergency,
                reasoning,
            });
        }

        instructions.sort_by_key(|instruction| instruction.priority);
        instructions
    }

    /// Confidence is the share of responsive strategies, capped at 50 when
    /// no oracle is configured or the oracle read fails.
    async fn confidence(&self, infos: &[Option<ExposureInfo>]) -> u32 {
        if infos.is_empty() {
            return 0;
        }
        let responsive = infos.iter().filter(|info| info.is_some()).count();
        let base = u32::try_from(responsive * 100 / infos.len()).unwrap_or(100);

        let oracle_ok = match (&self.oracle, infos.iter().flatten().next()) {
            (Some(oracle), Some(info)) => {
                contained("oracle", "price", oracle.price(&info.underlying))
                    .await
                    .is_some()
            }
            _ => false,
        };

        if oracle_ok {
            base
        } else {
            base.min(50)
        }
    }

    /// Appends an observation to the strategy's bounded history; the
    /// oldest entry is evicted once the buffer holds 100.
    pub fn record_performance(&mut self, strategy: &str, record: PerformanceRecord) {
        let capacity = self.config.history_capacity;
        self.history
            .entry(strategy.to_string())
            .or_insert_with(|| PerformanceHistory::new(capacity))
            .push(record);
    }

    /// Refreshes the strategy's assessed-risk overlay and stamps a
    /// history entry so risk reviews count toward the window.
    pub fn update_risk_assessment(&mut self, strategy: &str, risk_score: u32) {
        let capacity = self.config.history_capacity;
        self.history
            .entry(strategy.to_string())
            .or_insert_with(|| PerformanceHistory::new(capacity))
            .set_assessed_risk(risk_score);
        debug!("Risk assessment for {} updated to {}", strategy, risk_score);
    }

    #[must_use]
    pub fn history(&self, strategy: &str) -> Option<&PerformanceHistory> {
        self.history.get(strategy)
    }

    #[must_use]
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

/// Weight recommended strategies inversely proportional to cost:
/// `10000 - cost` normalized to a 10000 bps total, rounding remainder to
/// the first recommended strategy. Equal split when every recommended
/// strategy sits at maximum cost.
fn derive_allocation(scores: &[StrategyScore]) -> Vec<u32> {
    let recommended: Vec<usize> = scores
        .iter()
        .enumerate()
        .filter(|(_, s)| s.recommended)
        .map(|(i, _)| i)
        .collect();

    let mut allocation = vec![0u32; scores.len()];
    if recommended.is_empty() {
        return allocation;
    }

    let weights: Vec<u64> = recommended
        .iter()
        .map(|&i| u64::from(10_000 - scores[i].cost_score.min(10_000)))
        .collect();
    let weight_sum: u64 = weights.iter().sum();

    if weight_sum == 0 {
        let share = 10_000 / u32::try_from(recommended.len()).unwrap_or(1);
        for &i in &recommended {
            allocation[i] = share;
        }
    } else {
        for (&i, &w) in recommended.iter().zip(&weights) {
            allocation[i] = u32::try_from(w * 10_000 / weight_sum).unwrap_or(0);
        }
    }

    let assigned: u32 = allocation.iter().sum();
    allocation[recommended[0]] += 10_000 - assigned;
    allocation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::PerformanceRecord;
    use anyhow::Result;
    use async_trait::async_trait;
    use cap_alloc_core::types::{CostBreakdown, ExposureKind};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeStrategy {
        name: String,
        cost_bps: u32,
        risk: u32,
        capacity: Decimal,
        active: bool,
        responsive: AtomicBool,
    }

    impl FakeStrategy {
        fn new(name: &str, cost_bps: u32, risk: u32, capacity: Decimal) -> Self {
            Self {
                name: name.to_string(),
                cost_bps,
                risk,
                capacity,
                active: true,
                responsive: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl ExposureStrategy for FakeStrategy {
        fn name(&self) -> &str {
            &self.name
        }

        async fn exposure_info(&self) -> Result<ExposureInfo> {
            if !self.responsive.load(Ordering::SeqCst) {
                anyhow::bail!("timed out");
            }
            Ok(ExposureInfo {
                kind: ExposureKind::Perpetual,
                underlying: "BTC".to_string(),
                leverage: 100,
                collateral_ratio_bps: 10_000,
                current_exposure: Decimal::ZERO,
                max_capacity: self.capacity,
                current_cost_bps: self.cost_bps,
                risk_score: self.risk,
                is_active: self.active,
                liquidation_price: None,
            })
        }

        async fn cost_breakdown(&self) -> Result<CostBreakdown> {
            if !self.responsive.load(Ordering::SeqCst) {
                anyhow::bail!("timed out");
            }
            Ok(CostBreakdown {
                funding_rate_bps: 0,
                borrow_rate_bps: 0,
                management_fee_bps: self.cost_bps,
                slippage_cost_bps: 0,
                gas_cost: Decimal::ZERO,
                total_cost_bps: self.cost_bps,
            })
        }

        async fn open_exposure(&self, amount: Decimal) -> Result<Decimal> {
            Ok(amount)
        }

        async fn close_exposure(&self, amount: Decimal) -> Result<Decimal> {
            Ok(amount)
        }

        async fn harvest_yield(&self) -> Result<Decimal> {
            Ok(Decimal::ZERO)
        }

        async fn emergency_exit(&self) -> Result<Decimal> {
            Ok(Decimal::ZERO)
        }
    }

    fn success_record() -> PerformanceRecord {
        PerformanceRecord {
            return_bps: 10,
            cost_bps: 5,
            execution_time_ms: 3,
            success: true,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn free_strategy_with_clean_history_scores_full() {
        let mut optimizer = StrategyOptimizer::new(OptimizerConfig::default());
        for _ in 0..10 {
            optimizer.record_performance("free", success_record());
        }
        // ample capacity: 2x the 100 target
        let strategies: Vec<Arc<dyn ExposureStrategy>> =
            vec![Arc::new(FakeStrategy::new("free", 0, 0, dec!(200)))];

        let scores = optimizer.analyze_strategies(&strategies, dec!(100)).await;
        assert_eq!(scores[0].total_score, 10_000);
        assert!(scores[0].recommended);
    }

    #[tokio::test]
    async fn reliability_defaults_to_50_without_history() {
        let optimizer = StrategyOptimizer::new(OptimizerConfig::default());
        let strategies: Vec<Arc<dyn ExposureStrategy>> =
            vec![Arc::new(FakeStrategy::new("fresh", 0, 0, dec!(200)))];

        let scores = optimizer.analyze_strategies(&strategies, dec!(100)).await;
        assert_eq!(scores[0].reliability_score, 50);
        // 4000 + 2000 + 1500 + 750 + 1000
        assert_eq!(scores[0].total_score, 9250);
    }

    #[tokio::test]
    async fn unresponsive_strategy_is_scored_not_dropped() {
        let optimizer = StrategyOptimizer::new(OptimizerConfig::default());
        let broken = FakeStrategy::new("broken", 0, 0, dec!(200));
        broken.responsive.store(false, Ordering::SeqCst);
        let strategies: Vec<Arc<dyn ExposureStrategy>> = vec![
            Arc::new(broken),
            Arc::new(FakeStrategy::new("healthy", 100, 10, dec!(200))),
        ];

        let scores = optimizer.analyze_strategies(&strategies, dec!(100)).await;
        assert_eq!(scores.len(), 2);
        assert!(!scores[0].recommended);
        assert!(scores[0].reasoning.contains("unresponsive"));
        assert!(scores[1].recommended);
    }

    #[tokio::test]
    async fn allocation_sums_to_10000_and_favors_cheap() {
        let optimizer = StrategyOptimizer::new(OptimizerConfig::default());
        let strategies: Vec<Arc<dyn ExposureStrategy>> = vec![
            Arc::new(FakeStrategy::new("cheap", 100, 10, dec!(200))),
            Arc::new(FakeStrategy::new("dear", 3000, 10, dec!(200))),
        ];

        let result = optimizer
            .calculate_optimal_allocation(&strategies, &[5000, 5000], dec!(100), 86_400)
            .await;
        let sum: u32 = result.recommended_allocation.iter().sum();
        assert_eq!(sum, 10_000);
        assert!(result.recommended_allocation[0] > result.recommended_allocation[1]);
    }

    #[tokio::test]
    async fn unrecommended_gets_zero_weight() {
        let optimizer = StrategyOptimizer::new(OptimizerConfig::default());
        let strategies: Vec<Arc<dyn ExposureStrategy>> = vec![
            Arc::new(FakeStrategy::new("good", 100, 10, dec!(200))),
            // max cost and max risk: composite well below threshold
            Arc::new(FakeStrategy::new("bad", 10_000, 100, dec!(200))),
        ];

        let result = optimizer
            .calculate_optimal_allocation(&strategies, &[5000, 5000], dec!(100), 86_400)
            .await;
        assert_eq!(result.recommended_allocation[1], 0);
        assert_eq!(result.recommended_allocation[0], 10_000);
    }

    #[tokio::test]
    async fn instructions_only_for_differing_strategies() {
        let optimizer = StrategyOptimizer::new(OptimizerConfig::default());
        let strategies: Vec<Arc<dyn ExposureStrategy>> = vec![
            Arc::new(FakeStrategy::new("a", 100, 10, dec!(200))),
            Arc::new(FakeStrategy::new("b", 100, 10, dec!(200))),
        ];

        let instructions = optimizer
            .rebalance_instructions(&strategies, &[6000, 4000], &[6000, 3000], dec!(1000))
            .await;
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].from_strategy.as_deref(), Some("b"));
        assert_eq!(instructions[0].priority, 3);
        assert_eq!(instructions[0].amount, dec!(100));
    }

    #[tokio::test]
    async fn emergency_strategy_gets_priority_one() {
        let optimizer = StrategyOptimizer::new(OptimizerConfig::default());
        let risky = FakeStrategy::new("risky", 100, 95, dec!(200));
        let strategies: Vec<Arc<dyn ExposureStrategy>> = vec![
            Arc::new(risky),
            Arc::new(FakeStrategy::new("calm", 100, 10, dec!(200))),
        ];

        let instructions = optimizer
            .rebalance_instructions(&strategies, &[5000, 5000], &[0, 10_000], dec!(1000))
            .await;
        assert_eq!(instructions.len(), 2);
        // sorted by priority: emergency first
        assert!(instructions[0].emergency);
        assert_eq!(instructions[0].priority, 1);
        assert_eq!(instructions[1].priority, 2);
        assert_eq!(instructions[1].to_strategy.as_deref(), Some("calm"));
    }

    #[tokio::test]
    async fn confidence_capped_without_oracle() {
        let optimizer = StrategyOptimizer::new(OptimizerConfig::default());
        let strategies: Vec<Arc<dyn ExposureStrategy>> =
            vec![Arc::new(FakeStrategy::new("a", 100, 10, dec!(200)))];

        let result = optimizer
            .calculate_optimal_allocation(&strategies, &[10_000], dec!(100), 86_400)
            .await;
        assert_eq!(result.confidence, 50);
    }

    #[tokio::test]
    async fn oracle_lifts_confidence_cap() {
        struct FlatOracle;

        #[async_trait]
        impl PriceOracle for FlatOracle {
            async fn price(&self, _asset: &str) -> Result<Decimal> {
                Ok(dec!(50000))
            }
        }

        let optimizer =
            StrategyOptimizer::with_oracle(OptimizerConfig::default(), Arc::new(FlatOracle));
        let strategies: Vec<Arc<dyn ExposureStrategy>> =
            vec![Arc::new(FakeStrategy::new("a", 100, 10, dec!(200)))];

        let result = optimizer
            .calculate_optimal_allocation(&strategies, &[10_000], dec!(100), 86_400)
            .await;
        assert_eq!(result.confidence, 100);
    }

    #[test]
    fn vector_comparison_detects_any_difference() {
        let optimizer = StrategyOptimizer::new(OptimizerConfig::default());
        assert!(!optimizer.should_rebalance(&[5000, 5000], &[5000, 5000]));
        assert!(optimizer.should_rebalance(&[5000, 5000], &[6000, 4000]));
        assert!(optimizer.should_rebalance(&[5000], &[5000, 0]));
    }
}
