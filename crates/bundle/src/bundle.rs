use crate::state::{BundleStatus, ExposureSlot, YieldBundle, PRIMARY_MIN_BPS};
use cap_alloc_core::config::{AllocConfig, BundleConfig, RiskParameters};
use cap_alloc_core::errors::AllocError;
use cap_alloc_core::events::AllocationEvent;
use cap_alloc_core::guard::contained;
use cap_alloc_core::traits::{ExposureStrategy, YieldStrategy};
use cap_alloc_optimizer::{OptimizationResult, PerformanceRecord, StrategyOptimizer};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

const BPS_DENOMINATOR: u32 = 10_000;

/// Realized split of a deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub requested: Decimal,
    pub exposure_placed: Decimal,
    pub yield_placed: Decimal,
    /// Unconsumed remainder left idle in custody
    pub idle: Decimal,
}

/// Realized result of a withdrawal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalOutcome {
    pub requested: Decimal,
    pub realized: Decimal,
}

struct BundleState {
    slots: Vec<ExposureSlot>,
    yield_bundle: YieldBundle,
    risk: RiskParameters,
    /// Tracks requested deposits minus realized withdrawals. Increases by
    /// the full requested amount even when placement partially fails, so
    /// it can diverge from actually-deployed capital over repeated
    /// partial failures.
    total_allocated_capital: Decimal,
    idle_capital: Decimal,
    optimization_gate: Option<Instant>,
    rebalance_gate: Option<Instant>,
}

/// Owns pooled capital, the strategy registries, target weights, and risk
/// limits; consults the optimizer periodically.
///
/// All mutating entry points serialize on one lock, released on every
/// exit path. Collaborator calls are failure-contained: one broken
/// strategy degrades the operation instead of aborting it.
pub struct CapitalAllocationBundle {
    state: Mutex<BundleState>,
    optimizer: Mutex<StrategyOptimizer>,
    events: broadcast::Sender<AllocationEvent>,
    config: BundleConfig,
}

impl CapitalAllocationBundle {
    #[must_use]
    pub fn new(config: AllocConfig, optimizer: StrategyOptimizer) -> Self {
        let (events, _rx) = broadcast::channel(1000);
        Self {
            state: Mutex::new(BundleState {
                slots: Vec::new(),
                yield_bundle: YieldBundle::default(),
                risk: config.risk,
                total_allocated_capital: Decimal::ZERO,
                idle_capital: Decimal::ZERO,
                optimization_gate: None,
                rebalance_gate: None,
            }),
            optimizer: Mutex::new(optimizer),
            events,
            config: config.bundle,
        }
    }

    /// Subscribes to bundle notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AllocationEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: AllocationEvent) {
        let _ = self.events.send(event);
    }

    // =========================================================================
    // Registry mutation
    // =========================================================================

    /// Registers an exposure strategy after probing it for the expected
    /// capability shape.
    ///
    /// # Errors
    ///
    /// `StrategyCapExceeded` at the registry cap, `ProbeFailed` when the
    /// candidate does not answer probes or reports a malformed shape,
    /// `InvalidTargetBps` when the target sits outside its bounds, and
    /// `AllocationSumExceeded` when active targets would pass 10000 bps.
    pub async fn add_exposure_strategy(
        &self,
        strategy: Arc<dyn ExposureStrategy>,
        target_bps: u32,
        max_bps: u32,
        primary: bool,
    ) -> Result<(), AllocError> {
        let mut state = self.state.lock().await;

        if state.slots.len() >= state.risk.max_strategy_count {
            return Err(AllocError::StrategyCapExceeded {
                max: state.risk.max_strategy_count,
            });
        }

        let name = strategy.name().to_string();

        // Capability probe: a candidate that cannot answer both reads is
        // never trusted with capital.
        let info = strategy
            .exposure_info()
            .await
            .map_err(|e| AllocError::ProbeFailed {
                strategy: name.clone(),
                reason: format!("exposure_info: {e:#}"),
            })?;
        strategy
            .cost_breakdown()
            .await
            .map_err(|e| AllocError::ProbeFailed {
                strategy: name.clone(),
                reason: format!("cost_breakdown: {e:#}"),
            })?;
        if info.max_capacity <= Decimal::ZERO {
            return Err(AllocError::ProbeFailed {
                strategy: name,
                reason: "reported zero capacity".to_string(),
            });
        }
        if info.risk_score > 100 {
            return Err(AllocError::ProbeFailed {
                strategy: name,
                reason: format!("risk score {} out of range", info.risk_score),
            });
        }

        let min_bps = if primary { PRIMARY_MIN_BPS } else { 0 };
        if target_bps < min_bps || target_bps > max_bps || max_bps > BPS_DENOMINATOR {
            return Err(AllocError::InvalidTargetBps {
                target_bps,
                min_bps,
                max_bps,
            });
        }

        let sum_bps: u32 = state
            .slots
            .iter()
            .filter(|s| s.active)
            .map(|s| s.target_bps)
            .sum::<u32>()
            + target_bps;
        if sum_bps > BPS_DENOMINATOR {
            return Err(AllocError::AllocationSumExceeded { sum_bps });
        }

        state.slots.push(ExposureSlot {
            strategy,
            name: name.clone(),
            target_bps,
            current_allocation: Decimal::ZERO,
            max_bps,
            min_bps,
            is_primary: primary,
            active: true,
            last_rebalance: None,
            total_allocated: Decimal::ZERO,
        });

        info!("Registered exposure strategy {} at {} bps", name, target_bps);
        self.emit(AllocationEvent::StrategyAdded {
            name,
            target_bps,
            primary,
        });
        Ok(())
    }

    /// Deregisters a strategy, attempting a best-effort emergency exit
    /// first. Returns the recovered amount (zero when the exit failed).
    ///
    /// # Errors
    ///
    /// `StrategyNotFound` when no slot carries that name.
    pub async fn remove_exposure_strategy(&self, name: &str) -> Result<Decimal, AllocError> {
        let mut state = self.state.lock().await;

        let index = state
            .slots
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| AllocError::StrategyNotFound {
                name: name.to_string(),
            })?;

        let strategy = state.slots[index].strategy.clone();
        let recovered = contained(name, "emergency_exit", strategy.emergency_exit())
            .await
            .unwrap_or(Decimal::ZERO);

        state.slots.swap_remove(index);
        state.idle_capital += recovered;

        info!("Removed exposure strategy {}, recovered {}", name, recovered);
        self.emit(AllocationEvent::StrategyRemoved {
            name: name.to_string(),
            recovered,
        });
        Ok(recovered)
    }

    /// Replaces the yield-bundle composition.
    ///
    /// # Errors
    ///
    /// `LengthMismatch` when lists differ in length, `InvalidFractionSum`
    /// when a non-empty fraction list does not sum to exactly 10000 bps.
    pub async fn update_yield_bundle(
        &self,
        strategies: Vec<Arc<dyn YieldStrategy>>,
        fractions_bps: Vec<u32>,
        max_leverage: u32,
    ) -> Result<(), AllocError> {
        if strategies.len() != fractions_bps.len() {
            return Err(AllocError::LengthMismatch);
        }
        if !strategies.is_empty() {
            let sum_bps: u32 = fractions_bps.iter().sum();
            if sum_bps != BPS_DENOMINATOR {
                return Err(AllocError::InvalidFractionSum { sum_bps });
            }
        }

        let mut state = self.state.lock().await;
        let count = strategies.len();
        state.yield_bundle.active = !strategies.is_empty();
        state.yield_bundle.strategies = strategies;
        state.yield_bundle.fractions_bps = fractions_bps;
        state.yield_bundle.max_leverage = max_leverage;

        info!("Yield bundle updated: {} strategies", count);
        self.emit(AllocationEvent::YieldBundleUpdated { strategies: count });
        Ok(())
    }

    // =========================================================================
    // Capital movement
    // =========================================================================

    /// Pulls `amount` into custody and fans it out across exposure and
    /// yield strategies.
    ///
    /// If the optimization interval elapsed, a best-effort optimization
    /// pass refreshes target weights first; its failure never aborts the
    /// deposit. Per-strategy calls are failure-contained — unconsumed
    /// amount is left idle.
    ///
    /// `total_allocated_capital` increases by the requested amount even
    /// when placement partially fails.
    ///
    /// # Errors
    ///
    /// `ValueTooLow` on a non-positive amount, `CircuitBreakerActive`
    /// while the breaker is set.
    pub async fn allocate_capital(
        &self,
        amount: Decimal,
    ) -> Result<AllocationOutcome, AllocError> {
        if amount <= Decimal::ZERO {
            return Err(AllocError::ValueTooLow);
        }

        let mut state = self.state.lock().await;
        if state.risk.circuit_breaker {
            return Err(AllocError::CircuitBreakerActive);
        }

        let interval = Duration::from_secs(self.config.optimization_interval_secs);
        let due = !interval.is_zero()
            && state
                .optimization_gate
                .map_or(true, |at| at.elapsed() >= interval);
        if due {
            self.run_optimization(&mut state).await;
            state.optimization_gate = Some(Instant::now());
        }

        let (exposure_portion, yield_portion) = Self::split_amount(&state, amount).await;

        let mut records: Vec<(String, PerformanceRecord)> = Vec::new();
        let mut exposure_placed = Decimal::ZERO;
        let mut remaining = exposure_portion;

        for slot in state.slots.iter_mut().filter(|s| s.active) {
            if remaining <= Decimal::ZERO {
                break;
            }
            let ask = (exposure_portion * Decimal::from(slot.target_bps)
                / Decimal::from(BPS_DENOMINATOR))
            .min(remaining);
            if ask <= Decimal::ZERO {
                continue;
            }

            let strategy = slot.strategy.clone();
            let started = Instant::now();
            match contained(&slot.name, "open_exposure", strategy.open_exposure(ask)).await {
                Some(actual) => {
                    slot.current_allocation += actual;
                    slot.total_allocated += actual;
                    remaining -= ask;
                    exposure_placed += actual;
                    records.push((slot.name.clone(), perf_record(started, true)));
                }
                None => records.push((slot.name.clone(), perf_record(started, false))),
            }
        }

        let mut yield_placed = Decimal::ZERO;
        if state.yield_bundle.active && yield_portion > Decimal::ZERO {
            let pairs: Vec<(Arc<dyn YieldStrategy>, u32)> = state
                .yield_bundle
                .strategies
                .iter()
                .cloned()
                .zip(state.yield_bundle.fractions_bps.iter().copied())
                .collect();
            for (strategy, fraction_bps) in pairs {
                let share =
                    yield_portion * Decimal::from(fraction_bps) / Decimal::from(BPS_DENOMINATOR);
                if share <= Decimal::ZERO {
                    continue;
                }
                if contained(strategy.name(), "deposit", strategy.deposit(share))
                    .await
                    .is_some()
                {
                    state.yield_bundle.total_capital += share;
                    yield_placed += share;
                }
            }
        }

        // Requested, not realized: cap-tracking semantics preserved from
        // the source system.
        state.total_allocated_capital += amount;
        let idle = (amount - exposure_placed - yield_placed).max(Decimal::ZERO);
        state.idle_capital += idle;

        drop(state);
        {
            let mut optimizer = self.optimizer.lock().await;
            for (name, record) in records {
                optimizer.record_performance(&name, record);
            }
        }

        info!(
            "Allocated {}: exposure {}, yield {}, idle {}",
            amount, exposure_placed, yield_placed, idle
        );
        self.emit(AllocationEvent::CapitalAllocated {
            requested: amount,
            exposure_placed,
            yield_placed,
        });

        Ok(AllocationOutcome {
            requested: amount,
            exposure_placed,
            yield_placed,
            idle,
        })
    }

    /// Withdraws up to `amount` by applying a uniform ratio across every
    /// strategy holding capital. Per-strategy failures are contained and
    /// skipped; `total_allocated_capital` decreases by the realized
    /// amount, floored at zero.
    ///
    /// # Errors
    ///
    /// `ValueTooLow` on a non-positive amount, `OverBalance` when the
    /// request exceeds tracked allocated capital.
    pub async fn withdraw_capital(
        &self,
        amount: Decimal,
    ) -> Result<WithdrawalOutcome, AllocError> {
        if amount <= Decimal::ZERO {
            return Err(AllocError::ValueTooLow);
        }

        let mut state = self.state.lock().await;
        if amount > state.total_allocated_capital {
            return Err(AllocError::OverBalance {
                requested: amount,
                available: state.total_allocated_capital,
            });
        }

        let total_value = Self::live_total_value(&state).await;
        if total_value <= Decimal::ZERO {
            self.emit(AllocationEvent::CapitalWithdrawn {
                requested: amount,
                realized: Decimal::ZERO,
            });
            return Ok(WithdrawalOutcome {
                requested: amount,
                realized: Decimal::ZERO,
            });
        }

        let ratio_bps = (amount * Decimal::from(BPS_DENOMINATOR) / total_value)
            .min(Decimal::from(BPS_DENOMINATOR));

        let mut records: Vec<(String, PerformanceRecord)> = Vec::new();
        let mut realized = Decimal::ZERO;

        for slot in state.slots.iter_mut().filter(|s| s.active) {
            if slot.current_allocation <= Decimal::ZERO {
                continue;
            }
            let close_amount =
                slot.current_allocation * ratio_bps / Decimal::from(BPS_DENOMINATOR);
            if close_amount <= Decimal::ZERO {
                continue;
            }

            let strategy = slot.strategy.clone();
            let started = Instant::now();
            match contained(
                &slot.name,
                "close_exposure",
                strategy.close_exposure(close_amount),
            )
            .await
            {
                Some(actual) => {
                    slot.current_allocation =
                        (slot.current_allocation - actual).max(Decimal::ZERO);
                    realized += actual;
                    records.push((slot.name.clone(), perf_record(started, true)));
                }
                None => records.push((slot.name.clone(), perf_record(started, false))),
            }
        }

        if state.yield_bundle.active && state.yield_bundle.total_capital > Decimal::ZERO {
            let redeem_total = state.yield_bundle.total_capital * ratio_bps
                / Decimal::from(BPS_DENOMINATOR);
            let pairs: Vec<(Arc<dyn YieldStrategy>, u32)> = state
                .yield_bundle
                .strategies
                .iter()
                .cloned()
                .zip(state.yield_bundle.fractions_bps.iter().copied())
                .collect();
            for (strategy, fraction_bps) in pairs {
                let share =
                    redeem_total * Decimal::from(fraction_bps) / Decimal::from(BPS_DENOMINATOR);
                if share <= Decimal::ZERO {
                    continue;
                }
                if let Some(returned) =
                    contained(strategy.name(), "withdraw", strategy.withdraw(share)).await
                {
                    state.yield_bundle.total_capital =
                        (state.yield_bundle.total_capital - share).max(Decimal::ZERO);
                    realized += returned;
                }
            }
        }

        state.total_allocated_capital =
            (state.total_allocated_capital - realized).max(Decimal::ZERO);

        drop(state);
        {
            let mut optimizer = self.optimizer.lock().await;
            for (name, record) in records {
                optimizer.record_performance(&name, record);
            }
        }

        info!("Withdrew {} of requested {}", realized, amount);
        self.emit(AllocationEvent::CapitalWithdrawn {
            requested: amount,
            realized,
        });

        Ok(WithdrawalOutcome {
            requested: amount,
            realized,
        })
    }

    /// Marks every slot whose live weight deviates from target by at
    /// least the rebalance threshold. Bookkeeping only: capital moves
    /// through subsequent allocate/withdraw flows, not here.
    ///
    /// Returns true iff any slot exceeded the threshold.
    ///
    /// # Errors
    ///
    /// `RateLimited` while the minimum rebalance interval has not elapsed.
    pub async fn rebalance_strategies(&self) -> Result<bool, AllocError> {
        let mut state = self.state.lock().await;

        let interval = Duration::from_secs(self.config.rebalance_interval_secs);
        if !interval.is_zero() {
            if let Some(at) = state.rebalance_gate {
                if at.elapsed() < interval {
                    return Err(AllocError::RateLimited {
                        operation: "rebalance",
                    });
                }
            }
        }

        let total: Decimal = state
            .slots
            .iter()
            .filter(|s| s.active)
            .map(|s| s.current_allocation)
            .sum();

        let threshold = Decimal::from(state.risk.rebalance_threshold_bps);
        let mut rebalanced = 0usize;
        let mut value_moved = Decimal::ZERO;

        if total > Decimal::ZERO {
            for slot in state.slots.iter_mut().filter(|s| s.active) {
                let current_bps =
                    slot.current_allocation * Decimal::from(BPS_DENOMINATOR) / total;
                let deviation = (current_bps - Decimal::from(slot.target_bps)).abs();
                if deviation >= threshold {
                    slot.last_rebalance = Some(Utc::now());
                    rebalanced += 1;
                    value_moved += total * deviation / Decimal::from(BPS_DENOMINATOR);
                }
            }
        }

        state.rebalance_gate = Some(Instant::now());

        info!(
            "Rebalance pass: {} strategies past threshold, value moved {}",
            rebalanced, value_moved
        );
        self.emit(AllocationEvent::RebalanceExecuted {
            strategies_rebalanced: rebalanced,
            value_moved,
        });

        Ok(rebalanced > 0)
    }

    /// Harvests accrued yield from every active strategy on both sides.
    /// Proceeds stay idle in custody.
    ///
    /// # Errors
    ///
    /// `CircuitBreakerActive` while the breaker is set.
    pub async fn harvest_all(&self) -> Result<Decimal, AllocError> {
        let mut state = self.state.lock().await;
        if state.risk.circuit_breaker {
            return Err(AllocError::CircuitBreakerActive);
        }

        let mut harvested = Decimal::ZERO;

        let exposure: Vec<(String, Arc<dyn ExposureStrategy>)> = state
            .slots
            .iter()
            .filter(|s| s.active)
            .map(|s| (s.name.clone(), s.strategy.clone()))
            .collect();
        for (name, strategy) in exposure {
            if let Some(amount) =
                contained(&name, "harvest_yield", strategy.harvest_yield()).await
            {
                harvested += amount;
            }
        }

        let yields: Vec<Arc<dyn YieldStrategy>> =
            state.yield_bundle.strategies.iter().cloned().collect();
        for strategy in yields {
            if let Some(amount) =
                contained(strategy.name(), "harvest_yield", strategy.harvest_yield()).await
            {
                harvested += amount;
            }
        }

        state.total_allocated_capital += harvested;
        state.idle_capital += harvested;

        info!("Harvested {}", harvested);
        self.emit(AllocationEvent::YieldHarvested { amount: harvested });
        Ok(harvested)
    }

    /// Sets the circuit breaker and unwinds everything recoverable.
    ///
    /// Exit failures are logged, never propagated; slot bookkeeping is
    /// zeroed regardless, which is the one permitted divergence from
    /// `total_allocated_capital` under emergency conditions.
    pub async fn emergency_exit_all(&self) -> Result<Decimal, AllocError> {
        let mut state = self.state.lock().await;

        if !state.risk.circuit_breaker {
            state.risk.circuit_breaker = true;
            warn!("Circuit breaker activated by emergency exit");
            self.emit(AllocationEvent::CircuitBreakerActivated);
        }

        let mut recovered = Decimal::ZERO;

        for slot in state.slots.iter_mut() {
            if slot.active && slot.current_allocation > Decimal::ZERO {
                let strategy = slot.strategy.clone();
                if let Some(amount) =
                    contained(&slot.name, "emergency_exit", strategy.emergency_exit()).await
                {
                    recovered += amount;
                }
            }
            slot.current_allocation = Decimal::ZERO;
        }

        if state.yield_bundle.active && state.yield_bundle.total_capital > Decimal::ZERO {
            let total_capital = state.yield_bundle.total_capital;
            let pairs: Vec<(Arc<dyn YieldStrategy>, u32)> = state
                .yield_bundle
                .strategies
                .iter()
                .cloned()
                .zip(state.yield_bundle.fractions_bps.iter().copied())
                .collect();
            for (strategy, fraction_bps) in pairs {
                let share =
                    total_capital * Decimal::from(fraction_bps) / Decimal::from(BPS_DENOMINATOR);
                if share <= Decimal::ZERO {
                    continue;
                }
                if let Some(returned) =
                    contained(strategy.name(), "withdraw", strategy.withdraw(share)).await
                {
                    recovered += returned;
                }
            }
        }
        state.yield_bundle.total_capital = Decimal::ZERO;
        state.idle_capital += recovered;

        warn!("Emergency exit complete, recovered {}", recovered);
        self.emit(AllocationEvent::EmergencyAction { recovered });
        Ok(recovered)
    }

    // =========================================================================
    // Admin surface
    // =========================================================================
    // Privilege enforcement belongs to the embedding application; these
    // entry points are segregated so it has one seam to guard.

    /// Replaces the risk limits. The circuit breaker flag is carried over
    /// unchanged; it moves only through `set_circuit_breaker` or
    /// emergency-exit logic.
    pub async fn set_risk_parameters(&self, params: RiskParameters) {
        let mut state = self.state.lock().await;
        let breaker = state.risk.circuit_breaker;
        state.risk = params;
        state.risk.circuit_breaker = breaker;
        info!("Risk parameters updated");
        self.emit(AllocationEvent::RiskParametersUpdated);
    }

    pub async fn set_circuit_breaker(&self, active: bool) {
        let mut state = self.state.lock().await;
        state.risk.circuit_breaker = active;
        if active {
            warn!("Circuit breaker set");
            self.emit(AllocationEvent::CircuitBreakerActivated);
        } else {
            info!("Circuit breaker cleared");
        }
    }

    /// Force-runs an optimization pass, ignoring the interval gate.
    ///
    /// Returns `None` when no active strategies are registered.
    ///
    /// # Errors
    ///
    /// `CircuitBreakerActive` while the breaker is set.
    pub async fn trigger_optimization(
        &self,
    ) -> Result<Option<OptimizationResult>, AllocError> {
        let mut state = self.state.lock().await;
        if state.risk.circuit_breaker {
            return Err(AllocError::CircuitBreakerActive);
        }
        let result = self.run_optimization(&mut state).await;
        state.optimization_gate = Some(Instant::now());
        Ok(result)
    }

    // =========================================================================
    // Read surface
    // =========================================================================

    pub async fn total_allocated_capital(&self) -> Decimal {
        self.state.lock().await.total_allocated_capital
    }

    pub async fn idle_capital(&self) -> Decimal {
        self.state.lock().await.idle_capital
    }

    /// Live sum of strategy-reported value on both sides. Read failures
    /// are contained and contribute zero.
    pub async fn current_total_value(&self) -> Decimal {
        let state = self.state.lock().await;
        Self::live_total_value(&state).await
    }

    pub async fn status(&self) -> BundleStatus {
        let state = self.state.lock().await;
        BundleStatus {
            total_allocated_capital: state.total_allocated_capital,
            idle_capital: state.idle_capital,
            circuit_breaker: state.risk.circuit_breaker,
            yield_capital: state.yield_bundle.total_capital,
            strategies: state.slots.iter().map(ExposureSlot::status).collect(),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Leverage-aware split of a deposit into exposure and yield portions.
    ///
    /// Aggregate leverage is total reported exposure over total
    /// collateral, x100. Above 1x the exposure portion shrinks in inverse
    /// proportion; at or below 1x the split is flat 50/50.
    async fn split_amount(state: &BundleState, amount: Decimal) -> (Decimal, Decimal) {
        let mut total_exposure = Decimal::ZERO;
        let mut total_collateral = Decimal::ZERO;

        for slot in state.slots.iter().filter(|s| s.active) {
            if let Some(info) =
                contained(&slot.name, "exposure_info", slot.strategy.exposure_info()).await
            {
                total_exposure += info.current_exposure;
                total_collateral += info.collateral();
            }
        }

        let hundred = Decimal::ONE_HUNDRED;
        let leverage = if total_collateral > Decimal::ZERO {
            total_exposure * hundred / total_collateral
        } else {
            hundred
        };

        let exposure_portion = if leverage > hundred {
            amount / Decimal::TWO * hundred / leverage
        } else {
            amount / Decimal::TWO
        };

        (exposure_portion, amount - exposure_portion)
    }

    async fn live_total_value(state: &BundleState) -> Decimal {
        let mut total = Decimal::ZERO;

        for slot in state.slots.iter().filter(|s| s.active) {
            if let Some(info) =
                contained(&slot.name, "exposure_info", slot.strategy.exposure_info()).await
            {
                total += info.current_exposure;
            }
        }
        for strategy in &state.yield_bundle.strategies {
            if let Some(value) =
                contained(strategy.name(), "total_value", strategy.total_value()).await
            {
                total += value;
            }
        }

        total
    }

    /// One optimization pass: score the active strategies, and when the
    /// cost-benefit model clears, apply the recommended weights clamped
    /// to each slot's bounds. Never fails the caller.
    async fn run_optimization(&self, state: &mut BundleState) -> Option<OptimizationResult> {
        let handles: Vec<Arc<dyn ExposureStrategy>> = state
            .slots
            .iter()
            .filter(|s| s.active)
            .map(|s| s.strategy.clone())
            .collect();
        if handles.is_empty() {
            return None;
        }
        let current: Vec<u32> = state
            .slots
            .iter()
            .filter(|s| s.active)
            .map(|s| s.target_bps)
            .collect();

        let result = {
            let optimizer = self.optimizer.lock().await;
            optimizer
                .calculate_optimal_allocation(
                    &handles,
                    &current,
                    state.total_allocated_capital,
                    self.config.time_horizon_secs,
                )
                .await
        };

        if result.should_rebalance {
            let active_indices: Vec<usize> = state
                .slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.active)
                .map(|(i, _)| i)
                .collect();
            let clamped: Vec<(usize, u32)> = active_indices
                .iter()
                .zip(&result.recommended_allocation)
                .map(|(&i, &proposed)| {
                    let slot = &state.slots[i];
                    (i, proposed.clamp(slot.min_bps, slot.max_bps))
                })
                .collect();
            let sum_bps: u32 = clamped.iter().map(|(_, w)| *w).sum();

            if sum_bps <= BPS_DENOMINATOR {
                for (i, weight) in clamped {
                    if state.slots[i].target_bps != weight {
                        state.slots[i].target_bps = weight;
                        self.emit(AllocationEvent::AllocationUpdated {
                            name: state.slots[i].name.clone(),
                            target_bps: weight,
                        });
                    }
                }
            } else {
                warn!(
                    "Skipping weight update: clamped targets sum to {} bps",
                    sum_bps
                );
            }
        }

        info!(
            "Optimization performed: saving {} bps, cost {}",
            result.expected_saving_bps, result.implementation_cost
        );
        self.emit(AllocationEvent::OptimizationPerformed {
            expected_saving_bps: result.expected_saving_bps,
            implementation_cost: result.implementation_cost,
            at: Utc::now(),
        });

        Some(result)
    }
}

fn perf_record(started: Instant, success: bool) -> PerformanceRecord {
    PerformanceRecord {
        return_bps: 0,
        cost_bps: 0,
        execution_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        success,
        recorded_at: Utc::now(),
    }
}
