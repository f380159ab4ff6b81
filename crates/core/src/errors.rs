use rust_decimal::Decimal;
use thiserror::Error;

/// Typed failures surfaced by the bundle's entry points.
///
/// Collaborator failures are never surfaced here — they are contained at
/// the call site and degrade to a zero contribution. This enum covers the
/// precondition and rate-limit taxonomy that aborts an operation outright.
#[derive(Error, Debug)]
pub enum AllocError {
    /// Zero or negative amount passed to a capital movement.
    #[error("Value too low")]
    ValueTooLow,

    /// Circuit breaker is set; ordinary capital movement is blocked.
    #[error("Circuit breaker active")]
    CircuitBreakerActive,

    /// Withdrawal larger than the tracked allocated capital.
    #[error("Withdrawal exceeds allocated capital: requested {requested}, available {available}")]
    OverBalance {
        requested: Decimal,
        available: Decimal,
    },

    /// Registry already holds the maximum number of strategies.
    #[error("Strategy cap exceeded: limit {max}")]
    StrategyCapExceeded { max: usize },

    /// Adding the strategy would push active targets past 10000 bps.
    #[error("Active target allocations exceed 10000 bps: {sum_bps}")]
    AllocationSumExceeded { sum_bps: u32 },

    /// Target outside the slot's min/max bounds.
    #[error("Target {target_bps} bps outside bounds [{min_bps}, {max_bps}]")]
    InvalidTargetBps {
        target_bps: u32,
        min_bps: u32,
        max_bps: u32,
    },

    /// Yield fractions must sum to exactly 10000 bps when non-empty.
    #[error("Yield fractions must sum to 10000 bps, got {sum_bps}")]
    InvalidFractionSum { sum_bps: u32 },

    /// Yield strategy and fraction lists differ in length.
    #[error("Strategy and fraction lists differ in length")]
    LengthMismatch,

    /// Minimum interval between invocations has not elapsed.
    #[error("Rate limited: {operation}")]
    RateLimited { operation: &'static str },

    /// Candidate strategy failed the capability probe.
    #[error("Capability probe failed for {strategy}: {reason}")]
    ProbeFailed { strategy: String, reason: String },

    /// No registered strategy under that name.
    #[error("Strategy not found: {name}")]
    StrategyNotFound { name: String },
}
