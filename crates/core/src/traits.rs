use crate::types::{CostBreakdown, ExposureInfo};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// A pluggable mechanism for synthetic price exposure to a real-world asset.
///
/// Any conforming implementation is accepted; the bundle never downcasts to
/// a concrete type. Every method may fail independently — callers contain
/// failures at the call site.
#[async_trait]
pub trait ExposureStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn exposure_info(&self) -> Result<ExposureInfo>;

    async fn cost_breakdown(&self) -> Result<CostBreakdown>;

    /// Opens exposure worth `amount`; returns the notional actually gained.
    async fn open_exposure(&self, amount: Decimal) -> Result<Decimal>;

    /// Closes exposure worth `amount`; returns the notional actually closed.
    async fn close_exposure(&self, amount: Decimal) -> Result<Decimal>;

    /// Realizes any accrued yield; returns the harvested amount.
    async fn harvest_yield(&self) -> Result<Decimal>;

    /// Unwinds the position unconditionally; returns the recovered amount.
    async fn emergency_exit(&self) -> Result<Decimal>;
}

/// A pluggable mechanism for earning return on idle capital.
#[async_trait]
pub trait YieldStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Deposits `amount`; returns the shares minted.
    async fn deposit(&self, amount: Decimal) -> Result<Decimal>;

    /// Redeems `shares`; returns the amount returned.
    async fn withdraw(&self, shares: Decimal) -> Result<Decimal>;

    async fn total_value(&self) -> Result<Decimal>;

    async fn harvest_yield(&self) -> Result<Decimal>;
}

/// Price feed consumed by the optimizer and, transitively, by strategies.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn price(&self, asset: &str) -> Result<Decimal>;
}
