//! Bounded per-strategy performance ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observation of a strategy's behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub return_bps: i64,
    pub cost_bps: u32,
    pub execution_time_ms: u64,
    pub success: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Fixed-capacity circular buffer of performance records.
///
/// Eviction is index + modulo, not shift-and-pop: the oldest entry is
/// overwritten in place when the buffer is full.
#[derive(Debug, Clone)]
pub struct PerformanceHistory {
    entries: Vec<PerformanceRecord>,
    head: usize,
    capacity: usize,
    assessed_risk: Option<u32>,
}

impl PerformanceHistory {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be positive");
        Self {
            entries: Vec::with_capacity(capacity),
            head: 0,
            capacity,
            assessed_risk: None,
        }
    }

    pub fn push(&mut self, record: PerformanceRecord) {
        if self.entries.len() < self.capacity {
            self.entries.push(record);
        } else {
            self.entries[self.head] = record;
        }
        self.head = (self.head + 1) % self.capacity;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Success rate over the retained window, 0-100. `None` with no history.
    #[must_use]
    pub fn success_rate(&self) -> Option<u32> {
        if self.entries.is_empty() {
            return None;
        }
        let successes = self.entries.iter().filter(|r| r.success).count();
        Some(u32::try_from(successes * 100 / self.entries.len()).unwrap_or(100))
    }

    /// Entries in insertion order, oldest first.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &PerformanceRecord> {
        let split = if self.entries.len() < self.capacity {
            0
        } else {
            self.head
        };
        self.entries[split..].iter().chain(self.entries[..split].iter())
    }

    pub fn set_assessed_risk(&mut self, risk_score: u32) {
        self.assessed_risk = Some(risk_score.min(100));
    }

    /// Last risk score recorded via `update_risk_assessment`, if any.
    #[must_use]
    pub fn assessed_risk(&self) -> Option<u32> {
        self.assessed_risk
    }
}
