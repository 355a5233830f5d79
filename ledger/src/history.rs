//! Bounded FIFO of monitored events.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use entityx_types::{HistoryRecord, ParseLabelError, RecordType, RiskLevel};

pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

/// Filters for [`HistoryStore::query`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub record_type: Option<RecordType>,
    pub risk_level: Option<RiskLevel>,
    /// Clamped to `1..=MAX_LIMIT`; `None` means `DEFAULT_LIMIT`.
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub const DEFAULT_LIMIT: usize = 500;
    pub const MAX_LIMIT: usize = 2000;

    /// Build a query from raw, case-insensitive filter labels.
    ///
    /// Blank labels are treated as absent.
    pub fn from_labels(
        record_type: Option<&str>,
        risk_level: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Self, ParseLabelError> {
        let record_type = record_type
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .transpose()?;
        let risk_level = risk_level
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .transpose()?;
        Ok(Self {
            record_type,
            risk_level,
            limit,
        })
    }

    pub fn with_type(mut self, record_type: RecordType) -> Self {
        self.record_type = Some(record_type);
        self
    }

    pub fn with_risk(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = Some(risk_level);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    fn matches(&self, record: &HistoryRecord) -> bool {
        self.record_type.is_none_or(|t| record.record_type == t)
            && self.risk_level.is_none_or(|r| record.risk_level == r)
    }
}

/// One page of query results, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPage {
    pub records: Vec<HistoryRecord>,
    /// Matching records before the limit was applied.
    pub total: usize,
}

/// Process-lifetime event history.
///
/// Holds at most `capacity` records. Appending past capacity evicts exactly
/// the oldest record.
#[derive(Debug)]
pub struct HistoryStore {
    capacity: usize,
    records: Mutex<VecDeque<HistoryRecord>>,
}

impl HistoryStore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append(&self, record: HistoryRecord) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.push_back(record);
        if records.len() > self.capacity {
            records.pop_front();
        }
    }

    #[must_use]
    pub fn query(&self, query: &HistoryQuery) -> HistoryPage {
        let limit = query.effective_limit();
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);

        let mut page = Vec::with_capacity(limit.min(records.len()));
        let mut total = 0usize;
        for record in records.iter().rev().filter(|r| query.matches(r)) {
            total += 1;
            if page.len() < limit {
                page.push(record.clone());
            }
        }

        HistoryPage {
            records: page,
            total,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
