//! Append-only token usage accounting.
//!
//! Streamed completions carry no token counts, so only non-streaming calls
//! (title generation) produce records here.

mod memory;

pub use self::memory::MemoryUsageStore;

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::collections::BTreeMap;

use crate::error::ChatError;
use crate::llm::chat::TokenUsage;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub principal: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(principal: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            principal: principal.into(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            timestamp: Utc::now(),
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageTotals {
    pub fn add(&mut self, record: &UsageRecord) {
        self.prompt_tokens += record.prompt_tokens;
        self.completion_tokens += record.completion_tokens;
        self.total_tokens += record.total_tokens();
    }
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn record(&self, record: UsageRecord) -> Result<(), ChatError>;

    /// Records for `principal`, oldest first.
    async fn records_for(&self, principal: &str) -> Result<Vec<UsageRecord>, ChatError>;

    /// Sums usage for `principal`, optionally restricted to one calendar month (UTC).
    async fn totals(
        &self,
        principal: &str,
        month: Option<(i32, u32)>
    ) -> Result<UsageTotals, ChatError>;

    async fn all_totals_by_principal(&self) -> Result<BTreeMap<String, UsageTotals>, ChatError>;
}
