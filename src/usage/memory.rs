use async_trait::async_trait;
use chrono::Datelike;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{ UsageRecord, UsageStore, UsageTotals };
use crate::error::ChatError;

#[derive(Default)]
pub struct MemoryUsageStore {
    records: RwLock<Vec<UsageRecord>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn in_month(record: &UsageRecord, month: Option<(i32, u32)>) -> bool {
    match month {
        Some((year, month)) => record.timestamp.year() == year && record.timestamp.month() == month,
        None => true,
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn record(&self, record: UsageRecord) -> Result<(), ChatError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn records_for(&self, principal: &str) -> Result<Vec<UsageRecord>, ChatError> {
        let records = self.records.read().await;
        let mut owned: Vec<UsageRecord> = records
            .iter()
            .filter(|r| r.principal == principal)
            .cloned()
            .collect();
        owned.sort_by_key(|r| r.timestamp);
        Ok(owned)
    }

    async fn totals(
        &self,
        principal: &str,
        month: Option<(i32, u32)>
    ) -> Result<UsageTotals, ChatError> {
        let records = self.records.read().await;
        let mut totals = UsageTotals::default();
        records
            .iter()
            .filter(|r| r.principal == principal && in_month(r, month))
            .for_each(|r| totals.add(r));
        Ok(totals)
    }

    async fn all_totals_by_principal(&self) -> Result<BTreeMap<String, UsageTotals>, ChatError> {
        let records = self.records.read().await;
        let mut by_principal: BTreeMap<String, UsageTotals> = BTreeMap::new();
        for record in records.iter() {
            by_principal.entry(record.principal.clone()).or_default().add(record);
        }
        Ok(by_principal)
    }
}
