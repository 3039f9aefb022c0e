use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default)]
pub(crate) struct StatsCounters {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub coalesced: u64,
    pub dispatched: u64,
    pub provider_failures: u64,
    pub quota_rejections: u64,
    pub last_dispatch_at: Option<DateTime<Utc>>,
}

impl StatsCounters {
    pub fn record_dispatch(&mut self) {
        self.dispatched += 1;
        self.last_dispatch_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub gateway: &'static str,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub coalesced: u64,
    pub dispatched: u64,
    pub provider_failures: u64,
    pub quota_rejections: u64,
    pub cached_entries: usize,
    pub pending: usize,
    pub draining: bool,
    pub budget_used: u32,
    pub budget_cap: u32,
    pub last_dispatch_at: Option<DateTime<Utc>>,
}
