//! Call-site allocation ledger
//!
//! Aggregates allocation counts and bytes per source location, in the order
//! the locations were first seen. The global allocator feeds it when the
//! `tracking` feature is enabled; any caller can also keep a private ledger.

use core::fmt;
use std::collections::HashMap;
use std::panic::Location;

use serde::Serialize;

/// Aggregated allocations issued from one source location
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallSiteRecord {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
    pub count: u64,
    pub total_bytes: u64,
}

impl fmt::Display for CallSiteRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {} allocations ({} bytes)",
            self.file, self.line, self.column, self.count, self.total_bytes
        )
    }
}

type SiteKey = (&'static str, u32, u32);

/// Ledger of allocations keyed by call site
#[derive(Clone, Debug, Default)]
pub struct AllocationLedger {
    records: Vec<CallSiteRecord>,
    index: HashMap<SiteKey, usize>,
}

impl AllocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one allocation of `bytes` at `location`
    pub fn record(&mut self, location: &'static Location<'static>, bytes: usize) {
        let key = (location.file(), location.line(), location.column());
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.records.push(CallSiteRecord {
                    file: key.0,
                    line: key.1,
                    column: key.2,
                    count: 0,
                    total_bytes: 0,
                });
                let slot = self.records.len() - 1;
                self.index.insert(key, slot);
                slot
            }
        };

        let record = &mut self.records[slot];
        record.count += 1;
        record.total_bytes += bytes as u64;
    }

    /// Records in first-seen order
    pub fn records(&self) -> &[CallSiteRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Allocations across every call site
    pub fn total_count(&self) -> u64 {
        self.records.iter().map(|r| r.count).sum()
    }

    /// Bytes across every call site
    pub fn total_bytes(&self) -> u64 {
        self.records.iter().map(|r| r.total_bytes).sum()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }
}

impl fmt::Display for AllocationLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in &self.records {
            writeln!(f, "{}", record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn here() -> &'static Location<'static> {
        Location::caller()
    }

    #[test]
    fn test_ledger_aggregates_per_site() {
        let mut ledger = AllocationLedger::new();
        let site_a = here();
        let site_b = here();

        ledger.record(site_a, 16);
        ledger.record(site_b, 100);
        ledger.record(site_a, 16);

        let records = ledger.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, site_a.line());
        assert_eq!(records[0].count, 2);
        assert_eq!(records[0].total_bytes, 32);
        assert_eq!(records[1].count, 1);
        assert_eq!(ledger.total_count(), 3);
        assert_eq!(ledger.total_bytes(), 132);
    }

    #[test]
    fn test_ledger_display() {
        let mut ledger = AllocationLedger::new();
        let site = here();
        ledger.record(site, 8);

        let text = ledger.to_string();
        assert!(text.contains(site.file()));
        assert!(text.contains("1 allocations (8 bytes)"));

        ledger.clear();
        assert!(ledger.is_empty());
    }
}
