//! Progress tracking for a single sync pass.
//!
//! The engine creates one `SyncProgressTracker` per pass that finds a new
//! block. It counts processed and failed addresses and the amount of data
//! fetched, derives the percentage published on the progress channel, and
//! summarizes the pass for logging.

use crate::provider::BlockInfo;
use chrono::{DateTime, Utc};
use tracing::warn;

/// Tracks the progress of one pass over the tracked addresses
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    /// Height history is fetched from
    start_height: u64,
    total_addresses: usize,
    addresses_processed: usize,
    /// Addresses with at least one failed fetch
    failed_addresses: Vec<String>,
    history_entries: usize,
    utxo_count: usize,
    started_at: DateTime<Utc>,
}

impl SyncProgressTracker {
    pub fn new(start_height: u64, total_addresses: usize) -> Self {
        Self {
            start_height,
            total_addresses,
            addresses_processed: 0,
            failed_addresses: Vec::new(),
            history_entries: 0,
            utxo_count: 0,
            started_at: Utc::now(),
        }
    }

    pub fn record_history(&mut self, entries: usize) {
        self.history_entries += entries;
    }

    pub fn record_utxos(&mut self, utxos: usize) {
        self.utxo_count += utxos;
    }

    /// Mark an address as done; `failed` if any of its fetches failed.
    pub fn record_address(&mut self, address: &str, failed: bool) {
        self.addresses_processed += 1;
        if failed {
            warn!("Address {} synced with errors", address);
            self.failed_addresses.push(address.to_string());
        }
    }

    /// Percentage of addresses processed, 100 when there is nothing to do.
    pub fn percent(&self) -> u8 {
        if self.total_addresses == 0 {
            return 100;
        }
        let processed = self.addresses_processed.min(self.total_addresses);
        (processed * 100 / self.total_addresses) as u8
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_addresses.is_empty()
    }

    pub fn get_stats(&self) -> SyncStats {
        let finished_at = Utc::now();
        SyncStats {
            start_height: self.start_height,
            addresses_processed: self.addresses_processed,
            failed_addresses: self.failed_addresses.clone(),
            history_entries: self.history_entries,
            utxo_count: self.utxo_count,
            duration_ms: (finished_at - self.started_at).num_milliseconds().max(0) as u64,
            finished_at,
        }
    }
}

/// Statistics about one sync pass
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStats {
    pub start_height: u64,
    pub addresses_processed: usize,
    pub failed_addresses: Vec<String>,
    pub history_entries: usize,
    pub utxo_count: usize,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl SyncStats {
    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        format!(
            "Sync from height {}: {} addresses, {} history entries, {} UTXOs in {}ms{}",
            self.start_height,
            self.addresses_processed,
            self.history_entries,
            self.utxo_count,
            self.duration_ms,
            if self.failed_addresses.is_empty() {
                String::new()
            } else {
                format!(" ({} failed)", self.failed_addresses.len())
            }
        )
    }
}

/// How a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The tip could not be fetched; nothing changed
    TipUnavailable,
    /// The tip hash matched the last known block
    Unchanged,
    /// Every address refreshed and the tip was committed
    Updated,
    /// At least one fetch failed; the tip was not committed
    Partial,
}

/// Result of one engine pass
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub tip: Option<BlockInfo>,
    /// Present when the pass reached the update phase
    pub stats: Option<SyncStats>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub(crate) fn without_update(outcome: SyncOutcome, tip: Option<BlockInfo>) -> Self {
        Self {
            outcome,
            tip,
            stats: None,
            finished_at: Utc::now(),
        }
    }

    pub(crate) fn with_stats(outcome: SyncOutcome, tip: BlockInfo, stats: SyncStats) -> Self {
        Self {
            outcome,
            tip: Some(tip),
            finished_at: stats.finished_at,
            stats: Some(stats),
        }
    }
}
