//! Polling sync engine.
//!
//! The engine owns the wallet's per-address history and UTXO lists and keeps
//! them in step with the chain by polling the provider's tip on a fixed
//! interval:
//!
//! - `Idle -> Polling` on every tick: the tip is requested;
//! - `Polling -> Idle` when the tip hash equals the last known one;
//! - `Polling -> Updating` on a new tip: every tracked address is refreshed
//!   from `tip.height - reorg_safe_depth`, then the tip is recorded;
//! - `Updating -> Idle` once all addresses are done.
//!
//! A failed fetch for one address clears that address's contribution and is
//! logged; the other addresses still refresh. A pass with any failure does not
//! record the tip, so the next tick runs the whole pass again.
//!
//! Passes never overlap. A tick that lands while a pass is running leaves a
//! pending flag and returns; the running pass re-runs once before releasing,
//! and checks the flag again after releasing.

use super::events::WalletState;
use super::history::fetch_recent_transactions;
use super::progress_tracker::{SyncOutcome, SyncProgressTracker, SyncReport};
use crate::config::SyncConfig;
use crate::provider::{BlockInfo, BlockchainDataProvider, TransactionHistoryEntry, UTxO};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Observable phase of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Polling,
    Updating,
}

/// Per-address data owned by the pass slot.
struct AddressData {
    history: Vec<Vec<TransactionHistoryEntry>>,
    utxos: Vec<Vec<UTxO>>,
}

pub struct WalletSyncEngine {
    provider: Arc<dyn BlockchainDataProvider>,
    addresses: Vec<String>,
    config: SyncConfig,
    state: WalletState,

    /// Held for the whole duration of a pass.
    slot: tokio::sync::Mutex<AddressData>,
    pending: AtomicBool,
    engine_state: Mutex<EngineState>,
    last_known_block: Mutex<Option<BlockInfo>>,
}

impl WalletSyncEngine {
    pub fn new(
        provider: Arc<dyn BlockchainDataProvider>,
        addresses: Vec<String>,
        config: SyncConfig,
        state: WalletState,
    ) -> Self {
        let slot = AddressData {
            history: vec![Vec::new(); addresses.len()],
            utxos: vec![Vec::new(); addresses.len()],
        };

        Self {
            provider,
            addresses,
            config,
            state,
            slot: tokio::sync::Mutex::new(slot),
            pending: AtomicBool::new(false),
            engine_state: Mutex::new(EngineState::Idle),
            last_known_block: Mutex::new(None),
        }
    }

    pub fn state(&self) -> EngineState {
        *self
            .engine_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: EngineState) {
        *self
            .engine_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Tip recorded by the last fully successful pass.
    pub fn last_known_block(&self) -> Option<BlockInfo> {
        self.last_known_block
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn wallet_state(&self) -> &WalletState {
        &self.state
    }

    /// Start polling. The first tick fires immediately.
    pub fn start(self: &Arc<Self>) -> SyncHandle {
        let engine = self.clone();
        let poll_interval = self.config.poll_interval;

        info!(
            "Starting wallet sync for {} addresses every {:?}",
            self.addresses.len(),
            poll_interval
        );

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine.tick().await;
                });
            }
        });

        SyncHandle { task }
    }

    /// One timer tick. Returns `None` when a pass was already running; that
    /// pass will run again before it releases the slot.
    pub async fn tick(&self) -> Option<SyncReport> {
        let mut report = None;
        loop {
            let mut slot = match self.slot.try_lock() {
                Ok(slot) => slot,
                Err(_) => {
                    self.pending.store(true, Ordering::SeqCst);
                    // The holder may have released the slot before the flag was set.
                    match self.slot.try_lock() {
                        Ok(slot) => slot,
                        Err(_) => {
                            debug!("Sync pass already running, marked pending");
                            return report;
                        }
                    }
                }
            };

            report = Some(self.run_pass(&mut slot).await);
            while self.pending.swap(false, Ordering::SeqCst) {
                debug!("Running pending sync pass");
                report = Some(self.run_pass(&mut slot).await);
            }
            drop(slot);

            if !self.pending.load(Ordering::SeqCst) {
                return report;
            }
        }
    }

    /// Run one pass now, waiting for any pass in flight to finish first.
    /// Ticks that arrived meanwhile are run before returning.
    pub async fn poll_once(&self) -> SyncReport {
        let mut slot = self.slot.lock().await;
        let report = self.run_pass(&mut slot).await;
        drop(slot);

        if self.pending.swap(false, Ordering::SeqCst) {
            if let Some(pending) = self.tick().await {
                return pending;
            }
        }
        report
    }

    async fn run_pass(&self, slot: &mut AddressData) -> SyncReport {
        self.set_state(EngineState::Polling);

        let tip = match self.provider.get_last_known_block().await {
            Ok(tip) => tip,
            Err(e) => {
                warn!("Failed to fetch chain tip: {}", e);
                self.set_state(EngineState::Idle);
                return SyncReport::without_update(SyncOutcome::TipUnavailable, None);
            }
        };

        if self
            .last_known_block()
            .is_some_and(|known| known.hash == tip.hash)
        {
            debug!("Tip unchanged at height {}", tip.height);
            self.set_state(EngineState::Idle);
            return SyncReport::without_update(SyncOutcome::Unchanged, Some(tip));
        }

        self.set_state(EngineState::Updating);
        let report = self.update(slot, tip).await;
        self.set_state(EngineState::Idle);
        report
    }

    async fn update(&self, slot: &mut AddressData, tip: BlockInfo) -> SyncReport {
        let start_height = tip.height.saturating_sub(self.config.reorg_safe_depth);
        info!(
            "New block {} at height {}, refreshing {} addresses from height {}",
            tip.hash,
            tip.height,
            self.addresses.len(),
            start_height
        );

        let mut tracker = SyncProgressTracker::new(start_height, self.addresses.len());
        self.state.progress.publish(tracker.percent());

        for (i, address) in self.addresses.iter().enumerate() {
            let mut failed = false;

            match fetch_recent_transactions(
                self.provider.as_ref(),
                address,
                start_height,
                self.config.page_size,
            )
            .await
            {
                Ok(entries) => {
                    tracker.record_history(entries.len());
                    slot.history[i] = entries;
                }
                Err(e) => {
                    error!("Failed to fetch history for {}: {}", address, e);
                    slot.history[i].clear();
                    failed = true;
                }
            }
            self.state.history.publish(slot.history.concat());

            match self.provider.get_utxos(address).await {
                Ok(utxos) => {
                    tracker.record_utxos(utxos.len());
                    slot.utxos[i] = utxos;
                }
                Err(e) => {
                    error!("Failed to fetch UTXOs for {}: {}", address, e);
                    slot.utxos[i].clear();
                    failed = true;
                }
            }
            self.state.publish_utxos(slot.utxos.concat());

            tracker.record_address(address, failed);
            self.state.progress.publish(tracker.percent());
        }

        let stats = tracker.get_stats();
        if tracker.has_failures() {
            warn!(
                "{}; block {} not recorded, retrying next tick",
                stats.summary(),
                tip.height
            );
            return SyncReport::with_stats(SyncOutcome::Partial, tip, stats);
        }

        info!("{}", stats.summary());
        *self
            .last_known_block
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tip.clone());
        SyncReport::with_stats(SyncOutcome::Updated, tip, stats)
    }
}

/// Handle to a running poll loop
pub struct SyncHandle {
    task: JoinHandle<()>,
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl SyncHandle {
    /// Stop the timer. A pass already in flight runs to completion.
    pub fn stop(&self) {
        info!("Stopping wallet sync");
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
