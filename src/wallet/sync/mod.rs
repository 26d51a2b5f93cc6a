//! Wallet Synchronization Module
//!
//! Keeps the wallet's history, UTXO set, balance and progress in step with the
//! chain by polling a [`BlockchainDataProvider`](crate::provider::BlockchainDataProvider):
//!
//! - `engine`: the polling state machine and its timer task.
//! - `events`: observable channels the engine publishes wallet state through.
//! - `history`: paginated history fetching.
//! - `progress_tracker`: per-pass counters, percentages and summaries.

/// Polling state machine
pub mod engine;
/// Observable wallet state channels
pub mod events;
/// Paginated history fetching
pub mod history;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;

pub use engine::{EngineState, SyncHandle, WalletSyncEngine};
pub use events::{Channel, SubscriptionId, WalletState, balance_of};
pub use progress_tracker::{SyncOutcome, SyncReport, SyncStats};
