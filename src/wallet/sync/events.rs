//! Observable wallet state.
//!
//! Every piece of state the sync engine maintains is published through a
//! [`Channel`]: a current value plus an ordered registry of subscribers.
//! Subscribers are called synchronously, in the order they registered, each
//! time the value changes. A subscriber is also called once with the current
//! value at registration, so late subscribers never miss the latest state.
//!
//! Channels are read-only to consumers; only the sync engine publishes.

use crate::provider::{TransactionHistoryEntry, UTxO};
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by [`Channel::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct ChannelInner<T> {
    value: T,
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber<T>)>,
    streams: Vec<UnboundedSender<T>>,
}

/// A value that can be read, observed and (inside the crate) replaced.
pub struct Channel<T> {
    inner: Arc<Mutex<ChannelInner<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> Channel<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChannelInner {
                value: initial,
                next_id: 0,
                subscribers: Vec::new(),
                streams: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Register `subscriber`. It is called immediately with the current value
    /// and then after every change.
    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let subscriber: Subscriber<T> = Arc::new(subscriber);
        let (id, current) = {
            let mut inner = self.lock();
            let id = SubscriptionId(inner.next_id);
            inner.next_id += 1;
            inner.subscribers.push((id, subscriber.clone()));
            (id, inner.value.clone())
        };
        subscriber(&current);
        id
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(registered, _)| *registered != id);
        inner.subscribers.len() != before
    }

    /// Stream of values, starting with the current one. The stream ends when
    /// the channel is dropped.
    pub fn updates(&self) -> UnboundedReceiver<T> {
        let (sender, receiver) = unbounded();
        let mut inner = self.lock();
        if sender.unbounded_send(inner.value.clone()).is_ok() {
            inner.streams.push(sender);
        }
        receiver
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Replace the value and notify observers if it changed.
    pub(crate) fn publish(&self, value: T) {
        let subscribers: Vec<Subscriber<T>> = {
            let mut inner = self.lock();
            if inner.value == value {
                return;
            }
            inner.value = value.clone();
            inner
                .streams
                .retain(|stream| stream.unbounded_send(value.clone()).is_ok());
            inner
                .subscribers
                .iter()
                .map(|(_, subscriber)| subscriber.clone())
                .collect()
        };

        for subscriber in subscribers {
            subscriber(&value);
        }
    }
}

/// Balance implied by a UTXO set.
pub fn balance_of(utxos: &[UTxO]) -> u64 {
    utxos.iter().map(|utxo| utxo.amount).sum()
}

/// The wallet's observable state, shared between the engine and the wallet.
#[derive(Clone)]
pub struct WalletState {
    pub history: Channel<Vec<TransactionHistoryEntry>>,
    pub utxos: Channel<Vec<UTxO>>,
    /// Always equal to [`balance_of`] the current UTXO set.
    pub balance: Channel<u64>,
    /// Progress of the current or last sync pass, 0 to 100.
    pub progress: Channel<u8>,
}

impl WalletState {
    pub fn new() -> Self {
        Self {
            history: Channel::new(Vec::new()),
            utxos: Channel::new(Vec::new()),
            balance: Channel::new(0),
            progress: Channel::new(0),
        }
    }

    /// Replace the UTXO set and republish the balance derived from it.
    pub(crate) fn publish_utxos(&self, utxos: Vec<UTxO>) {
        let balance = balance_of(&utxos);
        self.utxos.publish(utxos);
        self.balance.publish(balance);
    }
}

impl Default for WalletState {
    fn default() -> Self {
        Self::new()
    }
}
