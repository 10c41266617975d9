//! One-shot latching signals tracked per registered video.
//!
//! Backed by tokio `watch` channels so waiters that subscribe after a
//! signal was raised still resolve immediately.

use std::collections::HashMap;

use marquee_common::Signal;
use tokio::sync::watch;

const ALL_SIGNALS: [Signal; 3] = [
    Signal::Registered,
    Signal::UserInteracted,
    Signal::PlaybackDelegated,
];

pub struct SignalSet {
    channels: HashMap<Signal, watch::Sender<bool>>,
}

impl SignalSet {
    pub fn new() -> Self {
        let mut channels = HashMap::new();
        for signal in ALL_SIGNALS {
            let (tx, _rx) = watch::channel(false);
            channels.insert(signal, tx);
        }
        Self { channels }
    }

    /// Latches the signal. Raising an already-raised signal is a no-op.
    pub fn signal(&self, signal: Signal) {
        if let Some(tx) = self.channels.get(&signal) {
            tx.send_replace(true);
        }
    }

    pub fn is_signaled(&self, signal: Signal) -> bool {
        self.channels.get(&signal).is_some_and(|tx| *tx.borrow())
    }

    /// Receiver for a spawned waiter; pair with `watch::Receiver::wait_for`.
    pub fn subscribe(&self, signal: Signal) -> Option<watch::Receiver<bool>> {
        self.channels.get(&signal).map(watch::Sender::subscribe)
    }

    /// Resolves once the signal has been raised, immediately if it already
    /// was.
    pub async fn when(&self, signal: Signal) {
        let Some(mut rx) = self.subscribe(signal) else {
            return;
        };
        let _ = rx.wait_for(|raised| *raised).await;
    }
}

impl Default for SignalSet {
    fn default() -> Self {
        Self::new()
    }
}
