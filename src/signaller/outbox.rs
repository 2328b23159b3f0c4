use tokio::sync::{Mutex, Notify};

use crate::signaller::ExchangeId;

/// The one outbound message not handed to the transport yet. Only the newest
/// offer is worth sending, so a new message replaces an unsent older one.
#[derive(Debug, Default)]
pub struct Outbox<T> {
    slot: Mutex<Option<(ExchangeId, T)>>,
    ready: Notify,
}

impl<T> Outbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Notify::new(),
        }
    }

    pub async fn put(&self, exchange: ExchangeId, message: T) {
        if let Some((replaced, _)) = self.slot.lock().await.replace((exchange, message)) {
            debug!("Offer of exchange {} replaced before it was sent", replaced);
        }
        self.ready.notify_one();
    }

    /// Drops the message of `exchange` if it is still waiting.
    pub async fn withdraw(&self, exchange: ExchangeId) -> bool {
        let mut slot = self.slot.lock().await;
        if matches!(slot.as_ref(), Some((waiting, _)) if *waiting == exchange) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Puts back a message the transport refused, unless a newer one arrived.
    pub async fn restore(&self, exchange: ExchangeId, message: T) {
        let mut slot = self.slot.lock().await;
        if slot.is_none() {
            *slot = Some((exchange, message));
            self.ready.notify_one();
        }
    }

    pub async fn try_take(&self) -> Option<(ExchangeId, T)> {
        self.slot.lock().await.take()
    }

    /// Waits until a message is waiting, without taking it.
    pub async fn wait(&self) {
        loop {
            if self.slot.lock().await.is_some() {
                return;
            }
            self.ready.notified().await;
        }
    }

    pub async fn take(&self) -> (ExchangeId, T) {
        loop {
            if let Some(message) = self.try_take().await {
                return message;
            }
            self.ready.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn newer_message_replaces_unsent_one() {
        let outbox = Outbox::new();
        outbox.put(1, "first").await;
        outbox.put(2, "second").await;
        assert_eq!(outbox.take().await, (2, "second"));
        assert!(outbox.try_take().await.is_none());
    }

    #[tokio::test]
    async fn withdraw_only_drops_the_named_exchange() {
        let outbox = Outbox::new();
        outbox.put(3, "offer").await;
        assert!(!outbox.withdraw(2).await);
        assert!(outbox.withdraw(3).await);
        assert!(timeout(Duration::from_millis(50), outbox.wait()).await.is_err());
    }

    #[tokio::test]
    async fn restore_never_overwrites_a_newer_message() {
        let outbox = Outbox::new();
        outbox.put(5, "newer").await;
        outbox.restore(4, "refused").await;
        assert_eq!(outbox.take().await, (5, "newer"));

        outbox.restore(5, "newer").await;
        assert_eq!(outbox.take().await, (5, "newer"));
    }

    #[tokio::test]
    async fn take_waits_for_a_message() {
        let outbox = std::sync::Arc::new(Outbox::new());
        let waiter = tokio::spawn({
            let outbox = outbox.clone();
            async move { outbox.take().await }
        });
        tokio::task::yield_now().await;
        outbox.put(9, "late").await;
        assert_eq!(timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap(), (9, "late"));
    }
}
