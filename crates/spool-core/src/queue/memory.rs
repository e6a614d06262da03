//! In-memory bounded FIFO shared by the ingress path and the workers.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Pause between attempts in [`BoundedQueue::offer_until`].
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Rejected offer. The item is handed back to the caller.
#[derive(PartialEq, Eq)]
pub enum OfferError<T> {
    Full(T),
    Closed(T),
}

impl<T> OfferError<T> {
    pub fn into_inner(self) -> T {
        match self {
            OfferError::Full(item) | OfferError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for OfferError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferError::Full(_) => f.write_str("Full(..)"),
            OfferError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for OfferError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferError::Full(_) => f.write_str("queue is full"),
            OfferError::Closed(_) => f.write_str("queue is closed"),
        }
    }
}

impl<T> std::error::Error for OfferError<T> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReserveError {
    #[error("queue is full")]
    Full,

    #[error("queue is closed")]
    Closed,
}

struct Inner<T> {
    items: VecDeque<T>,
    /// Slots promised to outstanding permits.
    reserved: usize,
    closed: bool,
}

/// Fixed-capacity FIFO.
///
/// Design:
/// - One short `std::sync::Mutex` section per operation, never held across
///   an await.
/// - `Notify` wakes takers; a taker that leaves items behind passes the
///   wakeup on so bursts are not lost.
/// - Reserved slots count against capacity until the permit is used or
///   dropped.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    available: Notify,
    /// Signalled when the last outstanding reservation is used or dropped.
    settled: Notify,
}

impl<T> BoundedQueue<T> {
    /// `capacity` of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                reserved: 0,
                closed: false,
            }),
            capacity,
            available: Notify::new(),
            settled: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items currently queued (reservations not included).
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Single non-blocking attempt.
    pub fn try_offer(&self, item: T) -> Result<(), OfferError<T>> {
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(OfferError::Closed(item));
            }
            if inner.items.len() + inner.reserved >= self.capacity {
                return Err(OfferError::Full(item));
            }
            inner.items.push_back(item);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Reserve one slot without enqueueing anything yet.
    pub fn try_reserve(&self) -> Result<Permit<'_, T>, ReserveError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(ReserveError::Closed);
        }
        if inner.items.len() + inner.reserved >= self.capacity {
            return Err(ReserveError::Full);
        }
        inner.reserved += 1;
        Ok(Permit {
            queue: self,
            used: false,
        })
    }

    pub fn try_take(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Wait for the next item.
    ///
    /// Returns `None` once `cancel` fires, or when the queue is closed and
    /// empty. Cancellation wins over queued items.
    pub async fn take(&self, cancel: &CancellationToken) -> Option<T> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            // Register before checking so an offer in between is not missed.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if let Some(item) = inner.items.pop_front() {
                    let more = !inner.items.is_empty();
                    drop(inner);
                    if more {
                        self.available.notify_one();
                    }
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    /// Offer repeatedly until it succeeds, sleeping `interval` between
    /// attempts. Gives up (returning `false`) as soon as `cancel` fires or
    /// the queue is closed.
    ///
    /// Runs on the caller's task; nothing is spawned.
    pub async fn offer_until(
        &self,
        item: T,
        cancel: &CancellationToken,
        interval: Duration,
    ) -> bool {
        let interval = if interval.is_zero() {
            DEFAULT_RETRY_INTERVAL
        } else {
            interval
        };
        let mut item = item;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            match self.try_offer(item) {
                Ok(()) => return true,
                Err(OfferError::Closed(_)) => return false,
                Err(OfferError::Full(back)) => item = back,
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Refuse further offers and reservations; wake every waiting taker.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
    }

    /// Remove and return everything still queued.
    pub fn drain(&self) -> Vec<T> {
        self.lock().items.drain(..).collect()
    }

    /// Slots currently promised to outstanding permits.
    pub fn reserved(&self) -> usize {
        self.lock().reserved
    }

    /// Wait until no permit is outstanding.
    ///
    /// Once the queue is closed no new permits can be issued, so after this
    /// returns `drain` sees every item that will ever be sent.
    pub async fn settled(&self) {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.lock().reserved == 0 {
                return;
            }
            notified.await;
        }
    }

    fn release(&self, inner: &mut Inner<T>) {
        inner.reserved -= 1;
        if inner.reserved == 0 {
            self.settled.notify_waiters();
        }
    }
}

/// A reserved slot in a [`BoundedQueue`]. Dropping it unused frees the slot.
pub struct Permit<'a, T> {
    queue: &'a BoundedQueue<T>,
    used: bool,
}

impl<T> Permit<'_, T> {
    /// Fill the reserved slot.
    pub fn send(mut self, item: T) {
        {
            let mut inner = self.queue.lock();
            self.queue.release(&mut inner);
            inner.items.push_back(item);
        }
        self.used = true;
        self.queue.available.notify_one();
    }
}

impl<T> Drop for Permit<'_, T> {
    fn drop(&mut self) {
        if !self.used {
            let mut inner = self.queue.lock();
            self.queue.release(&mut inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn fifo_order() {
        let queue = BoundedQueue::new(3);
        queue.try_offer(1).unwrap();
        queue.try_offer(2).unwrap();
        queue.try_offer(3).unwrap();
        assert_eq!(queue.try_take(), Some(1));
        assert_eq!(queue.try_take(), Some(2));
        assert_eq!(queue.try_take(), Some(3));
        assert_eq!(queue.try_take(), None);
    }

    #[test]
    fn full_queue_hands_item_back() {
        let queue = BoundedQueue::new(1);
        queue.try_offer("a").unwrap();
        let err = queue.try_offer("b").unwrap_err();
        assert_eq!(err, OfferError::Full("b"));
        assert_eq!(err.into_inner(), "b");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let queue = BoundedQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.try_offer(()).unwrap();
        assert!(queue.try_offer(()).is_err());
    }

    #[test]
    fn reservations_count_against_capacity() {
        let queue = BoundedQueue::new(1);
        let permit = queue.try_reserve().unwrap();
        assert_eq!(queue.try_reserve().err(), Some(ReserveError::Full));
        assert!(matches!(queue.try_offer(9), Err(OfferError::Full(9))));

        permit.send(7);
        assert_eq!(queue.try_take(), Some(7));
    }

    #[test]
    fn dropped_permit_frees_the_slot() {
        let queue = BoundedQueue::<u8>::new(1);
        drop(queue.try_reserve().unwrap());
        assert!(queue.is_empty());
        queue.try_offer(1).unwrap();
    }

    #[test]
    fn closed_queue_refuses_offers_and_reservations() {
        let queue = BoundedQueue::new(2);
        queue.try_offer(1).unwrap();
        queue.close();
        assert!(queue.is_closed());
        assert!(matches!(queue.try_offer(2), Err(OfferError::Closed(2))));
        assert_eq!(queue.try_reserve().err(), Some(ReserveError::Closed));
        assert_eq!(queue.drain(), vec![1]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn drain_after_settled_sees_late_send() {
        let queue = Arc::new(BoundedQueue::new(2));
        let permit = queue.try_reserve().unwrap();
        queue.close();

        let drainer = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move {
                queue.settled().await;
                queue.drain()
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!drainer.is_finished());
        assert_eq!(queue.reserved(), 1);

        permit.send(42);
        let drained = tokio::time::timeout(Duration::from_secs(1), drainer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(drained, vec![42]);
        assert!(queue.is_empty());
        assert_eq!(queue.reserved(), 0);
    }

    #[tokio::test]
    async fn dropped_permit_settles_the_queue() {
        let queue = BoundedQueue::<u8>::new(1);
        queue.settled().await;

        let permit = queue.try_reserve().unwrap();
        queue.close();
        drop(permit);
        tokio::time::timeout(Duration::from_secs(1), queue.settled())
            .await
            .unwrap();
        assert!(queue.drain().is_empty());
    }

    #[tokio::test]
    async fn take_waits_for_offer() {
        let queue = Arc::new(BoundedQueue::new(1));
        let cancel = CancellationToken::new();

        let taker = tokio::spawn({
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            async move { queue.take(&cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.try_offer(5).unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), taker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Some(5));
    }

    #[tokio::test]
    async fn burst_wakes_every_taker() {
        let queue = Arc::new(BoundedQueue::new(4));
        let cancel = CancellationToken::new();

        let takers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let cancel = cancel.clone();
                tokio::spawn(async move { queue.take(&cancel).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        for i in 0..4 {
            queue.try_offer(i).unwrap();
        }

        let mut got = Vec::new();
        for taker in takers {
            let item = tokio::time::timeout(Duration::from_secs(1), taker)
                .await
                .unwrap()
                .unwrap();
            got.push(item.unwrap());
        }
        got.sort();
        assert_eq!(got, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn take_returns_none_on_cancel() {
        let queue = Arc::new(BoundedQueue::<u32>::new(1));
        let cancel = CancellationToken::new();

        let taker = tokio::spawn({
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            async move { queue.take(&cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let got = tokio::time::timeout(Duration::from_secs(1), taker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn cancellation_wins_over_queued_items() {
        let queue = BoundedQueue::new(1);
        queue.try_offer(1).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(queue.take(&cancel).await, None);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn take_returns_none_once_closed_and_empty() {
        let queue = Arc::new(BoundedQueue::<u32>::new(1));
        let cancel = CancellationToken::new();

        let taker = tokio::spawn({
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            async move { queue.take(&cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let got = tokio::time::timeout(Duration::from_secs(1), taker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn offer_until_gives_up_on_cancel() {
        let queue = BoundedQueue::new(1);
        queue.try_offer(0).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let ok = queue
            .offer_until(1, &cancel, Duration::from_millis(10))
            .await;
        assert!(!ok);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(queue.drain(), vec![0]);
    }

    #[tokio::test]
    async fn offer_until_succeeds_once_space_frees() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.try_offer(0).unwrap();

        let consumer = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                queue.try_take()
            }
        });

        let cancel = CancellationToken::new();
        let ok = queue
            .offer_until(1, &cancel, Duration::from_millis(5))
            .await;
        assert!(ok);
        assert_eq!(consumer.await.unwrap(), Some(0));
        assert_eq!(queue.try_take(), Some(1));
    }

    #[tokio::test]
    async fn offer_until_stops_when_closed() {
        let queue = BoundedQueue::new(1);
        queue.close();
        let cancel = CancellationToken::new();
        assert!(!queue.offer_until(1, &cancel, Duration::ZERO).await);
    }
}
