// ABOUTME: Fixed-capacity FIFO of reusable buffers shared between one producer and one consumer
// ABOUTME: Implements the BLOCK / DISCARD / REPLACE_RANDOM overflow policies of spec.md §3/§4.2

use rand::Rng;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// What a producer should do when every pooled slot is already queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wait for a free slot.
    Block,
    /// Evict the oldest queued item and recycle it as the write slot.
    Discard,
    /// Evict a uniformly-random queued item and recycle it as the write slot.
    ReplaceRandom,
}

struct Inner<T> {
    pool: Vec<T>,
    queue: VecDeque<T>,
}

/// A fixed-capacity FIFO of pre-allocated `T` plus the free pool those
/// items are drawn from. At equilibrium every slot is owned by exactly one
/// of: the free pool, the queue, or a producer/consumer guard currently
/// checking it out (see [`PushGuard`]).
pub struct PooledQueue<T> {
    policy: OverflowPolicy,
    inner: Mutex<Option<Inner<T>>>,
    not_empty: Notify,
    not_full: Notify,
}

impl<T: Send> PooledQueue<T> {
    pub fn new(policy: OverflowPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(None),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Allocate `capacity` items via `factory` into the free pool. Must be
    /// called exactly once before first use.
    pub fn initialise(&self, capacity: usize, factory: impl Fn() -> T) {
        let mut guard = self.inner.lock().unwrap();
        assert!(guard.is_none(), "PooledQueue::initialise called twice");
        *guard = Some(Inner {
            pool: (0..capacity).map(|_| factory()).collect(),
            queue: VecDeque::with_capacity(capacity),
        });
    }

    /// Acquire a free slot to fill, blocking under [`OverflowPolicy::Block`]
    /// until one is available or `token` fires. Under `Discard`/
    /// `ReplaceRandom` this never blocks once the queue is full: a queued
    /// item is evicted and recycled as the returned slot.
    pub async fn begin_push(&self, token: &CancellationToken) -> PushGuard<'_, T> {
        loop {
            if let Some(item) = self.try_acquire_slot() {
                return PushGuard {
                    queue: self,
                    item: Some(item),
                };
            }

            tokio::select! {
                _ = self.not_full.notified() => continue,
                _ = token.cancelled() => {
                    return PushGuard { queue: self, item: None };
                }
            }
        }
    }

    fn try_acquire_slot(&self) -> Option<T> {
        let mut guard = self.inner.lock().unwrap();
        let inner = guard.as_mut().expect("PooledQueue not initialised");

        if let Some(item) = inner.pool.pop() {
            return Some(item);
        }

        match self.policy {
            OverflowPolicy::Block => None,
            OverflowPolicy::Discard => inner.queue.pop_front(),
            OverflowPolicy::ReplaceRandom => {
                if inner.queue.is_empty() {
                    None
                } else {
                    let idx = rand::thread_rng().gen_range(0..inner.queue.len());
                    inner.queue.remove(idx)
                }
            }
        }
    }

    fn commit_push(&self, item: T) {
        let mut guard = self.inner.lock().unwrap();
        let inner = guard.as_mut().expect("PooledQueue not initialised");
        inner.queue.push_back(item);
        drop(guard);
        self.not_empty.notify_one();
    }

    /// Block until an item is at the head, then apply `f` to it without
    /// dequeuing. Returns `None` if `token` fires first.
    pub async fn peek<F, R>(&self, token: &CancellationToken, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        loop {
            {
                let guard = self.inner.lock().unwrap();
                let inner = guard.as_ref().expect("PooledQueue not initialised");
                if let Some(head) = inner.queue.front() {
                    return Some(f(head));
                }
            }

            tokio::select! {
                _ = self.not_empty.notified() => continue,
                _ = token.cancelled() => return None,
            }
        }
    }

    /// Remove the head and return its slot to the pool. No-op if empty.
    pub fn pop(&self) {
        let mut guard = self.inner.lock().unwrap();
        let inner = guard.as_mut().expect("PooledQueue not initialised");
        if let Some(item) = inner.queue.pop_front() {
            inner.pool.push(item);
            drop(guard);
            self.not_full.notify_one();
        }
    }

    pub fn is_empty(&self) -> bool {
        let guard = self.inner.lock().unwrap();
        guard.as_ref().is_none_or(|inner| inner.queue.is_empty())
    }
}

/// A checked-out write slot. `get_mut` exposes it for the producer to fill;
/// on drop it is committed to the queue tail, unless the push was cancelled
/// before a slot could be acquired (in which case there is nothing to
/// commit).
pub struct PushGuard<'q, T: Send> {
    queue: &'q PooledQueue<T>,
    item: Option<T>,
}

impl<T: Send> PushGuard<'_, T> {
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.item.as_mut()
    }
}

impl<T: Send> Drop for PushGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.queue.commit_push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn push(queue: &PooledQueue<i32>, token: &CancellationToken, value: i32) {
        let mut guard = queue.begin_push(token).await;
        *guard.get_mut().unwrap() = value;
    }

    #[tokio::test]
    async fn block_policy_delivers_every_item_in_order() {
        let queue = PooledQueue::new(OverflowPolicy::Block);
        queue.initialise(2, || 0);
        let token = CancellationToken::new();

        for i in 0..5 {
            push(&queue, &token, i).await;
            let seen = queue.peek(&token, |v| *v).await;
            assert_eq!(seen, Some(i));
            queue.pop();
        }
    }

    #[tokio::test]
    async fn discard_evicts_oldest_without_blocking() {
        let queue = PooledQueue::new(OverflowPolicy::Discard);
        queue.initialise(2, || 0);
        let token = CancellationToken::new();

        push(&queue, &token, 0).await;
        push(&queue, &token, 1).await;
        push(&queue, &token, 2).await; // evicts 0

        let mut seen = Vec::new();
        while !queue.is_empty() {
            seen.push(queue.peek(&token, |v| *v).await.unwrap());
            queue.pop();
        }
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn begin_push_respects_cancellation() {
        let queue = PooledQueue::new(OverflowPolicy::Block);
        queue.initialise(1, || 0);
        let token = CancellationToken::new();

        let mut g1 = queue.begin_push(&token).await;
        *g1.get_mut().unwrap() = 10;
        drop(g1); // queue now full, pool empty

        token.cancel();
        let g2 = tokio::time::timeout(Duration::from_millis(50), queue.begin_push(&token))
            .await
            .unwrap();
        assert!(g2.item.is_none());
    }

    #[tokio::test]
    async fn empty_reports_correctly() {
        let queue = PooledQueue::new(OverflowPolicy::Block);
        queue.initialise(1, || 0);
        assert!(queue.is_empty());

        let token = CancellationToken::new();
        push(&queue, &token, 1).await;
        assert!(!queue.is_empty());
        queue.pop();
        assert!(queue.is_empty());
    }
}
