// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Shared cpu and memory budget for tasks in flight.
//!
//! Requests are served strictly in arrival order: a request that does not fit
//! blocks the ones queued behind it until enough is released. Nothing is
//! ever handed out beyond the ceiling.

use crate::config::{Memory, ResourceCeiling};
use crate::errors::ProfileError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug)]
struct PoolState {
    cpus: usize,
    memory: Memory,
    queue: VecDeque<u64>,
    next_ticket: u64,
}

#[derive(Debug)]
struct PoolInner {
    ceiling: ResourceCeiling,
    state: Mutex<PoolState>,
    released: Notify,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // State is plain counters; a panic while holding the lock cannot leave it torn.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone)]
pub struct ResourcePool {
    inner: Arc<PoolInner>,
}

/// Resources held by one task. Returned to the pool on drop.
#[derive(Debug)]
pub struct ResourceGuard {
    inner: Arc<PoolInner>,
    cpus: usize,
    memory: Memory,
}

impl ResourceGuard {
    pub fn cpus(&self) -> usize {
        self.cpus
    }

    pub fn memory(&self) -> Memory {
        self.memory
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        {
            let mut state = self.inner.lock();
            state.cpus += self.cpus;
            state.memory = state.memory.saturating_add(self.memory);
        }
        self.inner.released.notify_waiters();
    }
}

/// Place in line; leaves the queue if the waiting future is dropped.
struct Ticket<'a> {
    inner: &'a PoolInner,
    id: u64,
    served: bool,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if self.served {
            return;
        }
        self.inner.lock().queue.retain(|t| *t != self.id);
        self.inner.released.notify_waiters();
    }
}

impl ResourcePool {
    pub fn new(ceiling: ResourceCeiling) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                ceiling,
                state: Mutex::new(PoolState {
                    cpus: ceiling.cpus,
                    memory: ceiling.memory,
                    queue: VecDeque::new(),
                    next_ticket: 0,
                }),
                released: Notify::new(),
            }),
        }
    }

    pub fn ceiling(&self) -> ResourceCeiling {
        self.inner.ceiling
    }

    /// Currently unallocated cpus and memory.
    pub fn available(&self) -> (usize, Memory) {
        let state = self.inner.lock();
        (state.cpus, state.memory)
    }

    /// Wait until `cpus` and `memory` are free and every earlier request has
    /// been served, then take them.
    ///
    /// A request larger than the ceiling could never be served and fails
    /// immediately.
    pub async fn acquire(
        &self,
        label: &str,
        cpus: usize,
        memory: Memory,
    ) -> Result<ResourceGuard, ProfileError> {
        let ceiling = self.inner.ceiling;
        if cpus > ceiling.cpus || memory > ceiling.memory {
            return Err(ProfileError::ExceedsResourceCeiling {
                label: label.to_string(),
                cpus,
                memory,
                max_cpus: ceiling.cpus,
                max_memory: ceiling.memory,
            });
        }

        let mut ticket = {
            let mut state = self.inner.lock();
            let id = state.next_ticket;
            state.next_ticket += 1;
            state.queue.push_back(id);
            Ticket {
                inner: &self.inner,
                id,
                served: false,
            }
        };

        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            {
                let mut state = self.inner.lock();
                let first_in_line = state.queue.front() == Some(&ticket.id);
                if first_in_line && state.cpus >= cpus && state.memory >= memory {
                    state.cpus -= cpus;
                    state.memory = state.memory.saturating_sub(memory);
                    state.queue.pop_front();
                    ticket.served = true;
                    drop(state);
                    // The next in line may fit in what is left.
                    self.inner.released.notify_waiters();
                    return Ok(ResourceGuard {
                        inner: self.inner.clone(),
                        cpus,
                        memory,
                    });
                }
            }

            released.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn pool(cpus: usize, gb: u64) -> ResourcePool {
        ResourcePool::new(ResourceCeiling {
            cpus,
            memory: Memory::from_gb(gb),
        })
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let pool = pool(8, 64);
        let guard = pool.acquire("process_medium", 6, Memory::from_gb(36)).await.unwrap();
        assert_eq!(pool.available(), (2, Memory::from_gb(28)));
        assert_eq!(guard.cpus(), 6);
        drop(guard);
        assert_eq!(pool.available(), (8, Memory::from_gb(64)));
    }

    #[tokio::test]
    async fn test_request_above_ceiling_fails() {
        let pool = pool(4, 16);
        let err = pool
            .acquire("process_high", 12, Memory::from_gb(72))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProfileError::ExceedsResourceCeiling { max_cpus: 4, .. }
        ));
    }

    #[tokio::test]
    async fn test_never_oversubscribes() {
        let pool = pool(4, 100);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = pool.acquire("process_low", 2, Memory::from_gb(12)).await.unwrap();
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(pool.available(), (4, Memory::from_gb(100)));
    }

    #[tokio::test]
    async fn test_waiter_proceeds_when_released() {
        let pool = pool(6, 36);
        let first = pool.acquire("process_medium", 6, Memory::from_gb(36)).await.unwrap();

        let waiting = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire("process_single", 1, Memory::from_gb(6)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(first);
        let guard = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(guard.cpus(), 1);
    }

    #[tokio::test]
    async fn test_requests_are_served_in_arrival_order() {
        let pool = pool(4, 100);
        let held = pool.acquire("process_low", 3, Memory::from_gb(1)).await.unwrap();

        // Queued first and does not fit yet.
        let big = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire("process_low", 4, Memory::from_gb(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Would fit right now, but must wait behind the larger request.
        let small = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire("process_single", 1, Memory::from_gb(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!small.is_finished());

        drop(held);
        let big_guard = big.await.unwrap().unwrap();
        assert!(!small.is_finished());
        drop(big_guard);
        assert_eq!(small.await.unwrap().unwrap().cpus(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_wait_leaves_the_queue() {
        let pool = pool(2, 10);
        let held = pool.acquire("process_low", 2, Memory::from_gb(1)).await.unwrap();

        let abandoned = pool.acquire("process_low", 2, Memory::from_gb(1));
        assert!(tokio::time::timeout(Duration::from_millis(20), abandoned)
            .await
            .is_err());

        drop(held);
        let again = tokio::time::timeout(
            Duration::from_secs(1),
            pool.acquire("process_single", 1, Memory::from_gb(1)),
        )
        .await;
        assert!(again.unwrap().is_ok());
    }
}
