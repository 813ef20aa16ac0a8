//! Per-module reader/writer concurrency control (§5).
//!
//! Each module name maps to its own lock; operations on distinct modules
//! never contend. Read locks are reentrant per caller (a nested read within
//! the same logical operation is free); write locks are not, and a caller
//! that already holds any lock on a module fails fast rather than waiting on
//! itself. Both kinds poll on a bounded interval up to a total deadline,
//! surfacing `DeadlockSuspected` on timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::config::TddbConfig;
use crate::error::{Result, TddbError};

/// Identifies the logical caller across a chain of nested lock acquisitions,
/// so reentrant read locks can be recognized as belonging to the same
/// operation rather than to unrelated concurrent tasks. Registry Core
/// operations mint one token per top-level call and thread it through every
/// nested lock acquisition they perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(u64);

/// Mints fresh, process-unique `LockToken`s.
#[derive(Debug, Default)]
pub struct LockTokenSource {
    next: AtomicU64,
}

impl LockTokenSource {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_token(&self) -> LockToken {
        LockToken(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
struct LockState {
    /// Caller token -> nested read depth. A caller appears here while it
    /// holds at least one read lock.
    readers: HashMap<u64, u32>,
    /// Number of writers currently holding or waiting for the lock. Bumped
    /// as soon as a writer starts waiting so new (non-reentrant) readers
    /// block behind it instead of starving it.
    writers: u32,
    writer_holder: Option<u64>,
}

impl LockState {
    fn held_by(&self, token: LockToken) -> bool {
        self.readers.contains_key(&token.0) || self.writer_holder == Some(token.0)
    }
}

#[derive(Debug)]
struct ModuleLock {
    state: Mutex<LockState>,
    notify: Notify,
}

impl ModuleLock {
    fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            notify: Notify::new(),
        }
    }
}

/// Per-module multi-reader/single-writer locks with a deadlock guard.
///
/// Modules are never pre-declared: acquiring a lock for a name that has no
/// entry yet creates one. Whether a module must already exist in the
/// registry is a concern of the caller (the Registry Core checks the
/// Storage Port before acquiring in "must exist" mode), not of the lock
/// table itself.
pub struct LockManager {
    config: TddbConfig,
    modules: dashmap::DashMap<String, Arc<ModuleLock>>,
    pub tokens: LockTokenSource,
}

impl LockManager {
    pub fn new(config: TddbConfig) -> Self {
        Self {
            config,
            modules: dashmap::DashMap::new(),
            tokens: LockTokenSource::new(),
        }
    }

    fn lock_for(&self, module: &str) -> Arc<ModuleLock> {
        self.modules
            .entry(module.to_string())
            .or_insert_with(|| Arc::new(ModuleLock::new()))
            .clone()
    }

    /// Acquires a reentrant read lock. Nested calls with the same `token`
    /// on the same module stack for free.
    pub async fn acquire_read(&self, module: &str, token: LockToken) -> Result<ReadGuard> {
        let lock = self.lock_for(module);
        let deadline = Instant::now() + self.config.max_deadlock_wait;
        loop {
            {
                let mut state = lock.state.lock();
                if let Some(depth) = state.readers.get_mut(&token.0) {
                    *depth += 1;
                    drop(state);
                    return Ok(ReadGuard {
                        lock,
                        module: module.to_string(),
                        token,
                    });
                }
                if state.writers == 0 {
                    state.readers.insert(token.0, 1);
                    drop(state);
                    return Ok(ReadGuard {
                        lock,
                        module: module.to_string(),
                        token,
                    });
                }
            }
            debug!(module, kind = "read", "waiting for lock");
            wait_or_timeout(&lock, deadline, self.config.poll_interval(), || {
                TddbError::DeadlockSuspected {
                    module: module.to_string(),
                    kind: "read",
                    waited_ms: self.config.max_deadlock_wait.as_millis() as u64,
                }
            })
            .await?;
        }
    }

    /// Acquires the exclusive write lock. A caller that already holds any
    /// lock on this module (read or write) fails immediately with
    /// `DeadlockSuspected` rather than waiting on itself.
    pub async fn acquire_write(&self, module: &str, token: LockToken) -> Result<WriteGuard> {
        let lock = self.lock_for(module);
        {
            let state = lock.state.lock();
            if state.held_by(token) {
                return Err(TddbError::DeadlockSuspected {
                    module: module.to_string(),
                    kind: "write",
                    waited_ms: 0,
                });
            }
        }
        {
            let mut state = lock.state.lock();
            state.writers += 1;
        }
        let deadline = Instant::now() + self.config.max_deadlock_wait;
        loop {
            {
                let mut state = lock.state.lock();
                if state.readers.is_empty() && state.writer_holder.is_none() {
                    state.writer_holder = Some(token.0);
                    drop(state);
                    return Ok(WriteGuard {
                        lock,
                        module: module.to_string(),
                        token,
                    });
                }
            }
            if Instant::now() >= deadline {
                let mut state = lock.state.lock();
                state.writers = state.writers.saturating_sub(1);
                drop(state);
                lock.notify.notify_waiters();
                return Err(TddbError::DeadlockSuspected {
                    module: module.to_string(),
                    kind: "write",
                    waited_ms: self.config.max_deadlock_wait.as_millis() as u64,
                });
            }
            debug!(module, kind = "write", "waiting for lock");
            let remaining = deadline.saturating_duration_since(Instant::now());
            let wait = remaining.min(self.config.poll_interval());
            let _ = tokio::time::timeout(wait, lock.notify.notified()).await;
        }
    }
}

async fn wait_or_timeout(
    lock: &ModuleLock,
    deadline: Instant,
    poll_interval: Duration,
    on_timeout: impl FnOnce() -> TddbError,
) -> Result<()> {
    if Instant::now() >= deadline {
        return Err(on_timeout());
    }
    let remaining = deadline.saturating_duration_since(Instant::now());
    let wait = remaining.min(poll_interval);
    let _ = tokio::time::timeout(wait, lock.notify.notified()).await;
    Ok(())
}

/// Held while a caller has read access to a module. Dropping it releases
/// one level of nesting; the module becomes writable again once the last
/// nested guard for every reader is dropped.
pub struct ReadGuard {
    lock: Arc<ModuleLock>,
    module: String,
    token: LockToken,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock();
        if let Some(depth) = state.readers.get_mut(&self.token.0) {
            *depth -= 1;
            if *depth == 0 {
                state.readers.remove(&self.token.0);
            }
        }
        drop(state);
        self.lock.notify.notify_waiters();
        trace!(module = %self.module, "released read lock");
    }
}

/// Held while a caller has exclusive write access to a module.
#[derive(Debug)]
pub struct WriteGuard {
    lock: Arc<ModuleLock>,
    module: String,
    token: LockToken,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock();
        state.writer_holder = None;
        state.writers = state.writers.saturating_sub(1);
        drop(state);
        self.lock.notify.notify_waiters();
        trace!(module = %self.module, "released write lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    fn fast_config() -> TddbConfig {
        TddbConfig::default()
            .with_max_deadlock_wait_ms(200)
            .with_lock_poll_interval_ms(10)
    }

    #[tokio::test]
    async fn distinct_modules_never_contend() {
        let mgr = LockManager::new(fast_config());
        let t1 = mgr.tokens.next_token();
        let t2 = mgr.tokens.next_token();
        let _g1 = mgr.acquire_write("a", t1).await.unwrap();
        let _g2 = mgr.acquire_write("b", t2).await.unwrap();
    }

    #[tokio::test]
    async fn read_lock_is_reentrant() {
        let mgr = LockManager::new(fast_config());
        let t = mgr.tokens.next_token();
        let g1 = mgr.acquire_read("m", t).await.unwrap();
        let g2 = mgr.acquire_read("m", t).await.unwrap();
        drop(g1);
        drop(g2);
    }

    #[tokio::test]
    async fn concurrent_reads_are_allowed() {
        let mgr = StdArc::new(LockManager::new(fast_config()));
        let t1 = mgr.tokens.next_token();
        let t2 = mgr.tokens.next_token();
        let g1 = mgr.acquire_read("m", t1).await.unwrap();
        let g2 = mgr.acquire_read("m", t2).await.unwrap();
        drop(g1);
        drop(g2);
    }

    #[tokio::test]
    async fn writer_blocks_until_readers_drain() {
        let mgr = StdArc::new(LockManager::new(fast_config()));
        let reader_token = mgr.tokens.next_token();
        let writer_token = mgr.tokens.next_token();
        let read_guard = mgr.acquire_read("m", reader_token).await.unwrap();

        let mgr2 = mgr.clone();
        let writer = tokio::spawn(async move { mgr2.acquire_write("m", writer_token).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(read_guard);

        let result = writer.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn write_self_deadlock_fails_fast() {
        let mgr = LockManager::new(fast_config());
        let token = mgr.tokens.next_token();
        let _read = mgr.acquire_read("m", token).await.unwrap();
        let err = mgr.acquire_write("m", token).await.unwrap_err();
        assert!(matches!(
            err,
            TddbError::DeadlockSuspected { waited_ms: 0, .. }
        ));
    }

    #[tokio::test]
    async fn write_times_out_and_rolls_back_writer_count() {
        let mgr = StdArc::new(LockManager::new(fast_config()));
        let reader_token = mgr.tokens.next_token();
        let writer_token = mgr.tokens.next_token();
        let _read = mgr.acquire_read("m", reader_token).await.unwrap();

        let err = mgr.acquire_write("m", writer_token).await.unwrap_err();
        assert!(matches!(err, TddbError::DeadlockSuspected { .. }));

        // The rolled-back writer count must not block a later reader.
        let other_reader = mgr.tokens.next_token();
        let guard = tokio::time::timeout(
            Duration::from_millis(100),
            mgr.acquire_read("m", other_reader),
        )
        .await;
        assert!(guard.is_ok());
    }
}
