// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Sharded, concurrent session store (§4.6): one active session per
//! IMSI, expired in the background on inactivity and drained
//! gracefully on shutdown.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::cdr::CdrJournal;
use crate::ie::Imsi;

const SHARD_COUNT: usize = 16;
const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(500);
const CLEANUP_TICK: Duration = Duration::from_millis(250);

/// One subscriber's active PDP context, as tracked by the gateway.
#[derive(Debug, Clone)]
pub struct Session {
    pub imsi: Imsi,
    pub last_activity: Instant,
}

/// Create/read/update/delete over subscriber sessions. A trait so
/// handlers can be exercised against a fake store in tests, the way
/// the original gateway's interface separated storage from its
/// sharded implementation.
pub trait SessionStore: Send + Sync {
    /// Creates a session for `imsi`, unless blacklisted. If a session
    /// already exists for `imsi`, this behaves like [`update`].
    ///
    /// [`update`]: SessionStore::update
    fn create(&self, imsi: Imsi) -> bool;
    fn read(&self, imsi: &Imsi) -> Option<Session>;
    /// Refreshes `imsi`'s last-activity time, unless it was touched
    /// less than 500ms ago.
    fn update(&self, imsi: &Imsi) -> bool;
    fn delete(&self, imsi: &Imsi) -> bool;
}

struct Dedup {
    last_rejected_blacklisted: Mutex<Option<Imsi>>,
    last_not_found: Mutex<Option<Imsi>>,
}

/// 16-way sharded session store. Each shard is an independent
/// `RwLock<HashMap>` so operations against different subscribers never
/// contend with each other.
pub struct ShardedSessionStore {
    shards: Vec<RwLock<HashMap<Imsi, Session>>>,
    session_timeout_seconds: Arc<AtomicU64>,
    graceful_shutdown_rate: Arc<AtomicU64>,
    cdr: Arc<CdrJournal>,
    blacklist: HashSet<Imsi>,
    dedup: Dedup,
    cleanup_thread: Mutex<Option<JoinHandle<()>>>,
}

impl ShardedSessionStore {
    /// Builds the store and spawns its background expirer thread,
    /// which runs until `stop` is observed set.
    pub fn new(
        session_timeout_seconds: Arc<AtomicU64>,
        graceful_shutdown_rate: Arc<AtomicU64>,
        cdr: Arc<CdrJournal>,
        blacklist: HashSet<Imsi>,
        stop: Arc<AtomicBool>,
    ) -> Arc<Self> {
        let shards = (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect();

        let store = Arc::new(Self {
            shards,
            session_timeout_seconds,
            graceful_shutdown_rate,
            cdr,
            blacklist,
            dedup: Dedup {
                last_rejected_blacklisted: Mutex::new(None),
                last_not_found: Mutex::new(None),
            },
            cleanup_thread: Mutex::new(None),
        });

        let handle = {
            let store = Arc::clone(&store);
            thread::spawn(move || store.cleanup_loop(&stop))
        };
        if let Ok(mut slot) = store.cleanup_thread.lock() {
            *slot = Some(handle);
        }

        debug!("session storage created");
        store
    }

    fn shard_index(&self, imsi: &Imsi) -> usize {
        let mut hasher = DefaultHasher::new();
        imsi.hash(&mut hasher);
        (hasher.finish() % SHARD_COUNT as u64) as usize
    }

    fn cleanup_loop(&self, stop: &AtomicBool) {
        debug!("session storage cleanup thread started");

        while !stop.load(Ordering::Relaxed) {
            let timeout = Duration::from_secs(self.session_timeout_seconds.load(Ordering::Relaxed));

            for shard in &self.shards {
                let Ok(mut guard) = shard.write() else {
                    continue;
                };
                let cdr = &self.cdr;
                guard.retain(|imsi, session| {
                    let expired = session.last_activity.elapsed() >= timeout;
                    if expired {
                        debug!(%imsi, "session deleted on timeout");
                        cdr.write(imsi, "delete_session_on_timeout");
                    }
                    !expired
                });
            }

            thread::sleep(CLEANUP_TICK);
        }

        debug!("session storage cleanup thread stopped");
    }

    /// Drains every shard, removing one session at a time at
    /// `graceful_shutdown_rate` sessions/second.
    fn delete_sessions_gracefully(&self) {
        debug!("session storage graceful offload started");

        let rate = self.graceful_shutdown_rate.load(Ordering::Relaxed).max(1);
        let delay = Duration::from_millis(1000 / rate);

        for shard in &self.shards {
            loop {
                let next = match shard.write() {
                    Ok(mut guard) => {
                        let key = guard.keys().next().cloned();
                        if let Some(imsi) = &key {
                            guard.remove(imsi);
                        }
                        key
                    },
                    Err(_) => break,
                };

                match next {
                    Some(imsi) => {
                        debug!(%imsi, "session deleted on offload");
                        self.cdr.write(&imsi, "delete_session_on_offload");
                        thread::sleep(delay);
                    },
                    None => break,
                }
            }
        }

        debug!("session storage graceful offload end");
    }
}

impl SessionStore for ShardedSessionStore {
    fn create(&self, imsi: Imsi) -> bool {
        if self.blacklist.contains(&imsi) {
            if let Ok(mut last) = self.dedup.last_rejected_blacklisted.lock()
                && last.as_ref() != Some(&imsi)
            {
                self.cdr.write(&imsi, "rejected, IMSI blacklisted");
                debug!(%imsi, "create session rejected: blacklisted");
                *last = Some(imsi.clone());
            }
            return false;
        }

        let idx = self.shard_index(&imsi);
        let Ok(mut shard) = self.shards[idx].write() else {
            error!(%imsi, "session shard lock poisoned");
            return false;
        };

        if shard.contains_key(&imsi) {
            drop(shard);
            return self.update(&imsi);
        }

        shard.insert(
            imsi.clone(),
            Session { imsi: imsi.clone(), last_activity: Instant::now() },
        );
        drop(shard);

        debug!(%imsi, "create session success");
        self.cdr.write(&imsi, "created");
        true
    }

    fn read(&self, imsi: &Imsi) -> Option<Session> {
        let idx = self.shard_index(imsi);
        let shard = self.shards[idx].read().ok()?;

        if let Some(session) = shard.get(imsi) {
            debug!(%imsi, "find session success");
            return Some(session.clone());
        }
        drop(shard);

        if let Ok(mut last) = self.dedup.last_not_found.lock()
            && last.as_ref() != Some(imsi)
        {
            debug!(%imsi, "can't find session");
            *last = Some(imsi.clone());
        }
        None
    }

    fn update(&self, imsi: &Imsi) -> bool {
        let idx = self.shard_index(imsi);
        let Ok(mut shard) = self.shards[idx].write() else {
            return false;
        };

        let Some(session) = shard.get_mut(imsi) else {
            debug!(%imsi, "attempt to update session which does not exist");
            return false;
        };

        if session.last_activity.elapsed() < MIN_UPDATE_INTERVAL {
            return false;
        }

        session.last_activity = Instant::now();
        drop(shard);

        debug!(%imsi, "successful update");
        self.cdr.write(imsi, "updated");
        true
    }

    fn delete(&self, imsi: &Imsi) -> bool {
        let idx = self.shard_index(imsi);
        let Ok(mut shard) = self.shards[idx].write() else {
            return false;
        };

        debug!(%imsi, "attempt to delete session");
        self.cdr.write(imsi, "delete_session_manually");
        shard.remove(imsi).is_some()
    }
}

impl Drop for ShardedSessionStore {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.cleanup_thread.lock()
            && let Some(handle) = slot.take()
        {
            let _ = handle.join();
        }
        self.delete_sessions_gracefully();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use tempfile::tempdir;

    use super::*;

    fn test_store(blacklist: HashSet<Imsi>) -> Arc<ShardedSessionStore> {
        let dir = tempdir().expect("tempdir");
        let cdr = Arc::new(CdrJournal::open(dir.path().join("cdr.csv"), 1000).expect("open cdr"));
        ShardedSessionStore::new(
            Arc::new(AtomicU64::new(3600)),
            Arc::new(AtomicU64::new(10)),
            cdr,
            blacklist,
            Arc::new(AtomicBool::new(true)),
        )
    }

    #[test]
    fn create_then_read_round_trips() {
        let store = test_store(HashSet::new());
        let imsi = Imsi::from_str_digits("001010000000001").expect("imsi");
        assert!(store.create(imsi.clone()));
        let session = store.read(&imsi).expect("session exists");
        assert_eq!(session.imsi, imsi);
    }

    #[test]
    fn create_on_existing_session_delegates_to_update() {
        let store = test_store(HashSet::new());
        let imsi = Imsi::from_str_digits("001010000000001").expect("imsi");
        assert!(store.create(imsi.clone()));
        // second create happens immediately, within the 500ms cooldown
        assert!(!store.create(imsi.clone()));
    }

    #[test]
    fn blacklisted_imsi_is_rejected() {
        let mut blacklist = HashSet::new();
        let imsi = Imsi::from_str_digits("001010000000001").expect("imsi");
        blacklist.insert(imsi.clone());
        let store = test_store(blacklist);
        assert!(!store.create(imsi.clone()));
        assert!(store.read(&imsi).is_none());
    }

    #[test]
    fn update_on_missing_session_fails() {
        let store = test_store(HashSet::new());
        let imsi = Imsi::from_str_digits("001010000000001").expect("imsi");
        assert!(!store.update(&imsi));
    }

    #[test]
    fn delete_removes_session() {
        let store = test_store(HashSet::new());
        let imsi = Imsi::from_str_digits("001010000000001").expect("imsi");
        store.create(imsi.clone());
        assert!(store.delete(&imsi));
        assert!(store.read(&imsi).is_none());
        assert!(!store.delete(&imsi));
    }
}
