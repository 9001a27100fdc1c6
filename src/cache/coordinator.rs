//! At-most-one generation per cache key.
//!
//! The first caller for a key becomes the owner and receives a
//! [`GenerationGuard`]; later callers join and wait for the target file to
//! appear. Joiners wake on an in-process [`Notify`] when the owner finishes and
//! also re-check on a fixed poll interval, so a missed wake-up costs at most
//! one interval.
//!
//! A marker is only ever reclaimed from an owner whose guard is gone, so a
//! slow generation is never duplicated however long it runs. Filesystem
//! checks happen outside the map lock.
//!
//! The in-flight map lives in this process only. Several instances sharing a
//! cache directory can still generate the same key concurrently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reelcache_common::{Error, Result};
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::store::file_ready;
use super::CacheKey;

struct InFlight {
    token: u64,
    started: Instant,
    notify: Arc<Notify>,
    /// Dangles once the owning guard is gone.
    owner: Weak<()>,
}

impl InFlight {
    fn owner_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

struct Inner {
    in_flight: Mutex<HashMap<CacheKey, InFlight>>,
    next_token: AtomicU64,
    poll_interval: Duration,
    max_attempts: u32,
}

impl Inner {
    fn release(&self, key: &CacheKey, owner: Option<u64>) {
        let removed = {
            let mut map = self.in_flight.lock();
            match (map.get(key), owner) {
                (Some(entry), Some(token)) if entry.token != token => None,
                (Some(_), _) => map.remove(key),
                (None, _) => None,
            }
        };
        if let Some(entry) = removed {
            entry.notify.notify_waiters();
            debug!(key = %key, "Generation released");
        }
    }
}

/// Outcome of [`GenerationCoordinator::begin_or_join`].
#[derive(Debug)]
pub enum Acquired {
    /// The caller must generate the artifact.
    Owner(GenerationGuard),
    /// Someone else generated it; here it is.
    Ready(PathBuf),
}

enum Attempt {
    Owner(GenerationGuard),
    Join(u64, Arc<Notify>),
    Ready,
}

/// Ownership of one in-flight key. Dropping it releases the key and wakes
/// joiners.
pub struct GenerationGuard {
    inner: Arc<Inner>,
    key: CacheKey,
    token: u64,
    _alive: Arc<()>,
}

impl GenerationGuard {
    /// The key being generated.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl std::fmt::Debug for GenerationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationGuard")
            .field("key", &self.key)
            .field("token", &self.token)
            .finish()
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        // Only clears the marker if it is still ours; a stale guard must not
        // release a newer owner.
        self.inner.release(&self.key, Some(self.token));
    }
}

/// Deduplicates concurrent generation of the same cache key.
#[derive(Clone)]
pub struct GenerationCoordinator {
    inner: Arc<Inner>,
}

impl GenerationCoordinator {
    /// Joiners re-check every `poll_interval` and give up after
    /// `max_attempts` checks.
    pub fn new(poll_interval: Duration, max_attempts: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                in_flight: Mutex::new(HashMap::new()),
                next_token: AtomicU64::new(1),
                poll_interval,
                max_attempts: max_attempts.max(1),
            }),
        }
    }

    /// Longest a joiner waits.
    pub fn wait_bound(&self) -> Duration {
        self.inner
            .poll_interval
            .saturating_mul(self.inner.max_attempts)
    }

    /// Number of keys currently being generated.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Whether `key` is being generated.
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.inner.in_flight.lock().contains_key(key)
    }

    /// Become the owner of `key`, or wait for the current owner to produce
    /// `target`.
    ///
    /// # Errors
    ///
    /// - [`Error::GenerationFailed`] if the owner released the key without a
    ///   valid `target`.
    /// - [`Error::GenerationTimeout`] if `target` did not appear within
    ///   [`wait_bound`](Self::wait_bound).
    pub async fn begin_or_join(&self, key: &CacheKey, target: &Path) -> Result<Acquired> {
        let ready = file_ready(target).await;
        match self.try_acquire(key, ready) {
            Attempt::Ready => Ok(Acquired::Ready(target.to_path_buf())),
            Attempt::Owner(guard) => {
                // A previous owner may have published between the check and
                // the lock.
                if file_ready(target).await {
                    drop(guard);
                    return Ok(Acquired::Ready(target.to_path_buf()));
                }
                Ok(Acquired::Owner(guard))
            }
            Attempt::Join(token, notify) => {
                debug!(key = %key, "Joining in-flight generation");
                self.join(key, target, token, notify).await
            }
        }
    }

    fn try_acquire(&self, key: &CacheKey, ready: bool) -> Attempt {
        let mut map = self.inner.in_flight.lock();

        match map.get(key) {
            // Owners publish before releasing, so with no marker a valid file
            // is final.
            None if ready => return Attempt::Ready,
            None => {}
            Some(entry) if entry.owner_alive() || ready => {
                return Attempt::Join(entry.token, Arc::clone(&entry.notify));
            }
            Some(entry) => {
                warn!(
                    key = %key,
                    age_secs = entry.started.elapsed().as_secs(),
                    "Clearing abandoned generation marker"
                );
                if let Some(stale) = map.remove(key) {
                    stale.notify.notify_waiters();
                }
            }
        }

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let alive = Arc::new(());
        map.insert(
            key.clone(),
            InFlight {
                token,
                started: Instant::now(),
                notify: Arc::new(Notify::new()),
                owner: Arc::downgrade(&alive),
            },
        );
        debug!(key = %key, token, "Generation started");

        Attempt::Owner(GenerationGuard {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            token,
            _alive: alive,
        })
    }

    fn current_owner(&self, key: &CacheKey) -> Option<(u64, Arc<Notify>)> {
        self.inner
            .in_flight
            .lock()
            .get(key)
            .map(|e| (e.token, Arc::clone(&e.notify)))
    }

    async fn join(
        &self,
        key: &CacheKey,
        target: &Path,
        mut token: u64,
        mut notify: Arc<Notify>,
    ) -> Result<Acquired> {
        let started = Instant::now();

        for _ in 0..self.inner.max_attempts {
            let waiting_on = Arc::clone(&notify);
            let notified = waiting_on.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the check and the
            // wait is not missed.
            notified.as_mut().enable();

            if file_ready(target).await {
                return Ok(Acquired::Ready(target.to_path_buf()));
            }

            match self.current_owner(key) {
                Some((current, _)) if current == token => {}
                Some((current, next)) => {
                    // Abandoned owner was replaced; follow the new one.
                    token = current;
                    notify = next;
                    continue;
                }
                None => {
                    return if file_ready(target).await {
                        Ok(Acquired::Ready(target.to_path_buf()))
                    } else {
                        Err(Error::GenerationFailed {
                            key: key.to_string(),
                        })
                    };
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(self.inner.poll_interval) => {}
            }
        }

        if file_ready(target).await {
            return Ok(Acquired::Ready(target.to_path_buf()));
        }
        Err(Error::GenerationTimeout {
            key: key.to_string(),
            waited: started.elapsed(),
        })
    }

    /// Clear the marker for `key` regardless of owner and wake every joiner.
    pub fn end(&self, key: &CacheKey) {
        self.inner.release(key, None);
    }
}

impl std::fmt::Debug for GenerationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationCoordinator")
            .field("in_flight", &self.in_flight())
            .field("poll_interval", &self.inner.poll_interval)
            .field("max_attempts", &self.inner.max_attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{KeyMaterial, Variant};
    use assert_matches::assert_matches;
    use std::sync::atomic::AtomicUsize;

    fn key(name: &str) -> CacheKey {
        CacheKey::derive(&KeyMaterial {
            source: Path::new(name),
            audio_index: 0,
            channels: 2,
            codec: "h264",
            variant: Variant::Full,
        })
    }

    fn fast() -> GenerationCoordinator {
        GenerationCoordinator::new(Duration::from_millis(10), 200)
    }

    #[tokio::test]
    async fn first_caller_owns() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        let coord = fast();
        let k = key("/a.mkv");

        let acquired = coord.begin_or_join(&k, &target).await.unwrap();
        assert_matches!(acquired, Acquired::Owner(_));
        assert!(coord.is_in_flight(&k));
        drop(acquired);
        assert!(!coord.is_in_flight(&k));
    }

    #[tokio::test]
    async fn joiner_receives_published_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        let coord = fast();
        let k = key("/a.mkv");

        let Acquired::Owner(guard) = coord.begin_or_join(&k, &target).await.unwrap() else {
            panic!("expected ownership");
        };

        let joiner = {
            let coord = coord.clone();
            let k = k.clone();
            let target = target.clone();
            tokio::spawn(async move { coord.begin_or_join(&k, &target).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        std::fs::write(&target, b"done").unwrap();
        drop(guard);

        let result = joiner.await.unwrap().unwrap();
        assert_matches!(result, Acquired::Ready(path) if path == target);
    }

    #[tokio::test]
    async fn joiner_fails_when_owner_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        let coord = GenerationCoordinator::new(Duration::from_secs(5), 100);
        let k = key("/a.mkv");

        let Acquired::Owner(guard) = coord.begin_or_join(&k, &target).await.unwrap() else {
            panic!("expected ownership");
        };
        let joiner = {
            let coord = coord.clone();
            let k = k.clone();
            let target = target.clone();
            tokio::spawn(async move { coord.begin_or_join(&k, &target).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        let started = Instant::now();
        drop(guard);

        let err = joiner.await.unwrap().unwrap_err();
        assert_matches!(err, Error::GenerationFailed { .. });
        // Woken by the notifier, not the 5s poll.
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn joiner_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        let coord = GenerationCoordinator::new(Duration::from_millis(5), 3);
        let k = key("/a.mkv");

        let _guard = coord.begin_or_join(&k, &target).await.unwrap();
        // A second acquire from within the bound joins and times out.
        let err = coord.begin_or_join(&k, &target).await.unwrap_err();
        assert_matches!(err, Error::GenerationTimeout { .. });
    }

    #[tokio::test]
    async fn live_owner_past_the_wait_bound_is_joined_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        let coord = GenerationCoordinator::new(Duration::from_millis(1), 2);
        let k = key("/a.mkv");

        let Acquired::Owner(owner) = coord.begin_or_join(&k, &target).await.unwrap() else {
            panic!("expected ownership");
        };
        tokio::time::sleep(coord.wait_bound() * 10).await;

        let err = coord.begin_or_join(&k, &target).await.unwrap_err();
        assert_matches!(err, Error::GenerationTimeout { .. });
        assert_eq!(coord.current_owner(&k).map(|(token, _)| token), Some(owner.token));

        drop(owner);
        assert!(!coord.is_in_flight(&k));
    }

    #[tokio::test]
    async fn abandoned_marker_is_reclaimed_and_old_guard_cannot_release_new_owner() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        let coord = fast();
        let k = key("/a.mkv");

        // A marker whose owner is gone, plus a leftover guard carrying its token.
        coord.inner.in_flight.lock().insert(
            k.clone(),
            InFlight {
                token: 0,
                started: Instant::now(),
                notify: Arc::new(Notify::new()),
                owner: Weak::new(),
            },
        );
        let leftover = GenerationGuard {
            inner: Arc::clone(&coord.inner),
            key: k.clone(),
            token: 0,
            _alive: Arc::new(()),
        };

        let Acquired::Owner(fresh) = coord.begin_or_join(&k, &target).await.unwrap() else {
            panic!("abandoned marker should have been cleared");
        };
        drop(leftover);
        assert!(coord.is_in_flight(&k), "old guard released the new owner");
        drop(fresh);
        assert!(!coord.is_in_flight(&k));
    }

    #[tokio::test]
    async fn abandoned_marker_with_published_file_is_ready() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        std::fs::write(&target, b"done").unwrap();
        let coord = fast();
        let k = key("/a.mkv");
        coord.inner.in_flight.lock().insert(
            k.clone(),
            InFlight {
                token: 0,
                started: Instant::now(),
                notify: Arc::new(Notify::new()),
                owner: Weak::new(),
            },
        );

        let acquired = coord.begin_or_join(&k, &target).await.unwrap();
        assert_matches!(acquired, Acquired::Ready(path) if path == target);
    }

    #[tokio::test]
    async fn published_file_is_ready_without_a_marker() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        std::fs::write(&target, b"done").unwrap();
        let coord = fast();
        let k = key("/a.mkv");

        let acquired = coord.begin_or_join(&k, &target).await.unwrap();
        assert_matches!(acquired, Acquired::Ready(_));
        assert!(!coord.is_in_flight(&k));

        // Empty files are not hits.
        std::fs::write(&target, b"").unwrap();
        let acquired = coord.begin_or_join(&k, &target).await.unwrap();
        assert_matches!(acquired, Acquired::Owner(_));
    }

    #[tokio::test]
    async fn end_clears_unconditionally() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        let coord = fast();
        let k = key("/a.mkv");

        let guard = coord.begin_or_join(&k, &target).await.unwrap();
        coord.end(&k);
        assert_eq!(coord.in_flight(), 0);
        drop(guard);
        assert_eq!(coord.in_flight(), 0);
    }

    #[tokio::test]
    async fn concurrent_callers_elect_one_owner() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        let coord = fast();
        let k = key("/a.mkv");
        let owners = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coord = coord.clone();
            let k = k.clone();
            let target = target.clone();
            let owners = Arc::clone(&owners);
            handles.push(tokio::spawn(async move {
                match coord.begin_or_join(&k, &target).await? {
                    Acquired::Owner(guard) => {
                        owners.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        std::fs::write(&target, b"bytes").unwrap();
                        drop(guard);
                        Ok::<_, Error>(target)
                    }
                    Acquired::Ready(path) => Ok(path),
                }
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), target);
        }
        assert_eq!(owners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wait_bound_is_interval_times_attempts() {
        let coord = GenerationCoordinator::new(Duration::from_millis(250), 8);
        assert_eq!(coord.wait_bound(), Duration::from_secs(2));
    }
}
