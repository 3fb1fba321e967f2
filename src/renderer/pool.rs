//! Renderer session pool
//!
//! Browser sessions are expensive to start, so the WebDriver renderer keeps a
//! fixed number of them alive and lends them out per fetch. Checkout waits on
//! a semaphore; the returned [`PooledSession`] guard gives the session back
//! when dropped, which covers every exit path including a fetch future being
//! cancelled by a timeout.
//!
//! A guard is only returned to the idle list after [`PooledSession::finish`]
//! is called. A guard dropped without it is assumed to hold a session in an
//! unknown state and the session is destroyed instead.

use crate::PageFetchError;
use async_trait::async_trait;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Creates and tears down pooled sessions
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: Send + 'static;

    async fn create(&self) -> Result<Self::Session, String>;

    async fn destroy(&self, session: Self::Session);
}

struct PoolInner<F: SessionFactory> {
    factory: F,
    idle: Mutex<Vec<F::Session>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl<F: SessionFactory> PoolInner<F> {
    fn take_idle(&self) -> Option<F::Session> {
        self.idle.lock().ok().and_then(|mut idle| idle.pop())
    }
}

/// Fixed-size pool of renderer sessions
pub struct SessionPool<F: SessionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: SessionFactory> Clone for SessionPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: SessionFactory> SessionPool<F> {
    /// Creates a pool lending at most `size` sessions at once
    ///
    /// Sessions are created lazily on first checkout.
    pub fn new(factory: F, size: usize) -> Self {
        let size = size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                factory,
                idle: Mutex::new(Vec::with_capacity(size)),
                permits: Arc::new(Semaphore::new(size)),
                size,
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Sessions currently parked and ready for reuse
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    /// Sessions that could be checked out right now without waiting
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Waits for a free slot and lends a session
    ///
    /// Reuses an idle session when one exists, otherwise asks the factory
    /// for a new one. A factory failure releases the slot.
    pub async fn checkout(&self) -> Result<PooledSession<F>, PageFetchError> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| PageFetchError::SessionUnavailable("session pool is closed".to_string()))?;

        let session = match self.inner.take_idle() {
            Some(session) => session,
            None => {
                debug!("Creating new renderer session");
                self.inner
                    .factory
                    .create()
                    .await
                    .map_err(PageFetchError::SessionUnavailable)?
            }
        };

        Ok(PooledSession {
            session: Some(session),
            pool: Arc::clone(&self.inner),
            finished: false,
            _permit: permit,
        })
    }

    /// Stops lending and destroys every idle session
    ///
    /// Sessions still checked out are destroyed when their guards drop.
    pub async fn close(&self) {
        self.inner.permits.close();
        let drained: Vec<F::Session> = match self.inner.idle.lock() {
            Ok(mut idle) => idle.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for session in drained {
            self.inner.factory.destroy(session).await;
        }
    }
}

/// A session on loan from a [`SessionPool`]
pub struct PooledSession<F: SessionFactory> {
    session: Option<F::Session>,
    pool: Arc<PoolInner<F>>,
    finished: bool,
    _permit: OwnedSemaphorePermit,
}

impl<F: SessionFactory> PooledSession<F> {
    /// Marks the session reusable and returns it to the pool
    pub fn finish(mut self) {
        self.finished = true;
    }
}

impl<F: SessionFactory> Deref for PooledSession<F> {
    type Target = F::Session;

    fn deref(&self) -> &Self::Target {
        match self.session.as_ref() {
            Some(session) => session,
            None => unreachable!("session is only taken in drop"),
        }
    }
}

impl<F: SessionFactory> DerefMut for PooledSession<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.session.as_mut() {
            Some(session) => session,
            None => unreachable!("session is only taken in drop"),
        }
    }
}

impl<F: SessionFactory> Drop for PooledSession<F> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if self.finished && !self.pool.permits.is_closed() {
            if let Ok(mut idle) = self.pool.idle.lock() {
                idle.push(session);
                return;
            }
        }

        match Handle::try_current() {
            Ok(handle) => {
                let pool = Arc::clone(&self.pool);
                handle.spawn(async move {
                    pool.factory.destroy(session).await;
                });
            }
            Err(_) => warn!("No runtime available, dropping renderer session without cleanup"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingFactory {
        created: Arc<AtomicUsize>,
        destroyed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SessionFactory for CountingFactory {
        type Session = usize;

        async fn create(&self) -> Result<usize, String> {
            Ok(self.created.fetch_add(1, Ordering::SeqCst))
        }

        async fn destroy(&self, _session: usize) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingFactory;

    #[async_trait]
    impl SessionFactory for FailingFactory {
        type Session = ();

        async fn create(&self) -> Result<(), String> {
            Err("driver refused connection".to_string())
        }

        async fn destroy(&self, _session: ()) {}
    }

    #[tokio::test]
    async fn test_finished_session_is_reused() {
        let factory = CountingFactory::default();
        let created = Arc::clone(&factory.created);
        let pool = SessionPool::new(factory, 2);

        let session = pool.checkout().await.unwrap();
        assert_eq!(*session, 0);
        session.finish();
        assert_eq!(pool.idle_count(), 1);

        let session = pool.checkout().await.unwrap();
        assert_eq!(*session, 0);
        session.finish();
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unfinished_session_is_destroyed() {
        let factory = CountingFactory::default();
        let destroyed = Arc::clone(&factory.destroyed);
        let pool = SessionPool::new(factory, 1);

        {
            let _session = pool.checkout().await.unwrap();
        }
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(pool.idle_count(), 0);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_checkout_waits_for_free_slot() {
        let pool = SessionPool::new(CountingFactory::default(), 1);

        let held = pool.checkout().await.unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.checkout()).await;
        assert!(blocked.is_err());

        held.finish();
        let session = tokio::time::timeout(Duration::from_millis(50), pool.checkout())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*session, 0);
    }

    #[tokio::test]
    async fn test_release_on_cancelled_future() {
        let pool = SessionPool::new(CountingFactory::default(), 1);

        let slow = {
            let pool = pool.clone();
            async move {
                let _session = pool.checkout().await.unwrap();
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        };
        assert!(tokio::time::timeout(Duration::from_millis(20), slow).await.is_err());

        assert_eq!(pool.available(), 1);
        assert!(pool.checkout().await.is_ok());
    }

    #[tokio::test]
    async fn test_factory_failure_releases_slot() {
        let pool = SessionPool::new(FailingFactory, 1);
        assert!(matches!(
            pool.checkout().await,
            Err(PageFetchError::SessionUnavailable(_))
        ));
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_close_destroys_idle_sessions() {
        let factory = CountingFactory::default();
        let destroyed = Arc::clone(&factory.destroyed);
        let pool = SessionPool::new(factory, 2);

        pool.checkout().await.unwrap().finish();
        pool.close().await;

        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert!(pool.checkout().await.is_err());
    }
}
