//! Bounded concurrency for analysis work.
//!
//! A thin wrapper around [`tokio::sync::Semaphore`]; waiters are granted
//! permits in the order they asked for them.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::{Error, Result};

pub const DEFAULT_PERMITS: usize = 2;

#[derive(Debug, Clone)]
pub struct AnalysisLimiter {
    semaphore: Arc<Semaphore>,
    permits: usize,
}

impl Default for AnalysisLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_PERMITS)
    }
}

impl AnalysisLimiter {
    /// Zero permits is treated as one.
    pub fn new(permits: usize) -> Self {
        let permits = permits.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            permits,
        }
    }

    pub fn permits(&self) -> usize {
        self.permits
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a permit, then drive `fut` to completion while holding it.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::OperationFailed("analysis limiter closed".to_string()))?;
        Ok(fut.await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_permit_count() {
        let limiter = AnalysisLimiter::default();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                limiter
                    .run(async {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= DEFAULT_PERMITS);
        assert_eq!(limiter.available_permits(), DEFAULT_PERMITS);
    }

    #[tokio::test]
    async fn waiters_are_served_in_order() {
        let limiter = AnalysisLimiter::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let limiter = limiter.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                limiter
                    .run(async {
                        order.lock().unwrap().push(i);
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    })
                    .await
            }));
            // Let each task reach the semaphore before spawning the next.
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn zero_permits_becomes_one() {
        assert_eq!(AnalysisLimiter::new(0).permits(), 1);
    }
}
