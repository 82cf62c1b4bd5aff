//! Named background tasks with at-most-one-instance-per-name semantics.
//!
//! Scenes run the daemon's periodic work: hardware polling, meter polling,
//! the presence probe, the deferred loading-state exit. Starting a name that
//! is already running cancels the prior task and awaits its termination
//! before the replacement launches, so two instances of the same scene never
//! overlap. Cancellation is purely name-based; there is no other preemption.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct SceneHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Map of scene name to running task. Clone-cheap; all clones share state.
#[derive(Clone, Default)]
pub struct SceneScheduler {
    scenes: Arc<Mutex<HashMap<String, SceneHandle>>>,
}

impl SceneScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a scene. Any task already registered under `name` is cancelled
    /// and awaited first, so the new task's first iteration runs strictly
    /// after the old one has observed cancellation.
    pub async fn start<F, Fut>(&self, name: &str, f: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut scenes = self.scenes.lock().await;

        if let Some(prior) = scenes.remove(name) {
            debug!(scene = name, "restarting, cancelling prior instance");
            prior.token.cancel();
            if let Err(e) = prior.handle.await {
                if !e.is_cancelled() {
                    warn!(scene = name, error = %e, "prior scene task panicked");
                }
            }
        }

        let token = CancellationToken::new();
        let fut = f(token.clone());
        let handle = tokio::spawn(fut);
        scenes.insert(name.to_string(), SceneHandle { token, handle });
    }

    /// Stop a scene and await its termination. No-op for unknown names.
    pub async fn stop(&self, name: &str) {
        let prior = self.scenes.lock().await.remove(name);
        if let Some(prior) = prior {
            debug!(scene = name, "stopping");
            prior.token.cancel();
            if let Err(e) = prior.handle.await {
                if !e.is_cancelled() {
                    warn!(scene = name, error = %e, "scene task panicked");
                }
            }
        }
    }

    /// Stop every running scene. Used at shutdown.
    pub async fn stop_all(&self) {
        let drained: Vec<(String, SceneHandle)> =
            self.scenes.lock().await.drain().collect();
        for (name, scene) in drained {
            debug!(scene = %name, "stopping");
            scene.token.cancel();
            let _ = scene.handle.await;
        }
    }

    /// A scene counts as running until its task finishes or is stopped;
    /// one-shot scenes that have returned are not running.
    pub async fn is_running(&self, name: &str) -> bool {
        self.scenes
            .lock()
            .await
            .get(name)
            .is_some_and(|s| !s.handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_start_and_stop() {
        let scheduler = SceneScheduler::new();
        scheduler
            .start("idle", |token| async move {
                token.cancelled().await;
            })
            .await;
        assert!(scheduler.is_running("idle").await);
        scheduler.stop("idle").await;
        assert!(!scheduler.is_running("idle").await);
    }

    #[tokio::test]
    async fn test_stop_unknown_name_is_noop() {
        let scheduler = SceneScheduler::new();
        scheduler.stop("nothing").await;
    }

    #[tokio::test]
    async fn test_restart_cancels_prior_before_new_first_iteration() {
        let scheduler = SceneScheduler::new();
        let sequence = Arc::new(Mutex::new(Vec::new()));

        let seq = sequence.clone();
        scheduler
            .start("poll", |token| async move {
                token.cancelled().await;
                seq.lock().await.push("first cancelled");
            })
            .await;

        let seq = sequence.clone();
        scheduler
            .start("poll", |_token| async move {
                seq.lock().await.push("second started");
            })
            .await;

        scheduler.stop("poll").await;
        let sequence = sequence.lock().await;
        assert_eq!(*sequence, vec!["first cancelled", "second started"]);
    }

    #[tokio::test]
    async fn test_distinct_names_run_concurrently() {
        let scheduler = SceneScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        for name in ["a", "b", "c"] {
            let count = count.clone();
            scheduler
                .start(name, move |token| async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    token.cancelled().await;
                })
                .await;
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        scheduler.stop_all().await;
        assert!(!scheduler.is_running("a").await);
    }
}
